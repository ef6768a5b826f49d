//! [`ModbusDriver`] for the board: TCP everywhere, RTU on target.

use core::net::{Ipv4Addr, SocketAddrV4};
use core::time::Duration;

use tokio_modbus::{ExceptionCode, Request, Response, SlaveId};

use super::modbus_rtu;
use super::modbus_tcp::{TcpMaster, TcpSlave};
use crate::app::ports::{MasterIo, ModbusDriver, SlaveIo, TransportError};
use crate::config::{SerialParams, SlaveSerialConfig};

#[cfg(target_os = "espidf")]
use super::modbus_rtu::{RtuMaster, RtuSlave, UartStream};

/// Slave transport of either kind.
pub enum BoardSlave {
    Tcp(TcpSlave),
    #[cfg(target_os = "espidf")]
    Rtu(RtuSlave<UartStream>),
}

macro_rules! delegate_slave {
    ($self:ident, $s:ident => $call:expr) => {
        match $self {
            BoardSlave::Tcp($s) => $call,
            #[cfg(target_os = "espidf")]
            BoardSlave::Rtu($s) => $call,
        }
    };
}

impl SlaveIo for BoardSlave {
    fn is_bound(&self) -> bool {
        delegate_slave!(self, s => s.is_bound())
    }

    fn bind(&mut self, local_ip: Ipv4Addr, port: u16) -> Result<(), TransportError> {
        delegate_slave!(self, s => s.bind(local_ip, port))
    }

    fn poll_request(&mut self) -> Result<Option<Request<'static>>, TransportError> {
        delegate_slave!(self, s => s.poll_request())
    }

    fn respond(&mut self, response: Result<Response, ExceptionCode>) -> Result<(), TransportError> {
        delegate_slave!(self, s => s.respond(response))
    }
}

/// Master transport of either kind.
pub enum BoardMaster {
    Tcp(TcpMaster),
    #[cfg(target_os = "espidf")]
    Rtu(RtuMaster),
}

macro_rules! delegate {
    ($self:ident, $m:ident => $call:expr) => {
        match $self {
            BoardMaster::Tcp($m) => $call,
            #[cfg(target_os = "espidf")]
            BoardMaster::Rtu($m) => $call,
        }
    };
}

impl MasterIo for BoardMaster {
    fn read_holding_registers(&mut self, unit: SlaveId, addr: u16, cnt: u16) -> Result<Vec<u16>, TransportError> {
        delegate!(self, m => m.read_holding_registers(unit, addr, cnt))
    }

    fn read_input_registers(&mut self, unit: SlaveId, addr: u16, cnt: u16) -> Result<Vec<u16>, TransportError> {
        delegate!(self, m => m.read_input_registers(unit, addr, cnt))
    }

    fn read_coils(&mut self, unit: SlaveId, addr: u16, cnt: u16) -> Result<Vec<bool>, TransportError> {
        delegate!(self, m => m.read_coils(unit, addr, cnt))
    }

    fn read_discrete_inputs(&mut self, unit: SlaveId, addr: u16, cnt: u16) -> Result<Vec<bool>, TransportError> {
        delegate!(self, m => m.read_discrete_inputs(unit, addr, cnt))
    }

    fn write_single_register(&mut self, unit: SlaveId, addr: u16, value: u16) -> Result<(), TransportError> {
        delegate!(self, m => m.write_single_register(unit, addr, value))
    }

    fn write_multiple_registers(&mut self, unit: SlaveId, addr: u16, values: &[u16]) -> Result<(), TransportError> {
        delegate!(self, m => m.write_multiple_registers(unit, addr, values))
    }

    fn write_single_coil(&mut self, unit: SlaveId, addr: u16, on: bool) -> Result<(), TransportError> {
        delegate!(self, m => m.write_single_coil(unit, addr, on))
    }
}

#[derive(Debug, Default)]
pub struct BoardModbusDriver;

impl BoardModbusDriver {
    pub fn new() -> Self {
        Self
    }
}

impl ModbusDriver for BoardModbusDriver {
    type Slave = BoardSlave;
    type Master = BoardMaster;

    fn rtu_slave(&mut self, cfg: &SlaveSerialConfig) -> Result<Self::Slave, TransportError> {
        #[cfg(target_os = "espidf")]
        {
            modbus_rtu::open_slave(cfg).map(BoardSlave::Rtu)
        }
        #[cfg(not(target_os = "espidf"))]
        {
            match modbus_rtu::open_slave(cfg)? {}
        }
    }

    fn rtu_master(&mut self, line: &SerialParams) -> Result<Self::Master, TransportError> {
        #[cfg(target_os = "espidf")]
        {
            modbus_rtu::open_master(line).map(BoardMaster::Rtu)
        }
        #[cfg(not(target_os = "espidf"))]
        {
            match modbus_rtu::open_master(line)? {}
        }
    }

    fn tcp_slave(&mut self) -> Result<Self::Slave, TransportError> {
        Ok(BoardSlave::Tcp(TcpSlave::new()))
    }

    fn tcp_master(&mut self, addr: SocketAddrV4, timeout: Duration) -> Result<Self::Master, TransportError> {
        TcpMaster::connect(addr, timeout).map(BoardMaster::Tcp)
    }
}
