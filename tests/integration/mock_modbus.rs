//! Mock Modbus driver, transports, delay and event sink.
//!
//! `MockMaster` answers from its own `RegisterBank` through the real
//! request service, so a master-side test exercises the same code path a
//! remote board would.

use std::collections::VecDeque;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use embedded_hal::delay::DelayNs;
use mela::app::events::BoardEvent;
use mela::app::ports::{EventSink, MasterIo, ModbusDriver, SlaveIo, TransportError};
use mela::config::{SerialParams, SlaveSerialConfig};
use mela::modbus::RegisterBank;
use mela::modbus::service::serve;
use tokio_modbus::{ExceptionCode, Request, Response, SlaveId};

// ── Slave ─────────────────────────────────────────────────────

#[derive(Default)]
pub struct MockSlave {
    pub bound: Option<(Ipv4Addr, u16)>,
    pub inbox: VecDeque<Request<'static>>,
    pub outbox: Vec<Result<Response, ExceptionCode>>,
    pub bind_error: Option<TransportError>,
}

impl SlaveIo for MockSlave {
    fn is_bound(&self) -> bool {
        self.bound.is_some()
    }

    fn bind(&mut self, local_ip: Ipv4Addr, port: u16) -> Result<(), TransportError> {
        if let Some(e) = self.bind_error {
            return Err(e);
        }
        self.bound = Some((local_ip, port));
        Ok(())
    }

    fn poll_request(&mut self) -> Result<Option<Request<'static>>, TransportError> {
        if self.bound.is_none() {
            return Err(TransportError::NotBound);
        }
        Ok(self.inbox.pop_front())
    }

    fn respond(&mut self, response: Result<Response, ExceptionCode>) -> Result<(), TransportError> {
        self.outbox.push(response);
        Ok(())
    }
}

// ── Master ────────────────────────────────────────────────────

#[derive(Default)]
pub struct MockMaster {
    /// Contents of the simulated remote unit.
    pub remote: RegisterBank,
    pub requests: Vec<(SlaveId, String)>,
    /// Fail every call with this error.
    pub fail_with: Option<TransportError>,
}

impl MockMaster {
    fn call(&mut self, unit: SlaveId, req: Request<'static>) -> Result<Response, TransportError> {
        self.requests.push((unit, format!("{req:?}")));
        if let Some(e) = self.fail_with {
            return Err(e);
        }
        serve(&mut self.remote, req).map_err(TransportError::Exception)
    }
}

impl MasterIo for MockMaster {
    fn read_holding_registers(&mut self, unit: SlaveId, addr: u16, cnt: u16) -> Result<Vec<u16>, TransportError> {
        match self.call(unit, Request::ReadHoldingRegisters(addr, cnt))? {
            Response::ReadHoldingRegisters(w) => Ok(w),
            _ => Err(TransportError::Io),
        }
    }

    fn read_input_registers(&mut self, unit: SlaveId, addr: u16, cnt: u16) -> Result<Vec<u16>, TransportError> {
        match self.call(unit, Request::ReadInputRegisters(addr, cnt))? {
            Response::ReadInputRegisters(w) => Ok(w),
            _ => Err(TransportError::Io),
        }
    }

    fn read_coils(&mut self, unit: SlaveId, addr: u16, cnt: u16) -> Result<Vec<bool>, TransportError> {
        match self.call(unit, Request::ReadCoils(addr, cnt))? {
            Response::ReadCoils(b) => Ok(b),
            _ => Err(TransportError::Io),
        }
    }

    fn read_discrete_inputs(&mut self, unit: SlaveId, addr: u16, cnt: u16) -> Result<Vec<bool>, TransportError> {
        match self.call(unit, Request::ReadDiscreteInputs(addr, cnt))? {
            Response::ReadDiscreteInputs(b) => Ok(b),
            _ => Err(TransportError::Io),
        }
    }

    fn write_single_register(&mut self, unit: SlaveId, addr: u16, value: u16) -> Result<(), TransportError> {
        self.call(unit, Request::WriteSingleRegister(addr, value)).map(drop)
    }

    fn write_multiple_registers(&mut self, unit: SlaveId, addr: u16, values: &[u16]) -> Result<(), TransportError> {
        self.call(unit, Request::WriteMultipleRegisters(addr, values.to_vec().into()))
            .map(drop)
    }

    fn write_single_coil(&mut self, unit: SlaveId, addr: u16, on: bool) -> Result<(), TransportError> {
        self.call(unit, Request::WriteSingleCoil(addr, on)).map(drop)
    }
}

// ── Driver ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    RtuSlave { address: u8 },
    RtuMaster { baudrate: u32 },
    TcpSlave,
    TcpMaster { addr: SocketAddrV4, timeout: Duration },
}

pub struct MockDriver {
    pub calls: Vec<DriverCall>,
    /// Outbound connects that fail before one succeeds; `None` never succeeds.
    pub master_failures: Option<u32>,
    pub master_error: TransportError,
    pub serial_supported: bool,
    /// Handed to the next `MockSlave`.
    pub slave_bind_error: Option<TransportError>,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            master_failures: Some(0),
            master_error: TransportError::Timeout,
            serial_supported: true,
            slave_bind_error: None,
        }
    }
}

#[allow(dead_code)]
impl MockDriver {
    pub fn unreachable() -> Self {
        Self {
            master_failures: None,
            ..Self::default()
        }
    }

    pub fn reachable_after(failures: u32) -> Self {
        Self {
            master_failures: Some(failures),
            ..Self::default()
        }
    }

    pub fn master_attempts(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, DriverCall::TcpMaster { .. }))
            .count()
    }
}

impl ModbusDriver for MockDriver {
    type Slave = MockSlave;
    type Master = MockMaster;

    fn rtu_slave(&mut self, cfg: &SlaveSerialConfig) -> Result<MockSlave, TransportError> {
        self.calls.push(DriverCall::RtuSlave { address: cfg.address });
        cfg.line.validate()?;
        if !self.serial_supported {
            return Err(TransportError::Unsupported);
        }
        Ok(MockSlave {
            bind_error: self.slave_bind_error,
            ..MockSlave::default()
        })
    }

    fn rtu_master(&mut self, line: &SerialParams) -> Result<MockMaster, TransportError> {
        self.calls.push(DriverCall::RtuMaster { baudrate: line.baudrate });
        line.validate()?;
        if !self.serial_supported {
            return Err(TransportError::Unsupported);
        }
        Ok(MockMaster::default())
    }

    fn tcp_slave(&mut self) -> Result<MockSlave, TransportError> {
        self.calls.push(DriverCall::TcpSlave);
        Ok(MockSlave {
            bind_error: self.slave_bind_error,
            ..MockSlave::default()
        })
    }

    fn tcp_master(&mut self, addr: SocketAddrV4, timeout: Duration) -> Result<MockMaster, TransportError> {
        self.calls.push(DriverCall::TcpMaster { addr, timeout });
        match self.master_failures {
            Some(0) => Ok(MockMaster::default()),
            Some(n) => {
                self.master_failures = Some(n - 1);
                Err(self.master_error)
            }
            None => Err(self.master_error),
        }
    }
}

// ── Delay ─────────────────────────────────────────────────────

/// Records requested waits instead of sleeping.
#[derive(Debug, Default)]
pub struct RecordingDelay {
    pub ms: Vec<u32>,
    pub ns_total: u64,
}

#[allow(dead_code)]
impl RecordingDelay {
    pub fn total_ms(&self) -> u64 {
        self.ms.iter().map(|&m| u64::from(m)).sum::<u64>() + self.ns_total / 1_000_000
    }
}

impl DelayNs for RecordingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.ns_total += u64::from(ns);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.ms.push(ms);
    }
}

// ── Event sink ────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Vec<BoardEvent>,
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &BoardEvent) {
        self.events.push(event.clone());
    }
}
