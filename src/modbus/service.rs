//! Request service: answers one Modbus request from a [`RegisterBank`].
//!
//! Transport-agnostic; the slave link feeds it whatever the adapter
//! decoded.  Only register-table function codes are served.

use std::borrow::Cow;

use log::{debug, warn};
use tokio_modbus::{ExceptionCode, Request, Response};

use super::bank::{RegisterBank, RegisterClass};

/// Serve `req` against `bank`.
///
/// - unset cells → `IllegalDataAddress`
/// - writes to input registers / discrete inputs → `IllegalFunction`
/// - any other function code → `IllegalFunction`
pub fn serve(bank: &mut RegisterBank, req: Request<'_>) -> Result<Response, ExceptionCode> {
    debug!("modbus: serving {req:?}");
    let res = match req {
        Request::ReadCoils(addr, cnt) => read_bits(bank, RegisterClass::Coil, addr, cnt).map(Response::ReadCoils),
        Request::ReadDiscreteInputs(addr, cnt) => {
            read_bits(bank, RegisterClass::DiscreteInput, addr, cnt).map(Response::ReadDiscreteInputs)
        }
        Request::ReadHoldingRegisters(addr, cnt) => {
            read_words(bank, RegisterClass::Holding, addr, cnt).map(Response::ReadHoldingRegisters)
        }
        Request::ReadInputRegisters(addr, cnt) => {
            read_words(bank, RegisterClass::Input, addr, cnt).map(Response::ReadInputRegisters)
        }
        Request::WriteSingleCoil(addr, on) => {
            write(bank, RegisterClass::Coil, addr, &[u16::from(on)]).map(|()| Response::WriteSingleCoil(addr, on))
        }
        Request::WriteMultipleCoils(addr, coils) => {
            let words: Vec<u16> = coils.iter().map(|&b| u16::from(b)).collect();
            write(bank, RegisterClass::Coil, addr, &words)
                .map(|()| Response::WriteMultipleCoils(addr, quantity(&coils)))
        }
        Request::WriteSingleRegister(addr, value) => {
            write(bank, RegisterClass::Holding, addr, &[value]).map(|()| Response::WriteSingleRegister(addr, value))
        }
        Request::WriteMultipleRegisters(addr, values) => write(bank, RegisterClass::Holding, addr, &values)
            .map(|()| Response::WriteMultipleRegisters(addr, quantity(&values))),
        Request::MaskWriteRegister(addr, and_mask, or_mask) => {
            let current = bank.holding(addr).ok_or(ExceptionCode::IllegalDataAddress)?;
            let value = (current & and_mask) | (or_mask & !and_mask);
            write(bank, RegisterClass::Holding, addr, &[value])
                .map(|()| Response::MaskWriteRegister(addr, and_mask, or_mask))
        }
        Request::ReadWriteMultipleRegisters(read_addr, cnt, write_addr, values) => {
            // Writes never define new cells, so checking the read range up
            // front keeps the request all-or-nothing.  Write happens before read.
            read_words(bank, RegisterClass::Holding, read_addr, cnt)
                .and_then(|_| write(bank, RegisterClass::Holding, write_addr, &values))
                .and_then(|()| read_words(bank, RegisterClass::Holding, read_addr, cnt))
                .map(Response::ReadWriteMultipleRegisters)
        }
        other => {
            warn!("modbus: unsupported function in {other:?}");
            Err(ExceptionCode::IllegalFunction)
        }
    };
    if let Err(e) = &res {
        debug!("modbus: exception {e:?}");
    }
    res
}

/// Reject a write aimed at an input class.  Kept separate from the match
/// so a bank-level caller can check before building a request.
pub fn check_writable(class: RegisterClass) -> Result<(), ExceptionCode> {
    if class.is_writable() { Ok(()) } else { Err(ExceptionCode::IllegalFunction) }
}

fn read_words(bank: &RegisterBank, class: RegisterClass, addr: u16, cnt: u16) -> Result<Vec<u16>, ExceptionCode> {
    bank.read_range(class, addr, cnt)
        .map_err(|_| ExceptionCode::IllegalDataAddress)
}

fn read_bits(bank: &RegisterBank, class: RegisterClass, addr: u16, cnt: u16) -> Result<Vec<bool>, ExceptionCode> {
    read_words(bank, class, addr, cnt).map(|ws| ws.into_iter().map(|w| w != 0).collect())
}

fn write(bank: &mut RegisterBank, class: RegisterClass, addr: u16, values: &[u16]) -> Result<(), ExceptionCode> {
    check_writable(class)?;
    bank.write_range(class, addr, values)
        .map_err(|_| ExceptionCode::IllegalDataAddress)
}

fn quantity<T: Clone>(values: &Cow<'_, [T]>) -> u16 {
    u16::try_from(values.len()).unwrap_or(u16::MAX)
}
