//! Modbus RTU framing: `unit | PDU | CRC16 (little-endian)`.
//!
//! Only the server direction is covered: requests are decoded into
//! [`Request`] for the bank service and its answers are encoded back.
//! The client side is handled by `tokio-modbus`.

use std::borrow::Cow;

use crc::{CRC_16_MODBUS, Crc};
use tokio_modbus::{ExceptionCode, Request, Response};

/// Largest RTU ADU on the wire.
pub const MAX_FRAME_LEN: usize = 256;

/// Unit address every slave accepts; no reply is sent.
pub const BROADCAST_UNIT: u8 = 0;

const MODBUS_CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

const COIL_ON: u16 = 0xFF00;
const COIL_OFF: u16 = 0x0000;

/// Why a received frame was not turned into a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Fewer bytes than `unit + function + CRC`.
    TooShort,
    /// Checksum mismatch; the frame is dropped without a reply.
    Crc,
    /// CRC was good but the PDU does not parse.  Answered with
    /// `IllegalDataValue`.
    Malformed { unit: u8, function: u8 },
}

/// A request addressed to some unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    pub unit: u8,
    pub function: u8,
    pub request: Request<'static>,
}

pub fn crc16(bytes: &[u8]) -> u16 {
    MODBUS_CRC.checksum(bytes)
}

/// Append the CRC to `unit | pdu`.
pub fn seal(unit: u8, pdu: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(pdu.len() + 3);
    frame.push(unit);
    frame.extend_from_slice(pdu);
    let crc = crc16(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame
}

/// Total frame length implied by the header, when the function code
/// fixes it.  `None` means the end is found by line silence alone.
pub fn expected_request_len(buf: &[u8]) -> Option<usize> {
    let function = *buf.get(1)?;
    match function {
        0x01..=0x06 => Some(8),
        0x0F | 0x10 => buf.get(6).map(|&n| 9 + usize::from(n)),
        0x16 => Some(10),
        0x17 => buf.get(10).map(|&n| 13 + usize::from(n)),
        _ => None,
    }
}

pub fn decode_request(frame: &[u8]) -> Result<RequestFrame, FrameError> {
    if frame.len() < 4 {
        return Err(FrameError::TooShort);
    }
    let (body, tail) = frame.split_at(frame.len() - 2);
    if crc16(body) != u16::from_le_bytes([tail[0], tail[1]]) {
        return Err(FrameError::Crc);
    }
    let (unit, function, data) = (body[0], body[1], &body[2..]);
    let malformed = FrameError::Malformed { unit, function };
    let request = parse_pdu(function, data).ok_or(malformed)?;
    Ok(RequestFrame {
        unit,
        function,
        request,
    })
}

fn word(data: &[u8], at: usize) -> Option<u16> {
    Some(u16::from_be_bytes([*data.get(at)?, *data.get(at + 1)?]))
}

fn parse_pdu(function: u8, data: &[u8]) -> Option<Request<'static>> {
    let fixed = |len: usize| (data.len() == len).then_some(());
    let req = match function {
        0x01 => {
            fixed(4)?;
            Request::ReadCoils(word(data, 0)?, word(data, 2)?)
        }
        0x02 => {
            fixed(4)?;
            Request::ReadDiscreteInputs(word(data, 0)?, word(data, 2)?)
        }
        0x03 => {
            fixed(4)?;
            Request::ReadHoldingRegisters(word(data, 0)?, word(data, 2)?)
        }
        0x04 => {
            fixed(4)?;
            Request::ReadInputRegisters(word(data, 0)?, word(data, 2)?)
        }
        0x05 => {
            fixed(4)?;
            let on = match word(data, 2)? {
                COIL_ON => true,
                COIL_OFF => false,
                _ => return None,
            };
            Request::WriteSingleCoil(word(data, 0)?, on)
        }
        0x06 => {
            fixed(4)?;
            Request::WriteSingleRegister(word(data, 0)?, word(data, 2)?)
        }
        0x0F => {
            let (addr, qty) = (word(data, 0)?, word(data, 2)?);
            let bytes = data.get(5..)?;
            if qty == 0 || usize::from(*data.get(4)?) != bytes.len() || bytes.len() != usize::from(qty).div_ceil(8) {
                return None;
            }
            let coils = (0..usize::from(qty)).map(|i| (bytes[i / 8] >> (i % 8)) & 1 == 1).collect();
            Request::WriteMultipleCoils(addr, Cow::Owned(coils))
        }
        0x10 => {
            let (addr, qty) = (word(data, 0)?, word(data, 2)?);
            let values = registers(qty, data.get(4..)?)?;
            Request::WriteMultipleRegisters(addr, Cow::Owned(values))
        }
        0x16 => {
            fixed(6)?;
            Request::MaskWriteRegister(word(data, 0)?, word(data, 2)?, word(data, 4)?)
        }
        0x17 => {
            let (read_addr, read_qty) = (word(data, 0)?, word(data, 2)?);
            let (write_addr, write_qty) = (word(data, 4)?, word(data, 6)?);
            let values = registers(write_qty, data.get(8..)?)?;
            Request::ReadWriteMultipleRegisters(read_addr, read_qty, write_addr, Cow::Owned(values))
        }
        other => Request::Custom(other, Cow::Owned(data.to_vec())),
    };
    Some(req)
}

/// `byte_count | values…` with the count checked against `qty`.
fn registers(qty: u16, data: &[u8]) -> Option<Vec<u16>> {
    let (&count, bytes) = data.split_first()?;
    if qty == 0 || usize::from(count) != bytes.len() || bytes.len() != usize::from(qty) * 2 {
        return None;
    }
    Some(bytes.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]])).collect())
}

/// Frame the service's answer to a request with `function`.
pub fn encode_reply(unit: u8, function: u8, reply: &Result<Response, ExceptionCode>) -> Vec<u8> {
    let pdu = match reply {
        Ok(resp) => response_pdu(function, resp),
        Err(code) => exception_pdu(function, *code),
    };
    seal(unit, &pdu)
}

fn exception_pdu(function: u8, code: ExceptionCode) -> Vec<u8> {
    vec![function | 0x80, exception_byte(code)]
}

fn exception_byte(code: ExceptionCode) -> u8 {
    match code {
        ExceptionCode::IllegalFunction => 0x01,
        ExceptionCode::IllegalDataAddress => 0x02,
        ExceptionCode::IllegalDataValue => 0x03,
        ExceptionCode::ServerDeviceBusy => 0x06,
        ExceptionCode::Custom(c) => c,
        _ => 0x04,
    }
}

fn response_pdu(function: u8, resp: &Response) -> Vec<u8> {
    let mut pdu = vec![function];
    let push_word = |pdu: &mut Vec<u8>, w: u16| pdu.extend_from_slice(&w.to_be_bytes());
    match resp {
        Response::ReadCoils(bits) | Response::ReadDiscreteInputs(bits) => {
            let mut packed = vec![0u8; bits.len().div_ceil(8)];
            for (i, _) in bits.iter().enumerate().filter(|(_, on)| **on) {
                packed[i / 8] |= 1 << (i % 8);
            }
            pdu.push(packed.len() as u8);
            pdu.extend_from_slice(&packed);
        }
        Response::ReadHoldingRegisters(words)
        | Response::ReadInputRegisters(words)
        | Response::ReadWriteMultipleRegisters(words) => {
            pdu.push((words.len() * 2) as u8);
            for &w in words {
                push_word(&mut pdu, w);
            }
        }
        Response::WriteSingleCoil(addr, on) => {
            push_word(&mut pdu, *addr);
            push_word(&mut pdu, if *on { COIL_ON } else { COIL_OFF });
        }
        Response::WriteSingleRegister(addr, value) => {
            push_word(&mut pdu, *addr);
            push_word(&mut pdu, *value);
        }
        Response::WriteMultipleCoils(addr, qty) | Response::WriteMultipleRegisters(addr, qty) => {
            push_word(&mut pdu, *addr);
            push_word(&mut pdu, *qty);
        }
        Response::MaskWriteRegister(addr, and_mask, or_mask) => {
            push_word(&mut pdu, *addr);
            push_word(&mut pdu, *and_mask);
            push_word(&mut pdu, *or_mask);
        }
        _ => return exception_pdu(function, ExceptionCode::ServerDeviceFailure),
    }
    pdu
}
