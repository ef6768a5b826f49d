//! Fuzz target: `modbus::service::serve`
//!
//! Drives arbitrary request sequences against a bank preloaded with a few
//! cells and checks:
//! - No panics, including at the top of the address space
//! - Input registers and discrete inputs never change
//!
//! cargo fuzz run fuzz_request_service

#![no_main]

use libfuzzer_sys::fuzz_target;
use mela::modbus::service::serve;
use mela::modbus::{RegisterBank, RegisterClass};
use tokio_modbus::Request;

fn word(b: &[u8], i: usize) -> u16 {
    u16::from_be_bytes([b[i], b[i + 1]])
}

fuzz_target!(|data: &[u8]| {
    let mut bank = RegisterBank::new();
    for offset in [0u16, 1, 2, 100, u16::MAX - 1, u16::MAX] {
        for class in RegisterClass::ALL {
            bank.set(class, offset, offset);
        }
    }
    let inputs: Vec<_> = [RegisterClass::Input, RegisterClass::DiscreteInput]
        .into_iter()
        .map(|c| (0..=u16::MAX).filter_map(|o| bank.get(c, o)).collect::<Vec<_>>())
        .collect();

    for chunk in data.chunks_exact(7) {
        let (a, b) = (word(chunk, 1), word(chunk, 3));
        let c = word(chunk, 5);
        let req = match chunk[0] % 8 {
            0 => Request::ReadCoils(a, b),
            1 => Request::ReadDiscreteInputs(a, b),
            2 => Request::ReadHoldingRegisters(a, b),
            3 => Request::ReadInputRegisters(a, b),
            4 => Request::WriteSingleCoil(a, b & 1 == 1),
            5 => Request::WriteSingleRegister(a, b),
            6 => Request::MaskWriteRegister(a, b, c),
            _ => Request::WriteMultipleRegisters(a, vec![b; usize::from(c % 8)].into()),
        };
        let _ = serve(&mut bank, req);
    }

    let after: Vec<_> = [RegisterClass::Input, RegisterClass::DiscreteInput]
        .into_iter()
        .map(|c| (0..=u16::MAX).filter_map(|o| bank.get(c, o)).collect::<Vec<_>>())
        .collect();
    assert_eq!(inputs, after);
});
