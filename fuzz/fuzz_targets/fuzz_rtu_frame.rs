//! Fuzz target: `adapters::rtu_frame`
//!
//! Feeds arbitrary bytes as a received RTU frame and checks:
//! - No panics in length prediction or decoding
//! - Every decoded request, once served, produces a reply whose CRC holds
//!
//! cargo fuzz run fuzz_rtu_frame

#![no_main]

use libfuzzer_sys::fuzz_target;
use mela::adapters::rtu_frame::{crc16, decode_request, encode_reply, expected_request_len};
use mela::modbus::service::serve;
use mela::modbus::{RegisterBank, RegisterClass};

fuzz_target!(|data: &[u8]| {
    let _ = expected_request_len(data);
    let Ok(frame) = decode_request(data) else {
        return;
    };

    let mut bank = RegisterBank::new();
    for offset in 0..16 {
        for class in RegisterClass::ALL {
            bank.set(class, offset, offset);
        }
    }
    let reply = encode_reply(frame.unit, frame.function, &serve(&mut bank, frame.request));
    let (body, tail) = reply.split_at(reply.len() - 2);
    assert_eq!(crc16(body).to_le_bytes(), [tail[0], tail[1]]);
});
