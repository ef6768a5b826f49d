//! Fuzz target: `BoardConfig::from_json` + `ModbusSection::resolve`
//!
//! Invariants checked:
//! - No panics under any byte sequence
//! - A document that parses re-serialises, and if the output parses
//!   again it resolves to the same role
//!
//! cargo fuzz run fuzz_config_document

#![no_main]

use libfuzzer_sys::fuzz_target;
use mela::config::BoardConfig;

fuzz_target!(|data: &[u8]| {
    let Ok(cfg) = BoardConfig::from_json(data) else {
        return;
    };
    let role = cfg.modbus.resolve();

    let bytes = cfg.to_json().expect("parsed config must serialise");
    // Non-finite floats serialise as null and do not come back.
    if let Ok(again) = BoardConfig::from_json(&bytes) {
        assert_eq!(again.modbus.resolve(), role);
    }
});
