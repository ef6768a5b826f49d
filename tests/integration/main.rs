//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem.
//! Most run against mock adapters; `tcp_tests` uses the board adapters
//! over loopback sockets.  All tests run on the host (x86_64) with no
//! real radio or UART required.

mod connector_tests;
mod mock_modbus;
mod mock_wlan;
mod runtime_tests;
#[cfg(not(target_os = "espidf"))]
mod tcp_tests;
