//! Mela board firmware library.
//!
//! Exposes the board core for integration testing and for the firmware
//! binary.  All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod attach;
pub mod config;
pub mod error;
pub mod modbus;
pub mod pins;

// ESP-IDF adapters compile on host too; the real implementations are
// guarded by cfg attributes inside.
pub mod adapters;

pub use error::{Error, Result};
