//! Unified error types for the Mela firmware.
//!
//! Every subsystem keeps its own small error enum (see [`AttachError`],
//! [`TransportError`], [`WlanError`]) and funnels into the top-level
//! [`Error`] through `From`, so the runtime and the binary handle one type.
//! All variants are `Copy`.

use core::fmt;

use crate::app::ports::{TransportError, WlanError};
use crate::attach::AttachError;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible board-level operation funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A required configuration object is absent or empty.
    /// Raised before any hardware or network resource is touched.
    ConfigurationMissing(&'static str),
    /// The wireless interface could not be brought to an IP-bound state.
    Attach(AttachError),
    /// A network role was requested without a prior successful attach.
    DependencyNotReady(&'static str),
    /// The Modbus library rejected the transport parameters.
    TransportConstructionFailure(TransportError),
    /// Outbound master connection failed and `always_reconnect` is off.
    ReconnectExhausted(TransportError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigurationMissing(what) => write!(f, "configuration missing: {what}"),
            Self::Attach(e) => write!(f, "attach: {e}"),
            Self::DependencyNotReady(what) => write!(f, "dependency not ready: {what}"),
            Self::TransportConstructionFailure(e) => write!(f, "transport construction: {e}"),
            Self::ReconnectExhausted(e) => write!(f, "reconnect exhausted: {e}"),
        }
    }
}

impl core::error::Error for Error {}

impl From<AttachError> for Error {
    fn from(e: AttachError) -> Self {
        Self::Attach(e)
    }
}

impl From<WlanError> for Error {
    fn from(e: WlanError) -> Self {
        Self::Attach(AttachError::Interface(e))
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
