//! Modbus side of the board: register storage, request service, transport
//! construction and the outbound retry policy.
//!
//! ```text
//!   Role ──▶ connector::connect ──▶ ConnectionHandle
//!                                     ├─ SlaveSerial / SlaveNetwork: SlaveLink<S>
//!                                     │     owns RegisterBank, answers via service::serve
//!                                     └─ MasterSerial / MasterNetwork: M (MasterIo)
//! ```

pub mod bank;
pub mod connector;
pub mod reconnect;
pub mod service;
pub mod words;

use log::warn;

use crate::app::ports::{SlaveIo, TransportError};
use crate::config::ConnectType;

pub use bank::{InitialValues, RegisterBank, RegisterClass, RegisterDefinition};

/// A slave transport together with the bank it serves.
///
/// The bank lives and dies with the transport.  Application code reaches it
/// through [`bank_mut`](Self::bank_mut) between calls to
/// [`process`](Self::process).
pub struct SlaveLink<S: SlaveIo> {
    io: S,
    bank: RegisterBank,
}

impl<S: SlaveIo> SlaveLink<S> {
    pub fn new(io: S) -> Self {
        Self {
            io,
            bank: RegisterBank::new(),
        }
    }

    /// Serve at most one pending request.  Returns whether one was handled.
    pub fn process(&mut self) -> Result<bool, TransportError> {
        let Some(req) = self.io.poll_request()? else {
            return Ok(false);
        };
        let res = service::serve(&mut self.bank, req);
        if let Err(e) = self.io.respond(res) {
            warn!("modbus: failed to send response: {e}");
            return Err(e);
        }
        Ok(true)
    }

    pub fn bank(&self) -> &RegisterBank {
        &self.bank
    }

    pub fn bank_mut(&mut self) -> &mut RegisterBank {
        &mut self.bank
    }

    pub fn io(&self) -> &S {
        &self.io
    }

    pub fn io_mut(&mut self) -> &mut S {
        &mut self.io
    }
}

/// The single live transport, one variant per role.
pub enum ConnectionHandle<S: SlaveIo, M> {
    SlaveSerial(SlaveLink<S>),
    MasterSerial(M),
    SlaveNetwork(SlaveLink<S>),
    MasterNetwork(M),
}

impl<S: SlaveIo, M> ConnectionHandle<S, M> {
    pub const fn connect_type(&self) -> ConnectType {
        match self {
            Self::SlaveSerial(_) => ConnectType::SlaveSerial,
            Self::MasterSerial(_) => ConnectType::MasterSerial,
            Self::SlaveNetwork(_) => ConnectType::SlaveNetwork,
            Self::MasterNetwork(_) => ConnectType::MasterNetwork,
        }
    }

    pub fn as_slave(&self) -> Option<&SlaveLink<S>> {
        match self {
            Self::SlaveSerial(s) | Self::SlaveNetwork(s) => Some(s),
            Self::MasterSerial(_) | Self::MasterNetwork(_) => None,
        }
    }

    pub fn as_slave_mut(&mut self) -> Option<&mut SlaveLink<S>> {
        match self {
            Self::SlaveSerial(s) | Self::SlaveNetwork(s) => Some(s),
            Self::MasterSerial(_) | Self::MasterNetwork(_) => None,
        }
    }

    pub fn as_master_mut(&mut self) -> Option<&mut M> {
        match self {
            Self::MasterSerial(m) | Self::MasterNetwork(m) => Some(m),
            Self::SlaveSerial(_) | Self::SlaveNetwork(_) => None,
        }
    }
}

impl<S: SlaveIo, M> core::fmt::Debug for ConnectionHandle<S, M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "ConnectionHandle({})", self.connect_type())
    }
}
