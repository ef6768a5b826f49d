//! Outbound board events.
//!
//! [`BoardRuntime`](super::runtime::BoardRuntime) and the reconnect policy
//! emit these through the [`EventSink`](super::ports::EventSink) port.
//! Adapters on the other side decide what to do with them.

use core::net::{Ipv4Addr, SocketAddrV4};

use crate::attach::AttachError;
use crate::config::ConnectType;

/// Structured events emitted by the board core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardEvent {
    /// Station associated and holding an address.
    Attached { ssid: Option<String>, ip: Ipv4Addr },

    /// Attach gave up; the board keeps running without network.
    AttachFailed(AttachError),

    /// Interface disconnected and powered down.
    Detached,

    /// The single transport for `role` is live.
    TransportReady(ConnectType),

    /// Outbound master connect failed; next attempt after the fixed delay.
    ReconnectScheduled { target: SocketAddrV4, attempt: u32 },

    /// Runtime came up (carries the selected role, if any).
    Started(Option<ConnectType>),
}
