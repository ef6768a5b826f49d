//! Port traits: the hexagonal boundary between the board core and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ attach / modbus / BoardRuntime (domain)
//! ```
//!
//! Driven adapters (WLAN station, Modbus library, event sinks, storage)
//! implement these traits.  The domain consumes them via generics, so the
//! core never touches the radio, the UART or a socket directly.  Blocking
//! waits go through `embedded_hal::delay::DelayNs`, not a port of our own.

use core::fmt;
use core::net::{Ipv4Addr, SocketAddrV4};
use core::time::Duration;

use tokio_modbus::{ExceptionCode, Request, Response, SlaveId};

use crate::config::{BoardConfig, SerialParams, SlaveSerialConfig};

// ───────────────────────────────────────────────────────────────
// WLAN port (driven adapter: domain ↔ station interface)
// ───────────────────────────────────────────────────────────────

/// Station-mode wireless interface.
///
/// All calls are synchronous.  `connect` only starts association; callers
/// poll [`is_connected`](Self::is_connected) until an address is bound.
pub trait WlanPort {
    fn activate(&mut self, on: bool) -> Result<(), WlanError>;
    fn is_active(&self) -> bool;
    /// Associated *and* holding an IP address.
    fn is_connected(&self) -> bool;
    fn connect(&mut self, ssid: &str, key: &str) -> Result<(), WlanError>;
    fn disconnect(&mut self) -> Result<(), WlanError>;
    /// Blocking scan; results in driver order.
    fn scan(&mut self) -> Result<Vec<ScanResult>, WlanError>;
    fn ip(&self) -> Option<Ipv4Addr>;
}

/// Authentication advertised by an access point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AuthMode {
    #[default]
    Open,
    Wep,
    WpaPsk,
    Wpa2Psk,
    WpaWpa2Psk,
    Wpa3Psk,
    Other,
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Open => "open",
            Self::Wep => "WEP",
            Self::WpaPsk => "WPA-PSK",
            Self::Wpa2Psk => "WPA2-PSK",
            Self::WpaWpa2Psk => "WPA/WPA2-PSK",
            Self::Wpa3Psk => "WPA3-PSK",
            Self::Other => "other",
        })
    }
}

/// One access point seen by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub ssid: String,
    pub bssid: [u8; 6],
    pub channel: u8,
    /// dBm; higher is stronger.
    pub rssi: i8,
    pub auth: AuthMode,
    pub hidden: bool,
}

// ───────────────────────────────────────────────────────────────
// Modbus ports (driven adapter: domain ↔ Modbus library)
// ───────────────────────────────────────────────────────────────

/// Server side of a transport.  The domain owns the register bank and
/// answers each request itself; the adapter only moves frames.
pub trait SlaveIo {
    /// Whether the transport already listens on its local resource.
    fn is_bound(&self) -> bool;

    /// Bind to `local_ip:port` (network) or claim the UART (serial; the
    /// address arguments are ignored there).
    fn bind(&mut self, local_ip: Ipv4Addr, port: u16) -> Result<(), TransportError>;

    /// Next pending request, without blocking.
    fn poll_request(&mut self) -> Result<Option<Request<'static>>, TransportError>;

    /// Answer the request last returned by [`poll_request`](Self::poll_request).
    fn respond(&mut self, response: Result<Response, ExceptionCode>) -> Result<(), TransportError>;
}

/// Client side of a transport.  Every call blocks until the remote answers
/// or the transport times out.
pub trait MasterIo {
    fn read_holding_registers(&mut self, unit: SlaveId, addr: u16, cnt: u16) -> Result<Vec<u16>, TransportError>;
    fn read_input_registers(&mut self, unit: SlaveId, addr: u16, cnt: u16) -> Result<Vec<u16>, TransportError>;
    fn read_coils(&mut self, unit: SlaveId, addr: u16, cnt: u16) -> Result<Vec<bool>, TransportError>;
    fn read_discrete_inputs(&mut self, unit: SlaveId, addr: u16, cnt: u16) -> Result<Vec<bool>, TransportError>;
    fn write_single_register(&mut self, unit: SlaveId, addr: u16, value: u16) -> Result<(), TransportError>;
    fn write_multiple_registers(&mut self, unit: SlaveId, addr: u16, values: &[u16]) -> Result<(), TransportError>;
    fn write_single_coil(&mut self, unit: SlaveId, addr: u16, on: bool) -> Result<(), TransportError>;
}

/// Factory for the four transport kinds.
///
/// Constructors only create the I/O object.  Binding, bank loading and
/// retry are the connector's business.
pub trait ModbusDriver {
    type Slave: SlaveIo;
    type Master: MasterIo;

    fn rtu_slave(&mut self, cfg: &SlaveSerialConfig) -> Result<Self::Slave, TransportError>;
    fn rtu_master(&mut self, line: &SerialParams) -> Result<Self::Master, TransportError>;
    fn tcp_slave(&mut self) -> Result<Self::Slave, TransportError>;
    /// One outbound connect attempt bounded by `timeout`.
    fn tcp_master(&mut self, addr: SocketAddrV4, timeout: Duration) -> Result<Self::Master, TransportError>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`BoardEvent`](super::events::BoardEvent)s
/// through this port.  Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::BoardEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists the board configuration document.
pub trait ConfigPort {
    /// Load configuration from persistent storage.
    /// Returns [`ConfigError::NotFound`] on first boot.
    fn load(&self) -> Result<BoardConfig, ConfigError>;

    /// Persist configuration.
    fn save(&mut self, config: &BoardConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`WlanPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WlanError {
    /// Driver refused to change the interface state.
    ActivateFailed,
    ScanFailed,
    /// The driver rejected the association request.
    ConnectFailed,
    /// SSID or key does not fit the driver's buffers.
    InvalidCredentials,
    DisconnectFailed,
}

impl fmt::Display for WlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ActivateFailed => write!(f, "interface activation failed"),
            Self::ScanFailed => write!(f, "scan failed"),
            Self::ConnectFailed => write!(f, "association request rejected"),
            Self::InvalidCredentials => write!(f, "SSID or key out of range"),
            Self::DisconnectFailed => write!(f, "disconnect failed"),
        }
    }
}

/// Errors from the Modbus transport ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// Socket / UART level failure.
    Io,
    Timeout,
    /// Parameters refused by the library or driver.
    Rejected(&'static str),
    /// Transport kind not available on this build.
    Unsupported,
    /// Slave used before [`SlaveIo::bind`].
    NotBound,
    /// The remote answered with a Modbus exception.
    Exception(ExceptionCode),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io => write!(f, "I/O error"),
            Self::Timeout => write!(f, "timed out"),
            Self::Rejected(why) => write!(f, "rejected: {why}"),
            Self::Unsupported => write!(f, "unsupported on this build"),
            Self::NotBound => write!(f, "not bound"),
            Self::Exception(code) => write!(f, "exception {code:?}"),
        }
    }
}

impl core::error::Error for TransportError {}

impl TransportError {
    /// The connection itself is gone or unresponsive.  A Modbus exception
    /// means the remote answered, so the link is still good.
    pub const fn is_link_failure(&self) -> bool {
        matches!(self, Self::Io | Self::Timeout)
    }
}

impl From<ExceptionCode> for TransportError {
    fn from(code: ExceptionCode) -> Self {
        Self::Exception(code)
    }
}

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No config found in storage (first boot).
    NotFound,
    /// Stored document failed to parse.
    Corrupted,
    /// Underlying storage is full.
    StorageFull,
    /// Generic I/O error from the storage backend.
    IoError,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::StorageFull => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}
