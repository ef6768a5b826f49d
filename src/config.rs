//! Board configuration document.
//!
//! Mirrors the persisted JSON layout:
//!
//! ```text
//! { "config": {
//!     "wifi":   { "connect_on_boot": bool, "networks": [ {ssid, key}, ... ] },
//!     "modbus": { "connect_type": "slave-serial" | ... | false,
//!                 "slave-serial":   {...},
//!                 "master-serial":  {...},
//!                 "slave-network":  {...},
//!                 "master-network": {...} } } }
//! ```
//!
//! The document may carry all four role sub-objects at once; only the one
//! named by `connect_type` is ever used.  [`ModbusSection::resolve`] turns
//! the document into a [`Role`], which carries that single payload and
//! nothing else.

use core::fmt;
use core::net::{Ipv4Addr, SocketAddrV4};
use core::time::Duration;

use serde::de::{self, DeserializeOwned, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::app::ports::{ConfigError, ConfigPort, TransportError};
use crate::error::Error;
use crate::modbus::bank::{InitialValues, RegisterClass, RegisterDefinition};

/// Longest SSID accepted by 802.11.
pub const SSID_MAX_LEN: usize = 32;
/// Longest WPA2 passphrase.
pub const KEY_MAX_LEN: usize = 64;

/// Default Modbus TCP port.
pub const DEFAULT_TCP_PORT: u16 = 502;
/// Per-attempt connect timeout for the TCP master when none is configured.
pub const DEFAULT_MASTER_TIMEOUT_SECS: f32 = 5.0;

// ───────────────────────────────────────────────────────────────
// Document root
// ───────────────────────────────────────────────────────────────

/// On-disk wrapper: the board config lives under a top-level `config` key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigDocument {
    config: BoardConfig,
}

/// Everything the board reads at boot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardConfig {
    #[serde(default)]
    pub wifi: WifiConfig,
    #[serde(default)]
    pub modbus: ModbusSection,
}

impl BoardConfig {
    /// Parse a persisted document.
    pub fn from_json(bytes: &[u8]) -> Result<Self, ConfigError> {
        let doc: ConfigDocument = serde_json::from_slice(bytes).map_err(|e| {
            log::warn!("config: parse failed at line {} col {}: {}", e.line(), e.column(), e);
            ConfigError::Corrupted
        })?;
        Ok(doc.config)
    }

    /// Serialise into the persisted document layout.
    pub fn to_json(&self) -> Result<Vec<u8>, ConfigError> {
        let doc = ConfigDocument { config: self.clone() };
        serde_json::to_vec(&doc).map_err(|_| ConfigError::IoError)
    }
}

// ───────────────────────────────────────────────────────────────
// WiFi section
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WifiConfig {
    #[serde(default)]
    pub connect_on_boot: bool,
    /// Candidate networks.  Order here does not affect selection; scan
    /// order by signal strength does.
    #[serde(default)]
    pub networks: Vec<WlanCandidate>,
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            connect_on_boot: false,
            networks: vec![WlanCandidate::new("LAN", "12345").unwrap_or_default()],
        }
    }
}

/// A configured access point.  Length limits are enforced at parse time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WlanCandidate {
    pub ssid: heapless::String<SSID_MAX_LEN>,
    #[serde(default)]
    pub key: heapless::String<KEY_MAX_LEN>,
}

impl WlanCandidate {
    /// Build a candidate; `None` if either field exceeds its limit.
    pub fn new(ssid: &str, key: &str) -> Option<Self> {
        Some(Self {
            ssid: heapless::String::try_from(ssid).ok()?,
            key: heapless::String::try_from(key).ok()?,
        })
    }
}

// ───────────────────────────────────────────────────────────────
// Modbus section
// ───────────────────────────────────────────────────────────────

/// The `connect_type` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectType {
    #[serde(rename = "slave-serial", alias = "slave485")]
    SlaveSerial,
    #[serde(rename = "master-serial", alias = "master485")]
    MasterSerial,
    #[serde(rename = "slave-network", alias = "slaveTCP")]
    SlaveNetwork,
    #[serde(rename = "master-network", alias = "masterTCP")]
    MasterNetwork,
}

impl ConnectType {
    /// Roles that need an attached WLAN before the transport can exist.
    pub const fn requires_network(self) -> bool {
        matches!(self, Self::SlaveNetwork | Self::MasterNetwork)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SlaveSerial => "slave-serial",
            Self::MasterSerial => "master-serial",
            Self::SlaveNetwork => "slave-network",
            Self::MasterNetwork => "master-network",
        }
    }
}

impl fmt::Display for ConnectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw `modbus` section as persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModbusSection {
    /// Absent, `null`, `false` and `""` all mean "no transport".
    #[serde(default, deserialize_with = "absent_as_none", skip_serializing_if = "Option::is_none")]
    pub connect_type: Option<ConnectType>,
    #[serde(
        rename = "slave-serial",
        alias = "slave485",
        default,
        deserialize_with = "absent_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub slave_serial: Option<SlaveSerialConfig>,
    #[serde(
        rename = "master-serial",
        alias = "master485",
        default,
        deserialize_with = "absent_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub master_serial: Option<SerialParams>,
    #[serde(
        rename = "slave-network",
        alias = "slaveTCP",
        default,
        deserialize_with = "absent_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub slave_network: Option<SlaveNetworkConfig>,
    #[serde(
        rename = "master-network",
        alias = "masterTCP",
        default,
        deserialize_with = "absent_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub master_network: Option<MasterNetworkConfig>,
}

impl ModbusSection {
    /// Pick the active role.  `Ok(None)` when `connect_type` is unset.
    ///
    /// Fails with [`Error::ConfigurationMissing`] when the named role has
    /// no (or an empty) sub-object.  Touches nothing but `self`.
    pub fn resolve(&self) -> Result<Option<Role>, Error> {
        let Some(kind) = self.connect_type else {
            return Ok(None);
        };
        let role = match kind {
            ConnectType::SlaveSerial => Role::SlaveSerial(
                self.slave_serial
                    .clone()
                    .ok_or(Error::ConfigurationMissing("modbus.slave-serial"))?,
            ),
            ConnectType::MasterSerial => Role::MasterSerial(
                self.master_serial
                    .clone()
                    .ok_or(Error::ConfigurationMissing("modbus.master-serial"))?,
            ),
            ConnectType::SlaveNetwork => Role::SlaveNetwork(
                self.slave_network
                    .clone()
                    .ok_or(Error::ConfigurationMissing("modbus.slave-network"))?,
            ),
            ConnectType::MasterNetwork => Role::MasterNetwork(
                self.master_network
                    .as_ref()
                    .ok_or(Error::ConfigurationMissing("modbus.master-network"))?
                    .target()?,
            ),
        };
        Ok(Some(role))
    }
}

/// The single active role with only its own payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Role {
    SlaveSerial(SlaveSerialConfig),
    MasterSerial(SerialParams),
    SlaveNetwork(SlaveNetworkConfig),
    MasterNetwork(MasterTarget),
}

impl Role {
    pub const fn connect_type(&self) -> ConnectType {
        match self {
            Self::SlaveSerial(_) => ConnectType::SlaveSerial,
            Self::MasterSerial(_) => ConnectType::MasterSerial,
            Self::SlaveNetwork(_) => ConnectType::SlaveNetwork,
            Self::MasterNetwork(_) => ConnectType::MasterNetwork,
        }
    }

    pub const fn requires_network(&self) -> bool {
        self.connect_type().requires_network()
    }
}

// ───────────────────────────────────────────────────────────────
// Role payloads
// ───────────────────────────────────────────────────────────────

/// UART parity as persisted: `null` = none, `0` = even, `1` = odd.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Option<u8>", into = "Option<u8>")]
pub enum Parity {
    #[default]
    None,
    Even,
    Odd,
}

impl TryFrom<Option<u8>> for Parity {
    type Error = &'static str;

    fn try_from(raw: Option<u8>) -> Result<Self, Self::Error> {
        match raw {
            None => Ok(Self::None),
            Some(0) => Ok(Self::Even),
            Some(1) => Ok(Self::Odd),
            Some(_) => Err("parity must be null, 0 (even) or 1 (odd)"),
        }
    }
}

impl From<Parity> for Option<u8> {
    fn from(p: Parity) -> Self {
        match p {
            Parity::None => None,
            Parity::Even => Some(0),
            Parity::Odd => Some(1),
        }
    }
}

/// UART framing shared by both serial roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialParams {
    #[serde(default = "default_baudrate")]
    pub baudrate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    #[serde(default)]
    pub parity: Parity,
}

impl Default for SerialParams {
    fn default() -> Self {
        Self {
            baudrate: default_baudrate(),
            data_bits: default_data_bits(),
            stop_bits: default_stop_bits(),
            parity: Parity::None,
        }
    }
}

impl SerialParams {
    /// Reject framings no UART can produce.
    pub fn validate(&self) -> Result<(), TransportError> {
        if !(300..=5_000_000).contains(&self.baudrate) {
            return Err(TransportError::Rejected("baudrate out of range"));
        }
        if !(5..=8).contains(&self.data_bits) {
            return Err(TransportError::Rejected("data_bits must be 5-8"));
        }
        if !(1..=2).contains(&self.stop_bits) {
            return Err(TransportError::Rejected("stop_bits must be 1 or 2"));
        }
        Ok(())
    }
}

fn default_baudrate() -> u32 {
    9600
}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    1
}

fn default_tcp_port() -> u16 {
    DEFAULT_TCP_PORT
}

fn default_master_timeout() -> f32 {
    DEFAULT_MASTER_TIMEOUT_SECS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlaveSerialConfig {
    /// Unit address on the bus.
    pub address: u8,
    #[serde(flatten)]
    pub line: SerialParams,
    #[serde(default)]
    pub load_definitions_from_config: bool,
    #[serde(default)]
    pub register_definitions: RegisterDefinitions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlaveNetworkConfig {
    #[serde(default = "default_tcp_port")]
    pub port: u16,
    #[serde(default)]
    pub load_definitions_from_config: bool,
    #[serde(default)]
    pub register_definitions: RegisterDefinitions,
}

/// Raw `master-network` object; `slave_ip` may be unset (`false`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterNetworkConfig {
    #[serde(default, deserialize_with = "absent_as_none", skip_serializing_if = "Option::is_none")]
    pub slave_ip: Option<String>,
    #[serde(default = "default_tcp_port")]
    pub port: u16,
    /// Per-attempt connect timeout, seconds.
    #[serde(default = "default_master_timeout")]
    pub timeout: f32,
    #[serde(default)]
    pub always_reconnect: bool,
}

impl Default for MasterNetworkConfig {
    fn default() -> Self {
        Self {
            slave_ip: None,
            port: DEFAULT_TCP_PORT,
            timeout: DEFAULT_MASTER_TIMEOUT_SECS,
            always_reconnect: false,
        }
    }
}

impl MasterNetworkConfig {
    /// Resolve into a concrete endpoint.
    pub fn target(&self) -> Result<MasterTarget, Error> {
        let ip: Ipv4Addr = self
            .slave_ip
            .as_deref()
            .ok_or(Error::ConfigurationMissing("modbus.master-network.slave_ip"))?
            .parse()
            .map_err(|_| Error::ConfigurationMissing("modbus.master-network.slave_ip (not IPv4)"))?;
        let timeout = if self.timeout.is_finite() && self.timeout > 0.0 {
            Duration::from_secs_f32(self.timeout)
        } else {
            Duration::from_secs_f32(DEFAULT_MASTER_TIMEOUT_SECS)
        };
        Ok(MasterTarget {
            addr: SocketAddrV4::new(ip, self.port),
            timeout,
            always_reconnect: self.always_reconnect,
        })
    }
}

/// Resolved `master-network` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MasterTarget {
    pub addr: SocketAddrV4,
    pub timeout: Duration,
    pub always_reconnect: bool,
}

// ───────────────────────────────────────────────────────────────
// Register definitions
// ───────────────────────────────────────────────────────────────

/// `register_definitions` in document order.
///
/// Persisted as `{ class: { name: {register, len, val} } }`.  Order
/// matters because overlapping entries resolve last-write-wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterDefinitions(Vec<RegisterDefinition>);

impl RegisterDefinitions {
    pub fn new(definitions: Vec<RegisterDefinition>) -> Self {
        Self(definitions)
    }

    pub fn as_slice(&self) -> &[RegisterDefinition] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One `{register, len, val}` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DefinitionEntry {
    register: u16,
    len: u16,
    val: ValueSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum ValueSpec {
    Flag(bool),
    Word(u16),
    Words(Vec<u16>),
}

impl From<ValueSpec> for InitialValues {
    fn from(v: ValueSpec) -> Self {
        match v {
            ValueSpec::Flag(b) => Self::Fill(u16::from(b)),
            ValueSpec::Word(w) => Self::Fill(w),
            ValueSpec::Words(ws) => Self::Sequence(ws),
        }
    }
}

impl From<&InitialValues> for ValueSpec {
    fn from(v: &InitialValues) -> Self {
        match v {
            InitialValues::Fill(w) => Self::Word(*w),
            InitialValues::Sequence(ws) => Self::Words(ws.clone()),
        }
    }
}

impl<'de> Deserialize<'de> for RegisterDefinitions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ClassTableVisitor;

        impl<'de> Visitor<'de> for ClassTableVisitor {
            type Value = RegisterDefinitions;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map from register class to named definitions")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut defs = Vec::new();
                while let Some(class) = map.next_key::<RegisterClass>()? {
                    let NamedEntries(entries) = map.next_value()?;
                    defs.extend(entries.into_iter().map(|(name, e)| RegisterDefinition {
                        name,
                        class,
                        offset: e.register,
                        len: e.len,
                        values: e.val.into(),
                    }));
                }
                Ok(RegisterDefinitions(defs))
            }
        }

        deserializer.deserialize_map(ClassTableVisitor)
    }
}

/// `{ name: entry, ... }` with insertion order preserved.
struct NamedEntries(Vec<(String, DefinitionEntry)>);

impl<'de> Deserialize<'de> for NamedEntries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = NamedEntries;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of named register definitions")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::new();
                while let Some(entry) = map.next_entry::<String, DefinitionEntry>()? {
                    entries.push(entry);
                }
                Ok(NamedEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

impl Serialize for RegisterDefinitions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // Group by class in first-seen order.
        let mut groups: Vec<(RegisterClass, Vec<&RegisterDefinition>)> = Vec::new();
        for def in &self.0 {
            match groups.iter_mut().find(|(class, _)| *class == def.class) {
                Some((_, members)) => members.push(def),
                None => groups.push((def.class, vec![def])),
            }
        }

        let mut map = serializer.serialize_map(Some(groups.len()))?;
        for (class, members) in &groups {
            map.serialize_entry(class, &NamedEntriesRef(members))?;
        }
        map.end()
    }
}

struct NamedEntriesRef<'a>(&'a [&'a RegisterDefinition]);

impl Serialize for NamedEntriesRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for def in self.0 {
            let entry = DefinitionEntry {
                register: def.offset,
                len: def.len,
                val: (&def.values).into(),
            };
            map.serialize_entry(&def.name, &entry)?;
        }
        map.end()
    }
}

// ───────────────────────────────────────────────────────────────
// Helpers
// ───────────────────────────────────────────────────────────────

/// Treat `null`, `false`, `""` and `{}` as an absent value.
fn absent_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null | Value::Bool(false)) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::Object(m)) if m.is_empty() => Ok(None),
        Some(v) => serde_json::from_value(v).map(Some).map_err(de::Error::custom),
    }
}

// ───────────────────────────────────────────────────────────────
// Factory defaults
// ───────────────────────────────────────────────────────────────

/// Status block layout shared by both slave roles' defaults.
fn default_status_definitions() -> RegisterDefinitions {
    let entry = |name: &str, offset, len| RegisterDefinition {
        name: name.into(),
        class: RegisterClass::Input,
        offset,
        len,
        values: InitialValues::Fill(0),
    };
    RegisterDefinitions(vec![
        entry("TIMESTAMP", 1, 2),
        entry("FREE_RAM", 3, 1),
        entry("FREE_VFS", 4, 1),
    ])
}

impl BoardConfig {
    /// Configuration used when nothing valid is persisted.  No role is
    /// selected, so the board boots without a transport.
    pub fn factory() -> Self {
        Self {
            wifi: WifiConfig::default(),
            modbus: ModbusSection {
                connect_type: None,
                slave_serial: Some(SlaveSerialConfig {
                    address: 10,
                    line: SerialParams::default(),
                    load_definitions_from_config: true,
                    register_definitions: default_status_definitions(),
                }),
                master_serial: Some(SerialParams::default()),
                slave_network: Some(SlaveNetworkConfig {
                    port: DEFAULT_TCP_PORT,
                    load_definitions_from_config: true,
                    register_definitions: default_status_definitions(),
                }),
                master_network: Some(MasterNetworkConfig::default()),
            },
        }
    }
}

/// Load from `port`, falling back to [`BoardConfig::factory`] when nothing
/// usable is stored.
pub fn load_or_factory<P: ConfigPort>(port: &P) -> BoardConfig {
    match port.load() {
        Ok(cfg) => cfg,
        Err(ConfigError::NotFound) => {
            log::info!("config: nothing stored, using factory defaults");
            BoardConfig::factory()
        }
        Err(e) => {
            log::warn!("config: {e}, using factory defaults");
            BoardConfig::factory()
        }
    }
}
