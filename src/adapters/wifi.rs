//! WiFi station-mode adapter.
//!
//! Implements [`WlanPort`], the hexagonal boundary for the radio.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: [`EspWlan`] drives `BlockingWifi<EspWifi>`.
//! - **all other targets**: [`SimWlan`], a scripted access-point table for
//!   host-side runs.
//!
//! `connect` only starts association on both; the attach loop polls
//! `is_connected` until DHCP has bound an address.

use core::net::Ipv4Addr;

use log::info;

use crate::app::ports::{AuthMode, ScanResult, WlanError, WlanPort};

// ───────────────────────────────────────────────────────────────
// ESP-IDF station
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub use esp::EspWlan;

#[cfg(target_os = "espidf")]
mod esp {
    use core::net::Ipv4Addr;

    use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};
    use log::{info, warn};

    use super::auth_mode;
    use crate::app::ports::{ScanResult, WlanError, WlanPort};

    pub struct EspWlan {
        wifi: BlockingWifi<EspWifi<'static>>,
    }

    impl EspWlan {
        pub fn new(wifi: BlockingWifi<EspWifi<'static>>) -> Self {
            Self { wifi }
        }
    }

    impl WlanPort for EspWlan {
        fn activate(&mut self, on: bool) -> Result<(), WlanError> {
            let started = self.wifi.is_started().unwrap_or(false);
            match (on, started) {
                (true, false) => {
                    self.wifi
                        .set_configuration(&Configuration::Client(ClientConfiguration::default()))
                        .map_err(|_| WlanError::ActivateFailed)?;
                    self.wifi.start().map_err(|_| WlanError::ActivateFailed)?;
                    info!("WiFi: station started");
                }
                (false, true) => {
                    self.wifi.stop().map_err(|_| WlanError::ActivateFailed)?;
                    info!("WiFi: station stopped");
                }
                _ => {}
            }
            Ok(())
        }

        fn is_active(&self) -> bool {
            self.wifi.is_started().unwrap_or(false)
        }

        fn is_connected(&self) -> bool {
            self.wifi.is_up().unwrap_or(false)
        }

        fn connect(&mut self, ssid: &str, key: &str) -> Result<(), WlanError> {
            let config = ClientConfiguration {
                ssid: ssid.try_into().map_err(|_| WlanError::InvalidCredentials)?,
                password: key.try_into().map_err(|_| WlanError::InvalidCredentials)?,
                auth_method: if key.is_empty() { AuthMethod::None } else { AuthMethod::WPA2Personal },
                ..Default::default()
            };
            self.wifi
                .set_configuration(&Configuration::Client(config))
                .map_err(|_| WlanError::ConnectFailed)?;
            // Non-blocking: association completes in the background.
            self.wifi.wifi_mut().connect().map_err(|e| {
                warn!("WiFi: connect request failed: {e}");
                WlanError::ConnectFailed
            })
        }

        fn disconnect(&mut self) -> Result<(), WlanError> {
            self.wifi.disconnect().map_err(|_| WlanError::DisconnectFailed)
        }

        fn scan(&mut self) -> Result<Vec<ScanResult>, WlanError> {
            let aps = self.wifi.scan().map_err(|e| {
                warn!("WiFi: scan failed: {e}");
                WlanError::ScanFailed
            })?;
            Ok(aps
                .into_iter()
                .map(|ap| ScanResult {
                    hidden: ap.ssid.is_empty(),
                    ssid: ap.ssid.as_str().to_owned(),
                    bssid: ap.bssid,
                    channel: ap.channel,
                    rssi: ap.signal_strength,
                    auth: auth_mode(ap.auth_method),
                })
                .collect())
        }

        fn ip(&self) -> Option<Ipv4Addr> {
            self.wifi.wifi().sta_netif().get_ip_info().ok().map(|info| info.ip)
        }
    }
}

#[cfg(target_os = "espidf")]
fn auth_mode(method: Option<esp_idf_svc::wifi::AuthMethod>) -> AuthMode {
    use esp_idf_svc::wifi::AuthMethod;
    match method {
        None | Some(AuthMethod::None) => AuthMode::Open,
        Some(AuthMethod::WEP) => AuthMode::Wep,
        Some(AuthMethod::WPA) => AuthMode::WpaPsk,
        Some(AuthMethod::WPA2Personal) => AuthMode::Wpa2Psk,
        Some(AuthMethod::WPAWPA2Personal) => AuthMode::WpaWpa2Psk,
        Some(AuthMethod::WPA3Personal | AuthMethod::WPA2WPA3Personal) => AuthMode::Wpa3Psk,
        Some(_) => AuthMode::Other,
    }
}

// ───────────────────────────────────────────────────────────────
// Simulation
// ───────────────────────────────────────────────────────────────

/// One simulated access point and the key it accepts.
#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Clone)]
pub struct SimAccessPoint {
    pub info: ScanResult,
    pub key: String,
}

#[cfg(not(target_os = "espidf"))]
impl SimAccessPoint {
    pub fn new(ssid: &str, key: &str, rssi: i8) -> Self {
        Self {
            info: ScanResult {
                ssid: ssid.to_owned(),
                bssid: [0x02, 0, 0, 0, 0, rssi.unsigned_abs()],
                channel: 6,
                rssi,
                auth: if key.is_empty() { AuthMode::Open } else { AuthMode::Wpa2Psk },
                hidden: ssid.is_empty(),
            },
            key: key.to_owned(),
        }
    }
}

/// Host-side station.  Association succeeds when SSID and key match an
/// entry; a wrong key never comes up, exercising the attach timeout.
#[cfg(not(target_os = "espidf"))]
pub struct SimWlan {
    aps: Vec<SimAccessPoint>,
    active: bool,
    associated: Option<usize>,
    /// Status polls before a correct association reports connected.
    latency_polls: u32,
    pending_polls: core::cell::Cell<u32>,
}

#[cfg(not(target_os = "espidf"))]
impl SimWlan {
    /// Address handed out by the simulated DHCP server.  Loopback, so
    /// network roles bind real sockets on the host.
    pub const SIM_IP: Ipv4Addr = Ipv4Addr::LOCALHOST;

    pub fn new(aps: Vec<SimAccessPoint>) -> Self {
        Self {
            aps,
            active: false,
            associated: None,
            latency_polls: 0,
            pending_polls: core::cell::Cell::new(0),
        }
    }

    /// Require `polls` status checks before the link reports up.
    pub fn with_latency(mut self, polls: u32) -> Self {
        self.latency_polls = polls;
        self
    }

    fn link_up(&self) -> bool {
        let Some(i) = self.associated else {
            return false;
        };
        if self.aps.get(i).is_none() {
            return false;
        }
        let left = self.pending_polls.get();
        if left > 0 {
            self.pending_polls.set(left - 1);
            return false;
        }
        true
    }
}

#[cfg(not(target_os = "espidf"))]
impl WlanPort for SimWlan {
    fn activate(&mut self, on: bool) -> Result<(), WlanError> {
        if self.active != on {
            info!("WiFi(sim): interface {}", if on { "up" } else { "down" });
        }
        self.active = on;
        if !on {
            self.associated = None;
        }
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn is_connected(&self) -> bool {
        self.active && self.link_up()
    }

    fn connect(&mut self, ssid: &str, key: &str) -> Result<(), WlanError> {
        if !self.active {
            return Err(WlanError::ConnectFailed);
        }
        // Wrong key: association "starts" but never completes.
        self.associated = self.aps.iter().position(|ap| ap.info.ssid == ssid && ap.key == key);
        self.pending_polls.set(self.latency_polls);
        info!("WiFi(sim): associating with '{}'", ssid);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), WlanError> {
        self.associated = None;
        Ok(())
    }

    fn scan(&mut self) -> Result<Vec<ScanResult>, WlanError> {
        if !self.active {
            return Err(WlanError::ScanFailed);
        }
        Ok(self.aps.iter().map(|ap| ap.info.clone()).collect())
    }

    fn ip(&self) -> Option<Ipv4Addr> {
        self.associated.map(|_| Self::SIM_IP)
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
