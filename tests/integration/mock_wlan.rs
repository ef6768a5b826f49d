//! Scripted station interface for integration tests.
//!
//! Records every port call so tests can assert on the exact sequence the
//! attach logic drove, without a radio.

use std::cell::Cell;
use std::net::Ipv4Addr;

use mela::app::ports::{AuthMode, ScanResult, WlanError, WlanPort};

#[derive(Debug, Clone, PartialEq)]
pub enum WlanCall {
    Activate(bool),
    Scan,
    Connect { ssid: String, key: String },
    Disconnect,
}

pub const MOCK_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 50);

pub struct MockWlan {
    pub calls: Vec<WlanCall>,
    pub networks: Vec<ScanResult>,
    active: bool,
    /// Associated SSID, once `connect` was called.
    joined: Option<String>,
    /// `None`: association never completes.
    polls_until_up: Option<u32>,
    polls: Cell<u32>,
    /// Report connected before any attach (e.g. carried over from a
    /// previous boot stage).
    preconnected: bool,
}

#[allow(dead_code)]
impl MockWlan {
    pub fn new(networks: &[(&str, i8)]) -> Self {
        Self {
            calls: Vec::new(),
            networks: networks.iter().map(|&(s, r)| ap(s, r)).collect(),
            active: false,
            joined: None,
            polls_until_up: Some(0),
            polls: Cell::new(0),
            preconnected: false,
        }
    }

    /// Association reports up after `polls` status checks.
    pub fn up_after(mut self, polls: u32) -> Self {
        self.polls_until_up = Some(polls);
        self
    }

    /// Association never completes.
    pub fn never_up(mut self) -> Self {
        self.polls_until_up = None;
        self
    }

    pub fn already_connected(mut self) -> Self {
        self.preconnected = true;
        self.active = true;
        self
    }

    pub fn scans(&self) -> usize {
        self.calls.iter().filter(|c| **c == WlanCall::Scan).count()
    }

    pub fn connects(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                WlanCall::Connect { ssid, .. } => Some(ssid.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn status_polls(&self) -> u32 {
        self.polls.get()
    }
}

impl WlanPort for MockWlan {
    fn activate(&mut self, on: bool) -> Result<(), WlanError> {
        self.calls.push(WlanCall::Activate(on));
        self.active = on;
        if !on {
            self.joined = None;
            self.preconnected = false;
        }
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn is_connected(&self) -> bool {
        if self.preconnected {
            return true;
        }
        if self.joined.is_none() {
            return false;
        }
        let n = self.polls.get();
        self.polls.set(n + 1);
        self.polls_until_up.is_some_and(|up| n >= up)
    }

    fn connect(&mut self, ssid: &str, key: &str) -> Result<(), WlanError> {
        self.calls.push(WlanCall::Connect {
            ssid: ssid.into(),
            key: key.into(),
        });
        self.joined = Some(ssid.into());
        self.polls.set(0);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), WlanError> {
        self.calls.push(WlanCall::Disconnect);
        self.joined = None;
        self.preconnected = false;
        Ok(())
    }

    fn scan(&mut self) -> Result<Vec<ScanResult>, WlanError> {
        self.calls.push(WlanCall::Scan);
        Ok(self.networks.clone())
    }

    fn ip(&self) -> Option<Ipv4Addr> {
        (self.preconnected || self.joined.is_some()).then_some(MOCK_IP)
    }
}

pub fn ap(ssid: &str, rssi: i8) -> ScanResult {
    ScanResult {
        ssid: ssid.into(),
        bssid: [0x02, 0, 0, 0, 0, rssi as u8],
        channel: 6,
        rssi,
        auth: AuthMode::Wpa2Psk,
        hidden: false,
    }
}
