//! Wireless uplink lifecycle: scan, match, connect, wait, tear down.
//!
//! ```text
//!   activate ─▶ connected? ──yes──▶ Ok(ip)
//!                  │no
//!                  ▼
//!               scan ─▶ sort by rssi (stable) ─▶ first SSID in candidates
//!                                                   │none ─▶ NoMatchingNetwork
//!                                                   ▼
//!               connect(key) ─▶ poll every 100 ms × 100
//!                                   │connected ─▶ Ok(ip)
//!                                   │exhausted ─▶ disconnect, deactivate, AttachTimeout
//! ```
//!
//! Ties in signal strength keep scan order; candidate-list order never
//! influences the pick.  All waits go through the caller's `DelayNs`.

use core::fmt;
use core::net::Ipv4Addr;
use core::ops::{Deref, DerefMut};

use embedded_hal::delay::DelayNs;
use log::{info, warn};

use crate::app::ports::{ScanResult, WlanError, WlanPort};
use crate::config::WlanCandidate;

/// Delay between association status checks.
pub const ATTACH_POLL_INTERVAL_MS: u32 = 100;
/// Status checks before giving up (≈ 10 s total).
pub const ATTACH_POLL_ATTEMPTS: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachError {
    /// No scanned SSID equals any configured candidate.
    NoMatchingNetwork,
    /// Association did not complete within the poll budget.
    AttachTimeout,
    /// The interface itself failed.
    Interface(WlanError),
}

impl fmt::Display for AttachError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoMatchingNetwork => write!(f, "no configured network in range"),
            Self::AttachTimeout => write!(f, "association timed out"),
            Self::Interface(e) => write!(f, "interface: {e}"),
        }
    }
}

impl core::error::Error for AttachError {}

impl From<WlanError> for AttachError {
    fn from(e: WlanError) -> Self {
        Self::Interface(e)
    }
}

/// Snapshot returned by [`NetworkAttachment::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkStatus {
    pub active: bool,
    pub connected: bool,
    pub ip: Option<Ipv4Addr>,
}

/// Owns the station interface.
pub struct NetworkAttachment<W: WlanPort> {
    wlan: W,
    /// SSID we last associated with, if we did the associating.
    ssid: Option<String>,
}

impl<W: WlanPort> NetworkAttachment<W> {
    pub fn new(wlan: W) -> Self {
        Self { wlan, ssid: None }
    }

    /// Bring the interface up and obtain an address.
    ///
    /// Idempotent: an already associated interface returns its current IP
    /// without scanning.
    pub fn attach<D: DelayNs>(&mut self, candidates: &[WlanCandidate], delay: &mut D) -> Result<Ipv4Addr, AttachError> {
        self.wlan.activate(true)?;

        if self.wlan.is_connected() {
            if let Some(ip) = self.wlan.ip() {
                info!("attach: already connected, ip={ip}");
                return Ok(ip);
            }
        }

        let networks = self.survey()?;
        let Some((ap, candidate)) = select(&networks, candidates) else {
            warn!(
                "attach: none of {} candidate(s) among {} scanned network(s)",
                candidates.len(),
                networks.len()
            );
            return Err(AttachError::NoMatchingNetwork);
        };

        info!("attach: connecting to '{}' (rssi={} ch={})", ap.ssid, ap.rssi, ap.channel);
        self.wlan.connect(&candidate.ssid, &candidate.key)?;

        for _ in 0..ATTACH_POLL_ATTEMPTS {
            if self.wlan.is_connected() {
                if let Some(ip) = self.wlan.ip() {
                    info!("attach: connected to '{}', ip={ip}", ap.ssid);
                    self.ssid = Some(ap.ssid.clone());
                    return Ok(ip);
                }
            }
            delay.delay_ms(ATTACH_POLL_INTERVAL_MS);
        }

        warn!(
            "attach: '{}' did not come up within {} ms",
            ap.ssid,
            ATTACH_POLL_ATTEMPTS * ATTACH_POLL_INTERVAL_MS
        );
        // Best effort; the timeout is what the caller needs to see.
        let _ = self.wlan.disconnect();
        let _ = self.wlan.activate(false);
        Err(AttachError::AttachTimeout)
    }

    /// Disconnect and power the interface down.
    pub fn detach(&mut self) -> Result<(), AttachError> {
        self.ssid = None;
        if self.wlan.is_connected() {
            self.wlan.disconnect()?;
        }
        self.wlan.activate(false)?;
        info!("attach: detached");
        Ok(())
    }

    /// Attach and return a guard that detaches when dropped.
    pub fn attach_scoped<D: DelayNs>(
        &mut self,
        candidates: &[WlanCandidate],
        delay: &mut D,
    ) -> Result<AttachGuard<'_, W>, AttachError> {
        let mut guard = AttachGuard { inner: self };
        // On failure the guard drops here and tears the interface down.
        guard.inner.attach(candidates, delay)?;
        Ok(guard)
    }

    /// Scan and return results strongest first.
    pub fn survey(&mut self) -> Result<Vec<ScanResult>, AttachError> {
        let mut networks = self.wlan.scan()?;
        networks.sort_by(|a, b| b.rssi.cmp(&a.rssi));
        Ok(networks)
    }

    pub fn status(&self) -> LinkStatus {
        LinkStatus {
            active: self.wlan.is_active(),
            connected: self.wlan.is_connected(),
            ip: self.ip(),
        }
    }

    /// Bound address, only while connected.
    pub fn ip(&self) -> Option<Ipv4Addr> {
        if self.wlan.is_connected() { self.wlan.ip() } else { None }
    }

    /// SSID this attachment associated with.
    pub fn ssid(&self) -> Option<&str> {
        self.ssid.as_deref()
    }

    pub fn wlan(&self) -> &W {
        &self.wlan
    }

    pub fn wlan_mut(&mut self) -> &mut W {
        &mut self.wlan
    }
}

/// Pick the strongest scanned network that names a candidate.
///
/// `networks` must already be sorted strongest first.
fn select<'a, 'c>(networks: &'a [ScanResult], candidates: &'c [WlanCandidate]) -> Option<(&'a ScanResult, &'c WlanCandidate)> {
    networks.iter().find_map(|ap| {
        candidates
            .iter()
            .find(|c| c.ssid.as_str() == ap.ssid)
            .map(|c| (ap, c))
    })
}

/// Keeps the interface attached for its lifetime.
///
/// Detaches on drop, including during unwinding.
pub struct AttachGuard<'a, W: WlanPort> {
    inner: &'a mut NetworkAttachment<W>,
}

impl<W: WlanPort> AttachGuard<'_, W> {
    pub fn ip(&self) -> Option<Ipv4Addr> {
        self.inner.ip()
    }
}

impl<W: WlanPort> Deref for AttachGuard<'_, W> {
    type Target = NetworkAttachment<W>;

    fn deref(&self) -> &Self::Target {
        self.inner
    }
}

impl<W: WlanPort> DerefMut for AttachGuard<'_, W> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.inner
    }
}

impl<W: WlanPort> Drop for AttachGuard<'_, W> {
    fn drop(&mut self) {
        if let Err(e) = self.inner.detach() {
            warn!("attach: detach on scope exit failed: {e}");
        }
    }
}
