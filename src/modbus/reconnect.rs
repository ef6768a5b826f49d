//! Outbound TCP master connection with fixed-delay retry.
//!
//! ```text
//!   Disconnected ──attempt ok──▶ Connected
//!        ▲   │attempt failed
//!        │   ├─ always_reconnect = false ─▶ ReconnectExhausted (no sleep)
//!        │   └─ always_reconnect = true  ─▶ sleep 5 s, attempt again (unbounded)
//!        └──────────── mark_disconnected()
//! ```
//!
//! No backoff growth, no jitter.  A slave that never comes back keeps the
//! caller blocked forever when `always_reconnect` is set.

use embedded_hal::delay::DelayNs;
use log::{info, warn};

use crate::app::events::BoardEvent;
use crate::app::ports::{EventSink, ModbusDriver};
use crate::config::MasterTarget;
use crate::error::{Error, Result};

/// Fixed wait between attempts.
pub const RECONNECT_DELAY_MS: u32 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    #[default]
    Disconnected,
    Connected,
}

#[derive(Debug, Default)]
pub struct ReconnectPolicy {
    state: LinkState,
    /// Attempts made by the last [`connect`](Self::connect) call.
    attempts: u32,
}

impl ReconnectPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Connect to `target`, blocking until connected or (without
    /// `always_reconnect`) after the first failure.
    pub fn connect<Drv, D, E>(
        &mut self,
        driver: &mut Drv,
        target: &MasterTarget,
        delay: &mut D,
        sink: &mut E,
    ) -> Result<Drv::Master>
    where
        Drv: ModbusDriver,
        D: DelayNs,
        E: EventSink,
    {
        self.state = LinkState::Disconnected;
        self.attempts = 0;
        loop {
            self.attempts = self.attempts.saturating_add(1);
            match driver.tcp_master(target.addr, target.timeout) {
                Ok(master) => {
                    info!("modbus: connected to {} after {} attempt(s)", target.addr, self.attempts);
                    self.state = LinkState::Connected;
                    return Ok(master);
                }
                Err(e) if !target.always_reconnect => {
                    warn!("modbus: connect to {} failed: {e}", target.addr);
                    return Err(Error::ReconnectExhausted(e));
                }
                Err(e) => {
                    warn!(
                        "modbus: connect to {} failed ({e}), retrying in {} ms",
                        target.addr, RECONNECT_DELAY_MS
                    );
                    sink.emit(&BoardEvent::ReconnectScheduled {
                        target: target.addr,
                        attempt: self.attempts,
                    });
                    delay.delay_ms(RECONNECT_DELAY_MS);
                }
            }
        }
    }

    /// Record a link loss observed by the caller.
    pub fn mark_disconnected(&mut self) {
        if self.state == LinkState::Connected {
            info!("modbus: master link marked disconnected");
        }
        self.state = LinkState::Disconnected;
    }
}
