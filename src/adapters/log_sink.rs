//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured board events to the
//! ESP-IDF logger (UART / USB-CDC in production).

use log::{info, warn};

use crate::app::events::BoardEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`BoardEvent`] to the serial console.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &BoardEvent) {
        match event {
            BoardEvent::Attached { ssid, ip } => {
                info!("WLAN  | attached ssid={} ip={}", ssid.as_deref().unwrap_or("<existing>"), ip);
            }
            BoardEvent::AttachFailed(e) => {
                warn!("WLAN  | attach failed: {}", e);
            }
            BoardEvent::Detached => {
                info!("WLAN  | detached");
            }
            BoardEvent::TransportReady(role) => {
                info!("MODBUS| {} ready", role);
            }
            BoardEvent::ReconnectScheduled { target, attempt } => {
                warn!("MODBUS| {} unreachable (attempt {}), retrying", target, attempt);
            }
            BoardEvent::Started(role) => match role {
                Some(r) => info!("START | role={}", r),
                None => info!("START | no Modbus role"),
            },
        }
    }
}
