//! Mela board firmware: main entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  EspWlan        BoardModbusDriver   NvsAdapter   LogEventSink  │
//! │  (WlanPort)     (ModbusDriver)      (ConfigPort) (EventSink)   │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │  BoardRuntime: attach · connector · reconnect policy   │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  Application loop (this file): slave poll / master poll        │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::Result;
use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::wifi::{BlockingWifi, EspWifi};
use log::{error, info, warn};
use tokio_modbus::SlaveId;

use mela::adapters::log_sink::LogEventSink;
use mela::adapters::modbus_driver::BoardModbusDriver;
use mela::adapters::nvs::NvsAdapter;
use mela::adapters::system;
use mela::adapters::time::Esp32TimeAdapter;
use mela::adapters::wifi::EspWlan;
use mela::app::runtime::BoardRuntime;
use mela::app::status::BoardStatus;
use mela::config::{self, ConnectType};

/// Loop period.
const TICK_MS: u32 = 100;
/// Slave: refresh the status registers every this many ticks.
const STATUS_REFRESH_TICKS: u32 = 10;
/// Master: poll the remote status block every this many ticks.
const MASTER_POLL_TICKS: u32 = 100;
/// Unit addressed by the master loop.
const REMOTE_UNIT: SlaveId = 1;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  Mela board v{}                      ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Load config from NVS (or factory) ──────────────────
    let nvs = match NvsAdapter::new() {
        Ok(n) => n,
        Err(e) => {
            warn!("NVS init failed ({}), running with factory config and no persistence", e);
            NvsAdapter::default()
        }
    };
    let board_config = config::load_or_factory(&nvs);

    // ── 3. Construct adapters ─────────────────────────────────
    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let wifi = BlockingWifi::wrap(EspWifi::new(peripherals.modem, sysloop.clone(), None)?, sysloop)?;
    let wlan = EspWlan::new(wifi);

    let mut sink = LogEventSink::new();
    let mut delay = FreeRtos;
    let clock = Esp32TimeAdapter::new();

    // ── 4. Boot the runtime ───────────────────────────────────
    let mut runtime = BoardRuntime::start(board_config, wlan, BoardModbusDriver::new(), &mut delay, &mut sink)?;
    if let Some(ip) = runtime.ip() {
        info!("Board ready at {}", ip);
    }

    info!("System ready. Entering event loop.");

    // ── 5. Event loop ─────────────────────────────────────────
    let mut tick: u32 = 0;
    loop {
        FreeRtos::delay_ms(TICK_MS);
        tick = tick.wrapping_add(1);

        let Some(role) = runtime.role().map(config::Role::connect_type) else {
            continue;
        };
        let mut failed = false;

        if let Some(handle) = runtime.handle_mut() {
            if let Some(link) = handle.as_slave_mut() {
                // Drain everything queued since the last tick.
                loop {
                    match link.process() {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(e) => {
                            warn!("Slave: {}", e);
                            break;
                        }
                    }
                }
                if tick % STATUS_REFRESH_TICKS == 0 {
                    BoardStatus::from_usage(clock.unix_secs(), system::heap_usage(), nvs.storage_usage())
                        .publish(link.bank_mut());
                }
            } else if let Some(master) = handle.as_master_mut() {
                if tick % MASTER_POLL_TICKS == 0 {
                    match BoardStatus::fetch(master, REMOTE_UNIT) {
                        Ok(status) => info!("Remote unit {}: {}", REMOTE_UNIT, status),
                        Err(e) => {
                            warn!("Remote unit {}: {}", REMOTE_UNIT, e);
                            failed = e.is_link_failure();
                        }
                    }
                }
            }
        } else if role.requires_network() && tick % MASTER_POLL_TICKS == 0 {
            // Link lost or a restart failed; retry until the transport exists.
            if let Err(e) = runtime.reattach(&mut delay, &mut sink) {
                warn!("Reattach: {}", e);
            }
        }

        if failed && role == ConnectType::MasterNetwork {
            if let Err(e) = runtime.restart_transport(&mut delay, &mut sink) {
                error!("Master link restart failed: {}", e);
            }
        }
    }
}
