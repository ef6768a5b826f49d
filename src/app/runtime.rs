//! BoardRuntime: composition root.
//!
//! Owns the configuration, the network attachment and the single live
//! [`ConnectionHandle`].  It performs the boot sequence and exposes the
//! handle; the polling loop lives in the binary.
//!
//! ```text
//!   start ─▶ resolve role ─▶ [connect_on_boot] attach ─▶ build transport
//!                 │ConfigurationMissing      │failure: logged, non-fatal
//!                 ▼                          ▼
//!               Err                  network role w/o IP ─▶ DependencyNotReady
//! ```

use core::net::Ipv4Addr;

use embedded_hal::delay::DelayNs;
use log::{error, info, warn};

use super::events::BoardEvent;
use super::ports::{EventSink, ModbusDriver, WlanPort};
use crate::attach::{AttachError, LinkStatus, NetworkAttachment};
use crate::config::{BoardConfig, Role};
use crate::error::Result;
use crate::modbus::connector::{Handle, TransportConnector};

pub struct BoardRuntime<W: WlanPort, Drv: ModbusDriver> {
    config: BoardConfig,
    role: Option<Role>,
    network: NetworkAttachment<W>,
    driver: Drv,
    connector: TransportConnector,
    handle: Option<Handle<Drv>>,
}

impl<W: WlanPort, Drv: ModbusDriver> BoardRuntime<W, Drv> {
    /// Boot the board.
    ///
    /// Configuration errors surface before the radio or any transport is
    /// touched.  A failed attach is reported through `sink` and does not
    /// abort start-up, but a network role then fails with
    /// `DependencyNotReady`.
    pub fn start<D: DelayNs, E: EventSink>(
        config: BoardConfig,
        wlan: W,
        driver: Drv,
        delay: &mut D,
        sink: &mut E,
    ) -> Result<Self> {
        let role = config.modbus.resolve()?;
        match &role {
            Some(r) => info!("runtime: role {}", r.connect_type()),
            None => info!("runtime: no Modbus role configured"),
        }

        let mut rt = Self {
            config,
            role,
            network: NetworkAttachment::new(wlan),
            driver,
            connector: TransportConnector::new(),
            handle: None,
        };

        if rt.config.wifi.connect_on_boot {
            // Non-fatal: failure already reported by try_attach.
            let _ = rt.try_attach(delay, sink);
        }

        rt.build_transport(delay, sink)?;
        sink.emit(&BoardEvent::Started(rt.role.as_ref().map(Role::connect_type)));
        Ok(rt)
    }

    /// Attach with the configured candidates and, if the role needs the
    /// network and has no transport yet, build it.
    pub fn reattach<D: DelayNs, E: EventSink>(&mut self, delay: &mut D, sink: &mut E) -> Result<Ipv4Addr> {
        let ip = self.try_attach(delay, sink)?;
        if self.handle.is_none() {
            self.build_transport(delay, sink)?;
        }
        Ok(ip)
    }

    /// Drop the live transport and build a fresh one from configuration.
    pub fn restart_transport<D: DelayNs, E: EventSink>(&mut self, delay: &mut D, sink: &mut E) -> Result<()> {
        if let Some(old) = self.handle.take() {
            warn!("runtime: restarting {}", old.connect_type());
        }
        self.connector.policy_mut().mark_disconnected();
        self.build_transport(delay, sink)
    }

    /// Disconnect the WLAN.  The transport, if any, is left in place.
    pub fn detach<E: EventSink>(&mut self, sink: &mut E) -> Result<()> {
        self.network.detach()?;
        sink.emit(&BoardEvent::Detached);
        Ok(())
    }

    pub fn handle(&self) -> Option<&Handle<Drv>> {
        self.handle.as_ref()
    }

    pub fn handle_mut(&mut self) -> Option<&mut Handle<Drv>> {
        self.handle.as_mut()
    }

    pub fn ip(&self) -> Option<Ipv4Addr> {
        self.network.ip()
    }

    pub fn link_status(&self) -> LinkStatus {
        self.network.status()
    }

    pub fn role(&self) -> Option<&Role> {
        self.role.as_ref()
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    pub fn network(&self) -> &NetworkAttachment<W> {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut NetworkAttachment<W> {
        &mut self.network
    }

    // ── Internals ─────────────────────────────────────────────

    fn try_attach<D: DelayNs, E: EventSink>(&mut self, delay: &mut D, sink: &mut E) -> core::result::Result<Ipv4Addr, AttachError> {
        match self.network.attach(&self.config.wifi.networks, delay) {
            Ok(ip) => {
                sink.emit(&BoardEvent::Attached {
                    ssid: self.network.ssid().map(str::to_owned),
                    ip,
                });
                Ok(ip)
            }
            Err(e) => {
                error!("runtime: attach failed: {e}");
                sink.emit(&BoardEvent::AttachFailed(e));
                Err(e)
            }
        }
    }

    fn build_transport<D: DelayNs, E: EventSink>(&mut self, delay: &mut D, sink: &mut E) -> Result<()> {
        let Some(role) = &self.role else {
            return Ok(());
        };
        let handle = self
            .connector
            .connect(role, &mut self.driver, self.network.ip(), delay, sink)?;
        sink.emit(&BoardEvent::TransportReady(handle.connect_type()));
        self.handle = Some(handle);
        Ok(())
    }
}
