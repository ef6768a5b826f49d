//! Builds the one live transport for a resolved [`Role`].
//!
//! Order of checks per role:
//!
//! 1. configuration present (already guaranteed by [`Role`])
//! 2. network roles: a local IP exists, else `DependencyNotReady`
//! 3. construct through the driver, library refusal → `TransportConstructionFailure`
//! 4. slaves: bind if needed, then optional bulk load

use core::net::Ipv4Addr;

use embedded_hal::delay::DelayNs;
use log::info;

use super::reconnect::ReconnectPolicy;
use super::{ConnectionHandle, SlaveLink};
use crate::app::ports::{EventSink, ModbusDriver, SlaveIo};
use crate::config::{RegisterDefinitions, Role};
use crate::error::{Error, Result};

/// Port a serial slave is "bound" to; the UART ignores it.
const SERIAL_BIND_PORT: u16 = 0;

pub type Handle<Drv> = ConnectionHandle<<Drv as ModbusDriver>::Slave, <Drv as ModbusDriver>::Master>;

/// Stateless dispatcher; holds the reconnect policy for the master link.
#[derive(Debug, Default)]
pub struct TransportConnector {
    policy: ReconnectPolicy,
}

impl TransportConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    pub fn policy_mut(&mut self) -> &mut ReconnectPolicy {
        &mut self.policy
    }

    /// Construct the transport for `role`.
    ///
    /// `local_ip` is the attached station address, if any.
    pub fn connect<Drv, D, E>(
        &mut self,
        role: &Role,
        driver: &mut Drv,
        local_ip: Option<Ipv4Addr>,
        delay: &mut D,
        sink: &mut E,
    ) -> Result<Handle<Drv>>
    where
        Drv: ModbusDriver,
        D: DelayNs,
        E: EventSink,
    {
        if role.requires_network() && local_ip.is_none() {
            return Err(Error::DependencyNotReady("network role requires an attached WLAN"));
        }

        let handle = match role {
            Role::SlaveSerial(cfg) => {
                let io = driver.rtu_slave(cfg).map_err(Error::TransportConstructionFailure)?;
                info!(
                    "modbus: RTU slave unit {} at {} baud",
                    cfg.address, cfg.line.baudrate
                );
                ConnectionHandle::SlaveSerial(slave_link(
                    io,
                    Ipv4Addr::UNSPECIFIED,
                    SERIAL_BIND_PORT,
                    cfg.load_definitions_from_config,
                    &cfg.register_definitions,
                )?)
            }
            Role::MasterSerial(line) => {
                let io = driver.rtu_master(line).map_err(Error::TransportConstructionFailure)?;
                info!("modbus: RTU master at {} baud", line.baudrate);
                ConnectionHandle::MasterSerial(io)
            }
            Role::SlaveNetwork(cfg) => {
                let ip = local_ip.ok_or(Error::DependencyNotReady("slave-network requires an attached WLAN"))?;
                let io = driver.tcp_slave().map_err(Error::TransportConstructionFailure)?;
                let link = slave_link(
                    io,
                    ip,
                    cfg.port,
                    cfg.load_definitions_from_config,
                    &cfg.register_definitions,
                )?;
                info!("modbus: TCP slave on {ip}:{}", cfg.port);
                ConnectionHandle::SlaveNetwork(link)
            }
            Role::MasterNetwork(target) => {
                let io = self.policy.connect(driver, target, delay, sink)?;
                ConnectionHandle::MasterNetwork(io)
            }
        };
        Ok(handle)
    }
}

fn slave_link<S: SlaveIo>(
    mut io: S,
    ip: Ipv4Addr,
    port: u16,
    load: bool,
    definitions: &RegisterDefinitions,
) -> Result<SlaveLink<S>> {
    if !io.is_bound() {
        io.bind(ip, port).map_err(Error::TransportConstructionFailure)?;
    }
    let mut link = SlaveLink::new(io);
    if load {
        link.bank_mut().bulk_load(definitions.as_slice());
        info!("modbus: loaded {} register definition(s)", definitions.as_slice().len());
    }
    Ok(link)
}
