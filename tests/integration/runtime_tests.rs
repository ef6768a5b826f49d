//! BoardRuntime boot sequence end to end over mock adapters.

use mela::adapters::nvs::NvsAdapter;
use mela::app::events::BoardEvent;
use mela::app::ports::{ConfigPort, TransportError};
use mela::app::runtime::BoardRuntime;
use mela::app::status::{BoardStatus, STATUS_LEN, TIMESTAMP_OFFSET};
use mela::attach::AttachError;
use mela::config::{self, BoardConfig, ConnectType};
use mela::error::Error;
use mela::modbus::ConnectionHandle;
use mela::modbus::reconnect::RECONNECT_DELAY_MS;
use tokio_modbus::{Request, Response};

use crate::mock_modbus::{MockDriver, MockMaster, RecordingDelay, RecordingSink};
use crate::mock_wlan::{MOCK_IP, MockWlan, ap};

fn cfg(json: &str) -> BoardConfig {
    BoardConfig::from_json(json.as_bytes()).unwrap()
}

const MASTER_UNREACHABLE: &str = r#"{"config":{
    "wifi":{"connect_on_boot":true,"networks":[{"ssid":"LAN","key":"12345"}]},
    "modbus":{"connect_type":"master-network",
      "master-network":{"slave_ip":"10.0.0.5","port":502,"timeout":5,"always_reconnect":false}}}}"#;

const SLAVE_NET: &str = r#"{"config":{
    "wifi":{"connect_on_boot":true,"networks":[{"ssid":"LAN","key":"12345"}]},
    "modbus":{"connect_type":"slave-network","slave-network":{"port":502}}}}"#;

#[test]
fn boot_attaches_to_candidate_then_master_connect_fails_once() {
    let wlan = MockWlan::new(&[("LAN", -40), ("Other", -30)]);
    let mut delay = RecordingDelay::default();
    let mut sink = RecordingSink::default();

    let r = BoardRuntime::start(cfg(MASTER_UNREACHABLE), wlan, MockDriver::unreachable(), &mut delay, &mut sink);

    assert!(matches!(r, Err(Error::ReconnectExhausted(TransportError::Timeout))));
    assert_eq!(
        sink.events,
        [BoardEvent::Attached {
            ssid: Some("LAN".into()),
            ip: MOCK_IP
        }]
    );
    assert_eq!(delay.total_ms(), 0);
}

#[test]
fn always_reconnect_blocks_until_the_slave_answers() {
    let json = MASTER_UNREACHABLE.replace(r#""always_reconnect":false"#, r#""always_reconnect":true"#);
    let mut delay = RecordingDelay::default();
    let mut sink = RecordingSink::default();

    let rt = BoardRuntime::start(
        cfg(&json),
        MockWlan::new(&[("LAN", -40)]),
        MockDriver::reachable_after(2),
        &mut delay,
        &mut sink,
    )
    .unwrap();

    assert_eq!(rt.handle().map(ConnectionHandle::connect_type), Some(ConnectType::MasterNetwork));
    assert_eq!(delay.ms, [RECONNECT_DELAY_MS, RECONNECT_DELAY_MS]);
    assert_eq!(
        sink.events.last(),
        Some(&BoardEvent::Started(Some(ConnectType::MasterNetwork)))
    );
}

#[test]
fn configuration_errors_surface_before_the_radio_is_used() {
    let json = r#"{"config":{"wifi":{"connect_on_boot":true},"modbus":{"connect_type":"slave-network"}}}"#;
    let mut delay = RecordingDelay::default();
    let mut sink = RecordingSink::default();

    let r = BoardRuntime::start(cfg(json), MockWlan::new(&[("LAN", -40)]), MockDriver::default(), &mut delay, &mut sink);

    assert!(matches!(r, Err(Error::ConfigurationMissing(_))));
    assert!(sink.events.is_empty());
}

#[test]
fn network_role_without_boot_attach_is_not_ready() {
    let json = SLAVE_NET.replace(r#""connect_on_boot":true"#, r#""connect_on_boot":false"#);
    let r = BoardRuntime::start(
        cfg(&json),
        MockWlan::new(&[("LAN", -40)]),
        MockDriver::default(),
        &mut RecordingDelay::default(),
        &mut RecordingSink::default(),
    );
    assert!(matches!(r, Err(Error::DependencyNotReady(_))));
}

#[test]
fn failed_attach_is_reported_then_network_role_is_not_ready() {
    let mut sink = RecordingSink::default();
    let r = BoardRuntime::start(
        cfg(SLAVE_NET),
        MockWlan::new(&[("Other", -30)]),
        MockDriver::default(),
        &mut RecordingDelay::default(),
        &mut sink,
    );
    assert!(matches!(r, Err(Error::DependencyNotReady(_))));
    assert_eq!(sink.events, [BoardEvent::AttachFailed(AttachError::NoMatchingNetwork)]);
}

#[test]
fn network_slave_boot_emits_events_in_order() {
    let mut sink = RecordingSink::default();
    let rt = BoardRuntime::start(
        cfg(SLAVE_NET),
        MockWlan::new(&[("LAN", -40)]),
        MockDriver::default(),
        &mut RecordingDelay::default(),
        &mut sink,
    )
    .unwrap();

    assert_eq!(rt.ip(), Some(MOCK_IP));
    assert_eq!(rt.role().map(config::Role::connect_type), Some(ConnectType::SlaveNetwork));
    assert_eq!(
        sink.events,
        [
            BoardEvent::Attached {
                ssid: Some("LAN".into()),
                ip: MOCK_IP
            },
            BoardEvent::TransportReady(ConnectType::SlaveNetwork),
            BoardEvent::Started(Some(ConnectType::SlaveNetwork)),
        ]
    );
    let link = rt.handle().and_then(ConnectionHandle::as_slave).unwrap();
    assert_eq!(link.io().bound, Some((MOCK_IP, 502)));
}

#[test]
fn no_role_boots_without_transport() {
    let json = r#"{"config":{"wifi":{"connect_on_boot":false},"modbus":{"connect_type":false}}}"#;
    let mut sink = RecordingSink::default();
    let rt = BoardRuntime::start(
        cfg(json),
        MockWlan::new(&[]),
        MockDriver::default(),
        &mut RecordingDelay::default(),
        &mut sink,
    )
    .unwrap();
    assert!(rt.handle().is_none());
    assert!(rt.role().is_none());
    assert_eq!(sink.events, [BoardEvent::Started(None)]);
}

#[test]
fn serial_role_survives_failed_attach_and_reattaches_later() {
    let json = r#"{"config":{
        "wifi":{"connect_on_boot":true,"networks":[{"ssid":"LAN","key":"12345"}]},
        "modbus":{"connect_type":"master-serial","master-serial":{"baudrate":9600}}}}"#;
    let mut delay = RecordingDelay::default();
    let mut sink = RecordingSink::default();

    let mut rt = BoardRuntime::start(cfg(json), MockWlan::new(&[]), MockDriver::default(), &mut delay, &mut sink)
        .unwrap();
    assert_eq!(rt.ip(), None);
    assert_eq!(rt.handle().map(ConnectionHandle::connect_type), Some(ConnectType::MasterSerial));

    rt.network_mut().wlan_mut().networks.push(ap("LAN", -50));
    assert_eq!(rt.reattach(&mut delay, &mut sink), Ok(MOCK_IP));
    assert_eq!(rt.link_status().ip, Some(MOCK_IP));
    // The serial transport was left alone.
    assert_eq!(rt.handle().map(ConnectionHandle::connect_type), Some(ConnectType::MasterSerial));

    rt.detach(&mut sink).unwrap();
    assert_eq!(rt.ip(), None);
    assert_eq!(sink.events.last(), Some(&BoardEvent::Detached));
}

#[test]
fn restart_transport_rebuilds_the_master_link() {
    let json = MASTER_UNREACHABLE;
    let mut delay = RecordingDelay::default();
    let mut sink = RecordingSink::default();
    let mut rt = BoardRuntime::start(cfg(json), MockWlan::new(&[("LAN", -40)]), MockDriver::default(), &mut delay, &mut sink)
        .unwrap();

    rt.restart_transport(&mut delay, &mut sink).unwrap();

    let ready = sink
        .events
        .iter()
        .filter(|e| **e == BoardEvent::TransportReady(ConnectType::MasterNetwork))
        .count();
    assert_eq!(ready, 2);
    assert!(rt.handle_mut().and_then(ConnectionHandle::as_master_mut).is_some());
}

#[test]
fn status_block_reaches_a_remote_master() {
    let mut rt = BoardRuntime::start(
        cfg(SLAVE_NET),
        MockWlan::new(&[("LAN", -40)]),
        MockDriver::default(),
        &mut RecordingDelay::default(),
        &mut RecordingSink::default(),
    )
    .unwrap();
    let link = rt.handle_mut().and_then(ConnectionHandle::as_slave_mut).unwrap();

    let status = BoardStatus::from_usage(1_700_000_000, (48, 64), (1, 3));
    status.publish(link.bank_mut());

    link.io_mut()
        .inbox
        .push_back(Request::ReadInputRegisters(TIMESTAMP_OFFSET, STATUS_LEN));
    assert_eq!(link.process(), Ok(true));
    let ts = 1_700_000_000u32;
    assert_eq!(
        link.io().outbox,
        [Ok(Response::ReadInputRegisters(vec![
            (ts >> 16) as u16,
            ts as u16,
            7500,
            3333
        ]))]
    );

    let mut master = MockMaster {
        remote: link.bank().clone(),
        ..MockMaster::default()
    };
    assert_eq!(BoardStatus::fetch(&mut master, 1), Ok(status));
}

#[test]
fn fetch_from_a_silent_unit_fails() {
    let mut master = MockMaster {
        fail_with: Some(TransportError::Timeout),
        ..MockMaster::default()
    };
    assert_eq!(BoardStatus::fetch(&mut master, 1), Err(TransportError::Timeout));
}

#[test]
fn stored_configuration_drives_the_boot() {
    let mut store = NvsAdapter::new().unwrap();
    assert_eq!(config::load_or_factory(&store), BoardConfig::factory());

    store.save(&cfg(SLAVE_NET)).unwrap();
    let loaded = config::load_or_factory(&store);

    let rt = BoardRuntime::start(
        loaded,
        MockWlan::new(&[("LAN", -40)]),
        MockDriver::default(),
        &mut RecordingDelay::default(),
        &mut RecordingSink::default(),
    )
    .unwrap();
    assert_eq!(rt.config().modbus.connect_type, Some(ConnectType::SlaveNetwork));
}
