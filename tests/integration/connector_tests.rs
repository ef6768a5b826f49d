//! TransportConnector and ReconnectPolicy against the mock driver.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use mela::app::events::BoardEvent;
use mela::app::ports::TransportError;
use mela::config::{BoardConfig, MasterTarget, Role};
use mela::error::Error;
use mela::modbus::connector::TransportConnector;
use mela::modbus::reconnect::{LinkState, RECONNECT_DELAY_MS, ReconnectPolicy};
use mela::modbus::{ConnectionHandle, RegisterClass};
use tokio_modbus::{ExceptionCode, Request, Response};

use crate::mock_modbus::{DriverCall, MockDriver, RecordingDelay, RecordingSink};

const LOCAL: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 50);

fn role(json: &str) -> Role {
    BoardConfig::from_json(json.as_bytes())
        .unwrap()
        .modbus
        .resolve()
        .unwrap()
        .unwrap()
}

fn target(always_reconnect: bool) -> MasterTarget {
    MasterTarget {
        addr: SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 5), 502),
        timeout: Duration::from_secs(5),
        always_reconnect,
    }
}

const SLAVE_NETWORK: &str = r#"{"config":{"modbus":{"connect_type":"slave-network",
    "slave-network":{"port":1502,"load_definitions_from_config":true,
      "register_definitions":{
        "holding-registers":{"SETPOINT":{"register":10,"len":2,"val":[7,8]},
                             "OVERRIDE":{"register":11,"len":1,"val":99}},
        "discrete-inputs":{"DOOR":{"register":0,"len":1,"val":1}}}}}}}"#;

// ── Network slave ─────────────────────────────────────────────

#[test]
fn network_slave_without_ip_never_binds() {
    let mut driver = MockDriver::default();
    let r = TransportConnector::new().connect(
        &role(SLAVE_NETWORK),
        &mut driver,
        None,
        &mut RecordingDelay::default(),
        &mut RecordingSink::default(),
    );
    assert!(matches!(r, Err(Error::DependencyNotReady(_))));
    assert!(driver.calls.is_empty());
}

#[test]
fn network_slave_binds_to_station_address_and_loads_bank() {
    let mut driver = MockDriver::default();
    let handle = TransportConnector::new()
        .connect(
            &role(SLAVE_NETWORK),
            &mut driver,
            Some(LOCAL),
            &mut RecordingDelay::default(),
            &mut RecordingSink::default(),
        )
        .unwrap();

    let ConnectionHandle::SlaveNetwork(link) = handle else {
        panic!("expected slave-network handle");
    };
    assert_eq!(link.io().bound, Some((LOCAL, 1502)));
    // OVERRIDE overlaps SETPOINT's second cell and comes later.
    assert_eq!(link.bank().holding(10), Some(7));
    assert_eq!(link.bank().holding(11), Some(99));
    assert_eq!(link.bank().discrete_input(0), Some(true));
}

#[test]
fn definitions_are_ignored_unless_enabled() {
    let json = SLAVE_NETWORK.replace(r#""load_definitions_from_config":true"#, r#""load_definitions_from_config":false"#);
    let handle = TransportConnector::new()
        .connect(
            &role(&json),
            &mut MockDriver::default(),
            Some(LOCAL),
            &mut RecordingDelay::default(),
            &mut RecordingSink::default(),
        )
        .unwrap();
    assert!(handle.as_slave().unwrap().bank().is_empty());
}

#[test]
fn bind_refusal_is_construction_failure() {
    let mut driver = MockDriver {
        slave_bind_error: Some(TransportError::Io),
        ..MockDriver::default()
    };
    let r = TransportConnector::new().connect(
        &role(SLAVE_NETWORK),
        &mut driver,
        Some(LOCAL),
        &mut RecordingDelay::default(),
        &mut RecordingSink::default(),
    );
    assert!(matches!(r, Err(Error::TransportConstructionFailure(TransportError::Io))));
}

#[test]
fn slave_link_serves_requests_from_its_bank() {
    let mut handle = TransportConnector::new()
        .connect(
            &role(SLAVE_NETWORK),
            &mut MockDriver::default(),
            Some(LOCAL),
            &mut RecordingDelay::default(),
            &mut RecordingSink::default(),
        )
        .unwrap();
    let link = handle.as_slave_mut().unwrap();

    link.io_mut().inbox.push_back(Request::ReadHoldingRegisters(10, 2));
    link.io_mut().inbox.push_back(Request::WriteSingleRegister(10, 42));
    link.io_mut().inbox.push_back(Request::WriteSingleCoil(0, true));
    link.io_mut().inbox.push_back(Request::ReadHoldingRegisters(500, 1));

    while link.process().unwrap() {}

    assert_eq!(
        link.io().outbox,
        vec![
            Ok(Response::ReadHoldingRegisters(vec![7, 99])),
            Ok(Response::WriteSingleRegister(10, 42)),
            // Coil 0 was never defined.
            Err(ExceptionCode::IllegalDataAddress),
            Err(ExceptionCode::IllegalDataAddress),
        ]
    );
    assert_eq!(link.bank().get(RegisterClass::Holding, 10), Some(42));
}

// ── Serial roles ──────────────────────────────────────────────

#[test]
fn serial_slave_needs_no_network() {
    let json = r#"{"config":{"modbus":{"connect_type":"slave-serial",
        "slave-serial":{"address":7,"baudrate":19200,"parity":0,
          "load_definitions_from_config":true,
          "register_definitions":{"input-registers":{"T":{"register":3,"len":3,"val":[1]}}}}}}}"#;
    let mut driver = MockDriver::default();
    let handle = TransportConnector::new()
        .connect(
            &role(json),
            &mut driver,
            None,
            &mut RecordingDelay::default(),
            &mut RecordingSink::default(),
        )
        .unwrap();

    assert_eq!(driver.calls, [DriverCall::RtuSlave { address: 7 }]);
    let link = handle.as_slave().unwrap();
    assert_eq!(link.io().bound, Some((Ipv4Addr::UNSPECIFIED, 0)));
    // Short sequence zero-pads.
    assert_eq!(link.bank().read_range(RegisterClass::Input, 3, 3), Ok(vec![1, 0, 0]));
}

#[test]
fn rejected_serial_parameters_fail_construction() {
    let json = r#"{"config":{"modbus":{"connect_type":"master-serial",
        "master-serial":{"baudrate":115200,"data_bits":9}}}}"#;
    let r = TransportConnector::new().connect(
        &role(json),
        &mut MockDriver::default(),
        None,
        &mut RecordingDelay::default(),
        &mut RecordingSink::default(),
    );
    assert!(matches!(
        r,
        Err(Error::TransportConstructionFailure(TransportError::Rejected(_)))
    ));
}

#[test]
fn unsupported_serial_driver_surfaces_as_construction_failure() {
    let json = r#"{"config":{"modbus":{"connect_type":"master-serial",
        "master-serial":{"baudrate":9600}}}}"#;
    let mut driver = MockDriver {
        serial_supported: false,
        ..MockDriver::default()
    };
    let r = TransportConnector::new().connect(
        &role(json),
        &mut driver,
        None,
        &mut RecordingDelay::default(),
        &mut RecordingSink::default(),
    );
    assert!(matches!(
        r,
        Err(Error::TransportConstructionFailure(TransportError::Unsupported))
    ));
}

// ── Reconnect policy ──────────────────────────────────────────

#[test]
fn unreachable_target_fails_once_without_sleeping() {
    let mut policy = ReconnectPolicy::new();
    let mut driver = MockDriver::unreachable();
    let mut delay = RecordingDelay::default();
    let mut sink = RecordingSink::default();

    let r = policy.connect(&mut driver, &target(false), &mut delay, &mut sink);

    assert!(matches!(r, Err(Error::ReconnectExhausted(TransportError::Timeout))));
    assert_eq!(driver.master_attempts(), 1);
    assert_eq!(delay.total_ms(), 0);
    assert!(sink.events.is_empty());
    assert_eq!(policy.state(), LinkState::Disconnected);
}

#[test]
fn always_reconnect_sleeps_exactly_between_failures() {
    let mut policy = ReconnectPolicy::new();
    let mut driver = MockDriver::reachable_after(2);
    let mut delay = RecordingDelay::default();
    let mut sink = RecordingSink::default();

    let r = policy.connect(&mut driver, &target(true), &mut delay, &mut sink);

    assert!(r.is_ok());
    assert_eq!(policy.state(), LinkState::Connected);
    assert_eq!(policy.attempts(), 3);
    assert_eq!(delay.ms, [RECONNECT_DELAY_MS, RECONNECT_DELAY_MS]);
    assert_eq!(
        sink.events,
        [
            BoardEvent::ReconnectScheduled { target: target(true).addr, attempt: 1 },
            BoardEvent::ReconnectScheduled { target: target(true).addr, attempt: 2 },
        ]
    );
}

#[test]
fn every_attempt_uses_configured_endpoint_and_timeout() {
    let mut driver = MockDriver::reachable_after(1);
    ReconnectPolicy::new()
        .connect(
            &mut driver,
            &target(true),
            &mut RecordingDelay::default(),
            &mut RecordingSink::default(),
        )
        .unwrap();
    let expected = DriverCall::TcpMaster {
        addr: target(true).addr,
        timeout: Duration::from_secs(5),
    };
    assert_eq!(driver.calls, [expected.clone(), expected]);
}

#[test]
fn mark_disconnected_resets_state() {
    let mut policy = ReconnectPolicy::new();
    policy
        .connect(
            &mut MockDriver::default(),
            &target(false),
            &mut RecordingDelay::default(),
            &mut RecordingSink::default(),
        )
        .unwrap();
    assert_eq!(policy.state(), LinkState::Connected);
    policy.mark_disconnected();
    assert_eq!(policy.state(), LinkState::Disconnected);
}
