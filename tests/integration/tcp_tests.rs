//! Board adapters over real loopback sockets: simulated station, the
//! tokio-modbus TCP server behind the request bridge, and the sync client.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use mela::adapters::log_sink::LogEventSink;
use mela::adapters::modbus_driver::{BoardModbusDriver, BoardSlave};
use mela::adapters::modbus_tcp::{TcpMaster, TcpSlave};
use mela::adapters::time::StdDelay;
use mela::adapters::wifi::{SimAccessPoint, SimWlan};
use mela::app::ports::{MasterIo, SlaveIo};
use mela::app::runtime::BoardRuntime;
use mela::app::status::BoardStatus;
use mela::config::{BoardConfig, ConnectType};
use mela::modbus::service::serve;
use mela::modbus::{ConnectionHandle, RegisterBank};
use tokio_modbus::Request;

type Board = BoardRuntime<SimWlan, BoardModbusDriver>;

const CLIENT_TIMEOUT: Duration = Duration::from_secs(3);

const SLAVE: &str = r#"{"config":{
    "wifi":{"connect_on_boot":true,"networks":[{"ssid":"LAN","key":"12345"}]},
    "modbus":{"connect_type":"slave-network","slave-network":{"port":0}}}}"#;

fn station() -> SimWlan {
    SimWlan::new(vec![SimAccessPoint::new("LAN", "12345", -40)])
}

fn boot(json: &str) -> Board {
    let cfg = BoardConfig::from_json(json.as_bytes()).unwrap();
    BoardRuntime::start(cfg, station(), BoardModbusDriver::new(), &mut StdDelay, &mut LogEventSink::new()).unwrap()
}

fn slave_addr(board: &Board) -> SocketAddrV4 {
    let link = board.handle().and_then(ConnectionHandle::as_slave).unwrap();
    let BoardSlave::Tcp(tcp) = link.io();
    tcp.local_addr().unwrap()
}

/// Run the slave loop until `client` finishes.
fn serve_until<T>(board: &mut Board, client: JoinHandle<T>) -> T {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !client.is_finished() {
        assert!(Instant::now() < deadline, "client did not finish");
        let link = board.handle_mut().and_then(ConnectionHandle::as_slave_mut).unwrap();
        if !link.process().unwrap() {
            thread::sleep(Duration::from_millis(1));
        }
    }
    client.join().unwrap()
}

#[test]
fn slave_board_answers_a_tcp_master() {
    let mut board = boot(SLAVE);
    assert_eq!(board.ip(), Some(SimWlan::SIM_IP));
    let addr = slave_addr(&board);
    assert_eq!(*addr.ip(), SimWlan::SIM_IP);
    assert_ne!(addr.port(), 0);

    let status = BoardStatus::from_usage(1_700_000_123, (3, 4), (1, 2));
    let link = board.handle_mut().and_then(ConnectionHandle::as_slave_mut).unwrap();
    status.publish(link.bank_mut());

    let client = thread::spawn(move || {
        let mut master = TcpMaster::connect(addr, CLIENT_TIMEOUT).unwrap();
        BoardStatus::fetch(&mut master, 1)
    });
    assert_eq!(serve_until(&mut board, client), Ok(status));
}

#[test]
fn master_board_fetches_status_from_slave_board() {
    let mut slave = boot(SLAVE);
    let addr = slave_addr(&slave);
    let status = BoardStatus::from_usage(42, (1, 1), (0, 1));
    let link = slave.handle_mut().and_then(ConnectionHandle::as_slave_mut).unwrap();
    status.publish(link.bank_mut());

    let master_json = format!(
        r#"{{"config":{{
            "wifi":{{"connect_on_boot":true,"networks":[{{"ssid":"LAN","key":"12345"}}]}},
            "modbus":{{"connect_type":"master-network",
              "master-network":{{"slave_ip":"{}","port":{},"timeout":3,"always_reconnect":false}}}}}}}}"#,
        addr.ip(),
        addr.port()
    );
    let client = thread::spawn(move || {
        let mut master = boot(&master_json);
        assert_eq!(
            master.handle().map(ConnectionHandle::connect_type),
            Some(ConnectType::MasterNetwork)
        );
        let remote = master.handle_mut().and_then(ConnectionHandle::as_master_mut).unwrap();
        BoardStatus::fetch(remote, 1)
    });
    assert_eq!(serve_until(&mut slave, client), Ok(status));
}

#[test]
fn two_masters_are_served_concurrently() {
    let mut slave = TcpSlave::new();
    slave.bind(Ipv4Addr::LOCALHOST, 0).unwrap();
    let addr = slave.local_addr().unwrap();

    let mut bank = RegisterBank::new();
    bank.set_input(10, 100);
    bank.set_input(20, 200);

    let clients: Vec<_> = [10u16, 20]
        .into_iter()
        .map(|reg| {
            thread::spawn(move || {
                let mut master = TcpMaster::connect(addr, CLIENT_TIMEOUT).unwrap();
                (reg, master.read_input_registers(1, reg, 1))
            })
        })
        .collect();

    // Both requests must reach the loop while neither is answered yet.
    let deadline = Instant::now() + Duration::from_secs(1);
    let mut requests: Vec<Request<'static>> = Vec::new();
    while requests.len() < 2 {
        assert!(Instant::now() < deadline, "second request stuck behind the first");
        match slave.poll_request().unwrap() {
            Some(req) => requests.push(req),
            None => thread::sleep(Duration::from_millis(1)),
        }
    }
    for req in requests {
        slave.respond(serve(&mut bank, req)).unwrap();
    }

    for client in clients {
        let (reg, reply) = client.join().unwrap();
        assert_eq!(reply, Ok(vec![reg * 10]));
    }
}
