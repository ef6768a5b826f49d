//! Modbus TCP over `tokio-modbus`.
//!
//! - [`TcpSlave`]: binds a listener and runs the `tokio-modbus` server on a
//!   background thread with a current-thread runtime.  Requests cross into
//!   the owning task through [`RequestBridge`]; the bank is never touched
//!   from the server thread.  Each connection awaits its own reply, so
//!   several masters can be connected at once.
//! - [`TcpMaster`]: the synchronous `tokio-modbus` client, one connection
//!   per instance.

use core::future::Future;
use core::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use core::time::Duration;
use std::io;
use std::pin::Pin;

use log::{debug, error, info, warn};
use tokio_modbus::client::sync::{self, Reader as _, Writer as _};
use tokio_modbus::server::tcp::{accept_tcp_connection, Server};
use tokio_modbus::slave::{Slave, SlaveContext as _, SlaveId};
use tokio_modbus::{ExceptionCode, Request, Response};

use super::modbus_bridge::{BridgeHandle, RequestBridge};
use crate::app::ports::{MasterIo, SlaveIo, TransportError};

const SERVER_THREAD_STACK: usize = 16 * 1024;

// ───────────────────────────────────────────────────────────────
// Slave (server)
// ───────────────────────────────────────────────────────────────

/// `tokio-modbus` service that forwards every request to the bridge.
struct BridgeService {
    bridge: BridgeHandle,
}

impl tokio_modbus::server::Service for BridgeService {
    type Request = Request<'static>;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Exception>> + Send>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        debug!("modbus/tcp: request {:?}", req);
        let bridge = self.bridge.clone();
        Box::pin(async move { bridge.forward(req).await })
    }
}

pub struct TcpSlave {
    bridge: Option<RequestBridge>,
    local: Option<SocketAddrV4>,
}

impl TcpSlave {
    pub fn new() -> Self {
        Self {
            bridge: None,
            local: None,
        }
    }

    /// Address actually bound (port 0 resolves to an ephemeral port).
    pub fn local_addr(&self) -> Option<SocketAddrV4> {
        self.local
    }
}

impl Default for TcpSlave {
    fn default() -> Self {
        Self::new()
    }
}

impl SlaveIo for TcpSlave {
    fn is_bound(&self) -> bool {
        self.bridge.is_some()
    }

    fn bind(&mut self, local_ip: Ipv4Addr, port: u16) -> Result<(), TransportError> {
        let listener = std::net::TcpListener::bind((local_ip, port)).map_err(|e| {
            error!("modbus/tcp: bind {local_ip}:{port} failed: {e}");
            TransportError::Io
        })?;
        listener.set_nonblocking(true).map_err(|_| TransportError::Io)?;
        let local = match listener.local_addr() {
            Ok(SocketAddr::V4(a)) => a,
            _ => SocketAddrV4::new(local_ip, port),
        };

        // The server thread is detached.  Once it exits, its bridge handles
        // drop and `poll_request` reports `Io`.
        let (handle, bridge) = RequestBridge::channel();
        std::thread::Builder::new()
            .name("modbus-tcp".into())
            .stack_size(SERVER_THREAD_STACK)
            .spawn(move || {
                if let Err(e) = run_server(listener, handle) {
                    error!("modbus/tcp: server stopped: {e}");
                }
            })
            .map_err(|_| TransportError::Rejected("cannot spawn server thread"))?;

        info!("modbus/tcp: listening on {local}");
        self.bridge = Some(bridge);
        self.local = Some(local);
        Ok(())
    }

    fn poll_request(&mut self) -> Result<Option<Request<'static>>, TransportError> {
        self.bridge.as_mut().ok_or(TransportError::NotBound)?.poll()
    }

    fn respond(&mut self, response: Result<Response, ExceptionCode>) -> Result<(), TransportError> {
        self.bridge.as_mut().ok_or(TransportError::NotBound)?.respond(response)
    }
}

/// Server thread body: accept connections forever.
fn run_server(listener: std::net::TcpListener, bridge: BridgeHandle) -> io::Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .enable_time()
        .build()?;
    rt.block_on(async move {
        let listener = tokio::net::TcpListener::from_std(listener)?;
        let server = Server::new(listener);

        let on_connected = move |stream, socket_addr: SocketAddr| {
            let bridge = bridge.clone();
            async move {
                info!("modbus/tcp: master connected from {socket_addr}");
                accept_tcp_connection(stream, socket_addr, move |_socket_addr| {
                    Ok(Some(BridgeService { bridge: bridge.clone() }))
                })
            }
        };
        let on_process_error = |err: io::Error| {
            warn!("modbus/tcp: connection error: {err}");
        };

        server.serve(&on_connected, on_process_error).await
    })
}

// ───────────────────────────────────────────────────────────────
// Master (client)
// ───────────────────────────────────────────────────────────────

pub struct TcpMaster {
    ctx: sync::Context,
}

impl TcpMaster {
    /// One connect attempt; `timeout` bounds the connect and each request.
    pub fn connect(addr: SocketAddrV4, timeout: Duration) -> Result<Self, TransportError> {
        let ctx = sync::tcp::connect_slave_with_timeout(SocketAddr::V4(addr), Slave::tcp_device(), Some(timeout))
            .map_err(|e| io_error(&e))?;
        Ok(Self { ctx })
    }

    fn unit(&mut self, unit: SlaveId) -> &mut sync::Context {
        self.ctx.set_slave(Slave(unit));
        &mut self.ctx
    }
}

impl MasterIo for TcpMaster {
    fn read_holding_registers(&mut self, unit: SlaveId, addr: u16, cnt: u16) -> Result<Vec<u16>, TransportError> {
        flatten(self.unit(unit).read_holding_registers(addr, cnt))
    }

    fn read_input_registers(&mut self, unit: SlaveId, addr: u16, cnt: u16) -> Result<Vec<u16>, TransportError> {
        flatten(self.unit(unit).read_input_registers(addr, cnt))
    }

    fn read_coils(&mut self, unit: SlaveId, addr: u16, cnt: u16) -> Result<Vec<bool>, TransportError> {
        flatten(self.unit(unit).read_coils(addr, cnt))
    }

    fn read_discrete_inputs(&mut self, unit: SlaveId, addr: u16, cnt: u16) -> Result<Vec<bool>, TransportError> {
        flatten(self.unit(unit).read_discrete_inputs(addr, cnt))
    }

    fn write_single_register(&mut self, unit: SlaveId, addr: u16, value: u16) -> Result<(), TransportError> {
        flatten(self.unit(unit).write_single_register(addr, value))
    }

    fn write_multiple_registers(&mut self, unit: SlaveId, addr: u16, values: &[u16]) -> Result<(), TransportError> {
        flatten(self.unit(unit).write_multiple_registers(addr, values))
    }

    fn write_single_coil(&mut self, unit: SlaveId, addr: u16, on: bool) -> Result<(), TransportError> {
        flatten(self.unit(unit).write_single_coil(addr, on))
    }
}

/// Collapse the library's transport-then-exception nesting.
pub(super) fn flatten<T>(res: tokio_modbus::Result<T>) -> Result<T, TransportError> {
    match res {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(code)) => Err(TransportError::Exception(code)),
        Err(tokio_modbus::Error::Transport(e)) => Err(io_error(&e)),
        Err(tokio_modbus::Error::Protocol(e)) => {
            warn!("modbus: protocol error: {e}");
            Err(TransportError::Io)
        }
    }
}

pub(super) fn io_error(e: &io::Error) -> TransportError {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TransportError::Timeout,
        _ => TransportError::Io,
    }
}
