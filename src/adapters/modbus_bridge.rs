//! Hands requests from a server thread to the task that owns the bank.
//!
//! ```text
//!   server runtime                         owning task
//!   ──────────────                         ───────────
//!   Service::call(req) ──Inbound──▶ RequestBridge::poll() ─▶ serve(bank)
//!        ▲ awaits oneshot                        │
//!        └──────────── Reply ◀──── RequestBridge::respond()
//! ```
//!
//! Each request carries its own `oneshot` reply slot, so one connection
//! waiting on the loop never holds up the others.  A master waits at most
//! [`REPLY_TIMEOUT`]; a loop that does not poll in time makes it see
//! `ServerDeviceBusy`.

use std::collections::VecDeque;
use std::time::Duration;

use log::warn;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use tokio_modbus::{ExceptionCode, Request, Response};

use crate::app::ports::TransportError;

/// Longest a remote master waits for the owning loop.
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(2);

/// Requests queued between the server and the loop.
const QUEUE_DEPTH: usize = 8;

pub type Reply = Result<Response, ExceptionCode>;

struct Inbound {
    request: Request<'static>,
    reply: oneshot::Sender<Reply>,
}

/// Server-side end.  Cheap to clone, one per connection.
#[derive(Clone)]
pub struct BridgeHandle {
    tx: mpsc::Sender<Inbound>,
}

impl BridgeHandle {
    /// Forward `request` and await the owning task's answer.
    pub async fn forward(&self, request: Request<'static>) -> Reply {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Inbound { request, reply }).await.is_err() {
            return Err(ExceptionCode::ServerDeviceFailure);
        }
        match tokio::time::timeout(REPLY_TIMEOUT, rx).await {
            Ok(Ok(r)) => r,
            // Reply slot dropped: the link went away mid-request.
            Ok(Err(_)) => Err(ExceptionCode::ServerDeviceFailure),
            Err(_) => {
                warn!("modbus: request not served within {:?}", REPLY_TIMEOUT);
                Err(ExceptionCode::ServerDeviceBusy)
            }
        }
    }
}

/// Owning-task end.  Replies go to the oldest unanswered request.
pub struct RequestBridge {
    rx: mpsc::Receiver<Inbound>,
    pending: VecDeque<oneshot::Sender<Reply>>,
}

impl RequestBridge {
    pub fn channel() -> (BridgeHandle, Self) {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        (
            BridgeHandle { tx },
            Self {
                rx,
                pending: VecDeque::new(),
            },
        )
    }

    /// Next queued request, if any.  Never blocks.
    pub fn poll(&mut self) -> Result<Option<Request<'static>>, TransportError> {
        match self.rx.try_recv() {
            Ok(Inbound { request, reply }) => {
                self.pending.push_back(reply);
                Ok(Some(request))
            }
            Err(TryRecvError::Empty) => Ok(None),
            // Every handle is gone: the server thread has exited.
            Err(TryRecvError::Disconnected) => Err(TransportError::Io),
        }
    }

    pub fn respond(&mut self, reply: Reply) -> Result<(), TransportError> {
        let Some(tx) = self.pending.pop_front() else {
            return Err(TransportError::Rejected("no request awaiting a response"));
        };
        if tx.send(reply).is_err() {
            warn!("modbus: response arrived after the requester timed out");
        }
        Ok(())
    }

    /// Requests handed out and not yet answered.
    pub fn outstanding(&self) -> usize {
        self.pending.len()
    }
}
