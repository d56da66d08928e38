//! In-memory peer for exercising the channel without a browser.
//!
//! [`mock_client`] returns a [`ProtocolClient`] wired to a [`MockPeer`]. The
//! peer sees every frame the client writes and can inject replies, errors,
//! events or raw text. [`MockPeer::spawn_responder`] answers requests from a
//! closure in the background and records everything it saw.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::client::{ClientOptions, ProtocolClient};
use crate::error::{CdpError, Result};
use crate::transport::{Incoming, Transport};
use crate::types::Frame;

/// Transport that hands outgoing frames to a [`MockPeer`].
#[derive(Debug)]
pub struct MockTransport {
    outgoing: mpsc::UnboundedSender<String>,
    closed: AtomicBool,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, raw: String) -> Result<()> {
        if self.is_closed() {
            return Err(CdpError::ChannelClosed);
        }
        self.outgoing.send(raw).map_err(|_| CdpError::ChannelClosed)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Cloneable sender for the peer side of a mock channel.
#[derive(Clone, Debug)]
pub struct PeerHandle {
    incoming: Arc<Mutex<Option<mpsc::UnboundedSender<String>>>>,
}

impl PeerHandle {
    /// Deliver raw text to the client.
    pub fn send_raw(&self, raw: impl Into<String>) {
        if let Some(tx) = &*self.incoming.lock() {
            let _ = tx.send(raw.into());
        }
    }

    /// Deliver a frame to the client.
    pub fn send_frame(&self, frame: &Frame) {
        if let Ok(raw) = serde_json::to_string(frame) {
            self.send_raw(raw);
        }
    }

    /// Successful reply to request `id`.
    pub fn reply(&self, id: u64, result: Value) {
        self.send_raw(json!({"id": id, "result": result}).to_string());
    }

    /// Error reply to request `id`.
    pub fn reply_error(&self, id: u64, code: i64, message: &str) {
        self.send_raw(json!({"id": id, "error": {"code": code, "message": message}}).to_string());
    }

    /// Emit an event.
    pub fn emit(&self, method: &str, params: Value, session_id: Option<&str>) {
        self.send_frame(&Frame::event(method, params, session_id));
    }

    /// Drop the incoming side, as if the browser exited.
    pub fn hang_up(&self) {
        let _ = self.incoming.lock().take();
    }
}

/// What a responder sends back for one request.
#[derive(Clone, Debug)]
pub enum Response {
    /// Reply with this `result`.
    Ok(Value),
    /// Reply with an `error`.
    Err {
        /// Error code.
        code: i64,
        /// Error message.
        message: String,
    },
    /// Leave the request pending.
    NoReply,
}

impl From<Value> for Response {
    fn from(value: Value) -> Self {
        Self::Ok(value)
    }
}

/// Peer side of a mock channel.
#[derive(Debug)]
pub struct MockPeer {
    handle: PeerHandle,
    outgoing: mpsc::UnboundedReceiver<String>,
}

impl MockPeer {
    /// Sender usable from other tasks.
    pub fn handle(&self) -> PeerHandle {
        self.handle.clone()
    }

    /// Next frame written by the client. Panics if the client is gone.
    pub async fn next_request(&mut self) -> Frame {
        let raw = self.outgoing.recv().await.expect("client dropped its transport");
        serde_json::from_str(&raw).expect("client wrote invalid JSON")
    }

    /// Next frame written by the client, if one arrives within `timeout`.
    pub async fn try_next_request(&mut self, timeout: Duration) -> Option<Frame> {
        let raw = tokio::time::timeout(timeout, self.outgoing.recv()).await.ok()??;
        serde_json::from_str(&raw).ok()
    }

    /// Drop the incoming side, as if the browser exited.
    pub fn hang_up(&self) {
        self.handle.hang_up();
    }

    /// Answer every request in the background with `respond`.
    pub fn spawn_responder<F>(self, mut respond: F) -> Responder
    where
        F: FnMut(&Frame, &PeerHandle) -> Response + Send + 'static,
    {
        let Self { handle, mut outgoing } = self;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let task = {
            let handle = handle.clone();
            let seen = seen.clone();
            tokio::spawn(async move {
                while let Some(raw) = outgoing.recv().await {
                    let Ok(frame) = serde_json::from_str::<Frame>(&raw) else {
                        continue;
                    };
                    let response = respond(&frame, &handle);
                    let id = frame.id;
                    seen.lock().push(frame);
                    match (id, response) {
                        (Some(id), Response::Ok(value)) => handle.reply(id, value),
                        (Some(id), Response::Err { code, message }) => {
                            handle.reply_error(id, code, &message);
                        }
                        _ => {}
                    }
                }
            })
        };
        Responder { handle, seen, task }
    }
}

/// Background peer that answers requests; see [`MockPeer::spawn_responder`].
#[derive(Debug)]
pub struct Responder {
    handle: PeerHandle,
    seen: Arc<Mutex<Vec<Frame>>>,
    task: JoinHandle<()>,
}

impl Responder {
    /// Sender for injecting events.
    pub fn handle(&self) -> PeerHandle {
        self.handle.clone()
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<Frame> {
        self.seen.lock().clone()
    }

    /// Methods of every request received so far, in order.
    pub fn methods(&self) -> Vec<String> {
        self.seen.lock().iter().map(|f| f.method().to_string()).collect()
    }

    /// Wait until a request for `method` has been seen.
    pub async fn wait_for(&self, method: &str, timeout: Duration) -> Option<Frame> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(frame) = self.seen.lock().iter().find(|f| f.method() == method) {
                return Some(frame.clone());
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Drop the incoming side, as if the browser exited.
    pub fn hang_up(&self) {
        self.handle.hang_up();
    }
}

impl Drop for Responder {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Raw pieces of a mock channel.
pub fn mock_channel() -> (Arc<MockTransport>, Incoming, MockPeer) {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let transport = Arc::new(MockTransport {
        outgoing: out_tx,
        closed: AtomicBool::new(false),
    });
    let peer = MockPeer {
        handle: PeerHandle {
            incoming: Arc::new(Mutex::new(Some(in_tx))),
        },
        outgoing: out_rx,
    };
    (transport, in_rx, peer)
}

/// A client connected to a fresh mock peer. Must run inside a tokio runtime.
pub fn mock_client() -> (ProtocolClient, MockPeer) {
    let (transport, incoming, peer) = mock_channel();
    let client = ProtocolClient::with_options(transport, incoming, ClientOptions { log_frames: true });
    (client, peer)
}
