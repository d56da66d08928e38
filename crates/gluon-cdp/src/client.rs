//! Request/reply correlation and event fan-out over a [`Transport`].
//!
//! The client is the only writer to its transport. Each request gets a fresh
//! integer id; a pending table maps ids to the caller awaiting the reply.
//! Frames without a matching pending id are offered to every subscriber whose
//! method filter matches, in registration order.
//!
//! When the transport ends (either side), every pending call completes with
//! [`CdpError::ChannelClosed`], subscriber lists are dropped and the
//! [`closed_token`](ProtocolClient::closed_token) fires.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{CdpError, Result};
use crate::transport::{Incoming, Transport};
use crate::types::Frame;

/// Callback invoked for each matching event frame.
pub type EventHandler = Arc<dyn Fn(&Frame) + Send + Sync>;

/// Client construction options.
#[derive(Clone, Copy, Debug, Default)]
pub struct ClientOptions {
    /// Log every frame in and out at debug level.
    pub log_frames: bool,
}

struct PendingCall {
    method: String,
    tx: oneshot::Sender<Result<Value>>,
}

#[derive(Default)]
struct PendingTable {
    closed: bool,
    calls: HashMap<u64, PendingCall>,
}

struct Subscription {
    id: u64,
    methods: Vec<String>,
    handler: EventHandler,
    once: bool,
    active: AtomicBool,
}

impl Subscription {
    fn matches(&self, method: &str) -> bool {
        self.methods.iter().any(|m| m == method)
    }
}

struct ClientInner {
    transport: Arc<dyn Transport>,
    next_id: AtomicU64,
    next_subscription: AtomicU64,
    table: Mutex<PendingTable>,
    subscribers: Mutex<Vec<Arc<Subscription>>>,
    closed: CancellationToken,
    log_frames: bool,
}

impl ClientInner {
    fn dispatch(&self, raw: &str) {
        if self.log_frames {
            debug!(direction = "in", frame = %raw, "protocol frame");
        }
        let frame: Frame = match serde_json::from_str(raw) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "dropping malformed frame");
                return;
            }
        };

        if let Some(id) = frame.id {
            let pending = self.table.lock().calls.remove(&id);
            if let Some(call) = pending {
                let outcome = match frame.error {
                    Some(err) => {
                        warn!(
                            method = %call.method,
                            code = err.code,
                            message = %err.message,
                            "protocol call failed"
                        );
                        metrics::counter!("cdp_call_errors_total", "method" => call.method.clone())
                            .increment(1);
                        Err(CdpError::Protocol {
                            method: call.method,
                            code: err.code,
                            message: err.message,
                        })
                    }
                    None => Ok(frame.result.unwrap_or(Value::Null)),
                };
                let _ = call.tx.send(outcome);
                return;
            }
        }

        self.fan_out(&frame);
    }

    fn fan_out(&self, frame: &Frame) {
        let method = frame.method();
        let matched: Vec<Arc<Subscription>> = {
            let mut subs = self.subscribers.lock();
            let matched = subs.iter().filter(|s| s.matches(method)).cloned().collect();
            subs.retain(|s| !(s.once && s.matches(method)));
            matched
        };

        for sub in matched {
            let live = if sub.once {
                sub.active.swap(false, Ordering::SeqCst)
            } else {
                sub.active.load(Ordering::SeqCst)
            };
            if !live {
                continue;
            }
            if catch_unwind(AssertUnwindSafe(|| (sub.handler)(frame))).is_err() {
                warn!(method, subscription = sub.id, "event handler panicked");
            }
        }
    }

    fn unsubscribe(&self, id: u64) {
        let removed: Vec<Arc<Subscription>> = {
            let mut subs = self.subscribers.lock();
            let (gone, kept): (Vec<_>, Vec<_>) =
                std::mem::take(&mut *subs).into_iter().partition(|s| s.id == id);
            *subs = kept;
            gone
        };
        for sub in removed {
            sub.active.store(false, Ordering::SeqCst);
        }
    }

    fn shutdown(&self) {
        let drained = {
            let mut table = self.table.lock();
            table.closed = true;
            std::mem::take(&mut table.calls)
        };
        if !drained.is_empty() {
            debug!(pending = drained.len(), "rejecting pending calls on close");
        }
        for (_, call) in drained {
            let _ = call.tx.send(Err(CdpError::ChannelClosed));
        }

        self.closed.cancel();
        let dropped = std::mem::take(&mut *self.subscribers.lock());
        for sub in &dropped {
            sub.active.store(false, Ordering::SeqCst);
        }
    }
}

/// Cheap-to-clone handle on one control channel.
#[derive(Clone)]
pub struct ProtocolClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for ProtocolClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolClient")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl ProtocolClient {
    /// Wrap a transport and start dispatching its incoming frames.
    pub fn new(transport: Arc<dyn Transport>, incoming: Incoming) -> Self {
        Self::with_options(transport, incoming, ClientOptions::default())
    }

    /// Like [`new`](Self::new) with explicit options.
    pub fn with_options(
        transport: Arc<dyn Transport>,
        incoming: Incoming,
        options: ClientOptions,
    ) -> Self {
        let inner = Arc::new(ClientInner {
            transport,
            next_id: AtomicU64::new(1),
            next_subscription: AtomicU64::new(1),
            table: Mutex::new(PendingTable::default()),
            subscribers: Mutex::new(Vec::new()),
            closed: CancellationToken::new(),
            log_frames: options.log_frames,
        });
        drop(tokio::spawn(dispatch_loop(Arc::downgrade(&inner), incoming)));
        Self { inner }
    }

    /// Send a request and wait for its reply.
    ///
    /// Resolves with the reply's `result` (or `Null`), or fails with
    /// [`CdpError::Protocol`] if the reply carries an `error`, or with
    /// [`CdpError::ChannelClosed`] if the channel closes first.
    pub async fn call(&self, method: &str, params: Value, session_id: Option<&str>) -> Result<Value> {
        let inner = &self.inner;
        let id = inner.next_id.fetch_add(1, Ordering::Relaxed);
        let raw = serde_json::to_string(&Frame::request(id, method, params, session_id))?;

        let (tx, rx) = oneshot::channel();
        {
            let mut table = inner.table.lock();
            if table.closed {
                return Err(CdpError::ChannelClosed);
            }
            let _ = table.calls.insert(
                id,
                PendingCall {
                    method: method.to_string(),
                    tx,
                },
            );
        }
        metrics::counter!("cdp_calls_total", "method" => method.to_string()).increment(1);

        if inner.log_frames {
            debug!(direction = "out", frame = %raw, "protocol frame");
        }
        if let Err(e) = inner.transport.send(raw).await {
            let _ = inner.table.lock().calls.remove(&id);
            return Err(e);
        }

        rx.await.unwrap_or(Err(CdpError::ChannelClosed))
    }

    /// [`call`](Self::call) and deserialize the reply.
    pub async fn call_as<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
        session_id: Option<&str>,
    ) -> Result<T> {
        let value = self.call(method, params, session_id).await?;
        serde_json::from_value(value).map_err(|e| CdpError::unexpected(method, e.to_string()))
    }

    /// Register `handler` for frames whose method equals `method`.
    ///
    /// A `once` subscription is removed before its first invocation. After
    /// close the returned handle is inert and the handler never runs.
    pub fn subscribe(
        &self,
        method: &str,
        handler: impl Fn(&Frame) + Send + Sync + 'static,
        once: bool,
    ) -> SubscriptionHandle {
        self.subscribe_many(&[method], Arc::new(handler), once)
    }

    fn subscribe_many(&self, methods: &[&str], handler: EventHandler, once: bool) -> SubscriptionHandle {
        let id = self.inner.next_subscription.fetch_add(1, Ordering::Relaxed);
        let handle = SubscriptionHandle {
            id,
            client: Arc::downgrade(&self.inner),
        };
        let mut subs = self.inner.subscribers.lock();
        if self.inner.closed.is_cancelled() {
            return handle;
        }
        subs.push(Arc::new(Subscription {
            id,
            methods: methods.iter().map(|m| (*m).to_string()).collect(),
            handler,
            once,
            active: AtomicBool::new(true),
        }));
        handle
    }

    /// Stream of frames for one event method.
    pub fn events(&self, method: &str) -> EventStream {
        self.events_for(&[method])
    }

    /// Stream of frames for any of `methods`, in arrival order.
    ///
    /// The stream ends when the channel closes; dropping it unsubscribes.
    pub fn events_for(&self, methods: &[&str]) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler: EventHandler = Arc::new(move |frame: &Frame| {
            let _ = tx.send(frame.clone());
        });
        EventStream {
            rx,
            handle: self.subscribe_many(methods, handler, false),
        }
    }

    /// Close the transport and reject everything still pending. Idempotent.
    pub async fn close(&self) {
        if !self.inner.closed.is_cancelled() {
            debug!("closing control channel");
        }
        self.inner.transport.close().await;
        self.inner.shutdown();
    }

    /// Whether the channel has closed.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }

    /// Token cancelled when the channel closes.
    pub fn closed_token(&self) -> CancellationToken {
        self.inner.closed.clone()
    }
}

async fn dispatch_loop(inner: Weak<ClientInner>, mut incoming: Incoming) {
    while let Some(raw) = incoming.recv().await {
        let Some(client) = inner.upgrade() else {
            return;
        };
        client.dispatch(&raw);
    }
    if let Some(client) = inner.upgrade() {
        debug!("transport ended");
        client.shutdown();
        client.transport.close().await;
    }
}

/// Handle returned by [`ProtocolClient::subscribe`].
#[derive(Clone, Debug)]
pub struct SubscriptionHandle {
    id: u64,
    client: Weak<ClientInner>,
}

impl SubscriptionHandle {
    /// Stop delivering frames to this subscription.
    pub fn unsubscribe(&self) {
        if let Some(client) = self.client.upgrade() {
            client.unsubscribe(self.id);
        }
    }
}

/// Event frames delivered through a channel.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<Frame>,
    handle: SubscriptionHandle,
}

impl EventStream {
    /// Next frame, or `None` once the channel has closed.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.handle.unsubscribe();
    }
}
