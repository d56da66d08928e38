//! Host side of the message bridge.
//!
//! The page cannot push to the host, so a pump task keeps one
//! `window.Gluon.ipc._get()` evaluation outstanding; each time it resolves,
//! the popped message is dispatched and the next poll goes out. Host → page
//! delivery evaluates `window.Gluon.ipc._receive(msg)`.
//!
//! Dispatch of a page message:
//! 1. If its id matches an outstanding host wait, resolve that wait.
//! 2. Else drop `pong` / `reply` acknowledgements (expected ones quietly).
//! 3. Else run every listener for its type; the first non-null result is
//!    sent back as `reply`, otherwise a `pong`, both carrying the same id.
//!
//! Steps 1 and 2 happen on the pump itself. Messages that reach step 3 are
//! queued to a single dispatcher task, so listeners see page messages in the
//! order the page sent them. A listener may `send` to the page: its answer
//! is resolved by the pump without going through the dispatcher.

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{IpcError, Result};
use crate::evaluator::PageEvaluator;
use crate::injection::{GET_EXPRESSION, page_script, receive_expression};
use crate::message::{self, IpcMessage, PONG, REPLY};

/// Pause before re-polling after a failed or empty pull (e.g. during a reload).
const PUMP_RETRY: Duration = Duration::from_millis(100);

/// How many fire-and-forget ids are remembered for absorbing their answers.
const ABSORB_LIMIT: usize = 256;

/// Handle for removing a registered listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Boxed listener: receives message data, may return reply data.
pub type Listener = Arc<dyn Fn(Value) -> BoxFuture<'static, Option<Value>> + Send + Sync>;

/// Bridge construction options.
#[derive(Clone, Copy, Debug, Default)]
pub struct BridgeOptions {
    /// Trace every message, expose and store write at debug level.
    pub log_ipc: bool,
}

#[derive(Default)]
struct WaitTable {
    closed: bool,
    waits: HashMap<String, oneshot::Sender<IpcMessage>>,
    absorbed: HashSet<String>,
    absorb_order: VecDeque<String>,
}

impl WaitTable {
    fn absorb(&mut self, id: &str) {
        if self.absorb_order.len() >= ABSORB_LIMIT
            && let Some(oldest) = self.absorb_order.pop_front()
        {
            let _ = self.absorbed.remove(&oldest);
        }
        if self.absorbed.insert(id.to_string()) {
            self.absorb_order.push_back(id.to_string());
        }
    }

    fn take_absorbed(&mut self, id: &str) -> bool {
        if !self.absorbed.remove(id) {
            return false;
        }
        self.absorb_order.retain(|queued| queued != id);
        true
    }
}

/// Removes a host wait when the waiting `send` finishes or is dropped.
struct WaitGuard<'a> {
    inner: &'a BridgeInner,
    id: &'a str,
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        let _ = self.inner.waits.lock().waits.remove(self.id);
    }
}

pub(crate) struct BridgeInner {
    evaluator: Arc<dyn PageEvaluator>,
    waits: Mutex<WaitTable>,
    listeners: Mutex<HashMap<String, Vec<(ListenerId, Listener)>>>,
    next_listener: AtomicU64,
    pub(crate) store: Mutex<Map<String, Value>>,
    shutdown: CancellationToken,
    pub(crate) log_ipc: bool,
}

impl BridgeInner {
    fn close_waits(&self) {
        let drained = {
            let mut table = self.waits.lock();
            table.closed = true;
            table.absorbed.clear();
            table.absorb_order.clear();
            std::mem::take(&mut table.waits)
        };
        if !drained.is_empty() {
            debug!(pending = drained.len(), "dropping outstanding ipc waits on close");
        }
    }

    fn register_wait(&self, id: &str) -> Result<oneshot::Receiver<IpcMessage>> {
        let (tx, rx) = oneshot::channel();
        let mut table = self.waits.lock();
        if table.closed {
            return Err(IpcError::ChannelClosed);
        }
        let _ = table.waits.insert(id.to_string(), tx);
        Ok(rx)
    }

    fn register_absorb(&self, id: &str) -> Result<()> {
        let mut table = self.waits.lock();
        if table.closed {
            return Err(IpcError::ChannelClosed);
        }
        table.absorb(id);
        Ok(())
    }

    fn listeners_for(&self, kind: &str) -> Vec<Listener> {
        self.listeners
            .lock()
            .get(kind)
            .map(|list| list.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default()
    }

    async fn deliver(&self, msg: &IpcMessage) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(IpcError::ChannelClosed);
        }
        if self.log_ipc {
            debug!(id = %msg.id, kind = %msg.kind, data = %msg.data, "ipc send");
        }
        metrics::counter!("ipc_messages_total", "direction" => "out").increment(1);
        let expression = receive_expression(msg)?;
        let _ = self.evaluator.evaluate(&expression, false).await?;
        Ok(())
    }

    /// Resolve host waits and drop acknowledgements. Returns the message if
    /// it still needs its listeners run.
    fn route(&self, msg: IpcMessage) -> Option<IpcMessage> {
        metrics::counter!("ipc_messages_total", "direction" => "in").increment(1);
        if self.log_ipc {
            debug!(id = %msg.id, kind = %msg.kind, data = %msg.data, "ipc receive");
        }

        let (waiter, absorbed) = {
            let mut table = self.waits.lock();
            match table.waits.remove(&msg.id) {
                Some(tx) => (Some(tx), false),
                None => (None, table.take_absorbed(&msg.id)),
            }
        };
        if let Some(tx) = waiter {
            let _ = tx.send(msg);
            return None;
        }
        if msg.is_answer() {
            if !absorbed {
                debug!(id = %msg.id, kind = %msg.kind, "dropping unmatched acknowledgement");
            }
            return None;
        }
        Some(msg)
    }

    async fn dispatch(&self, msg: IpcMessage) {
        let mut reply = None;
        for listener in self.listeners_for(&msg.kind) {
            let outcome = AssertUnwindSafe(listener(msg.data.clone())).catch_unwind().await;
            match outcome {
                Ok(ret) => {
                    if reply.is_none() {
                        reply = ret.filter(|v| !v.is_null());
                    }
                }
                Err(_) => warn!(kind = %msg.kind, "ipc listener panicked"),
            }
        }

        let answer = match reply {
            Some(data) => IpcMessage {
                id: msg.id,
                kind: REPLY.to_string(),
                data,
            },
            None => IpcMessage {
                id: msg.id,
                kind: PONG.to_string(),
                data: Value::Null,
            },
        };
        match self.deliver(&answer).await {
            Ok(()) => {}
            Err(e) if e.is_closed() => {}
            Err(e) => warn!(error = %e, kind = %answer.kind, "failed to answer page message"),
        }
    }
}

/// Cheap-to-clone handle on a running bridge.
#[derive(Clone)]
pub struct IpcBridge {
    pub(crate) inner: Arc<BridgeInner>,
}

impl std::fmt::Debug for IpcBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpcBridge")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl IpcBridge {
    /// Inject the page script and start pumping.
    ///
    /// `versions` becomes `window.Gluon.versions`. The script is registered
    /// for every new document and evaluated once in the current one. The
    /// bridge stops when `closed` fires or [`close`](Self::close) is called.
    pub async fn start(
        evaluator: Arc<dyn PageEvaluator>,
        versions: &Value,
        closed: &CancellationToken,
        options: BridgeOptions,
    ) -> Result<Self> {
        let script = page_script(versions)?;
        evaluator.add_init_script(&script).await?;
        let _ = evaluator.evaluate(&script, false).await?;

        let bridge = Self::attach(evaluator, closed, options);
        bridge.install_store_listeners();
        drop(tokio::spawn(pump(Arc::clone(&bridge.inner))));
        info!("ipc bridge started");
        Ok(bridge)
    }

    fn attach(evaluator: Arc<dyn PageEvaluator>, closed: &CancellationToken, options: BridgeOptions) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                evaluator,
                waits: Mutex::new(WaitTable::default()),
                listeners: Mutex::new(HashMap::new()),
                next_listener: AtomicU64::new(1),
                store: Mutex::new(Map::new()),
                shutdown: closed.child_token(),
                log_ipc: options.log_ipc,
            }),
        }
    }

    /// Send a message and wait for the page's answer.
    ///
    /// Resolves with the answer's data (`Null` for a pong). Fails fast with
    /// [`IpcError::ChannelClosed`] once the bridge has closed.
    pub async fn send(&self, kind: &str, data: Value) -> Result<Value> {
        let msg = IpcMessage {
            id: message::new_id(),
            kind: kind.to_string(),
            data,
        };
        let rx = self.inner.register_wait(&msg.id)?;
        let _guard = WaitGuard {
            inner: &self.inner,
            id: &msg.id,
        };
        self.inner.deliver(&msg).await?;
        let answer = rx.await.map_err(|_| IpcError::ChannelClosed)?;
        Ok(answer.data)
    }

    /// Send a message without waiting for the answer.
    ///
    /// The id is remembered (a bounded number of them) so the page's answer
    /// is absorbed quietly rather than logged as a stray acknowledgement.
    pub async fn post(&self, kind: &str, data: Value) -> Result<()> {
        let msg = IpcMessage {
            id: message::new_id(),
            kind: kind.to_string(),
            data,
        };
        self.inner.register_absorb(&msg.id)?;
        if let Err(e) = self.inner.deliver(&msg).await {
            let _ = self.inner.waits.lock().take_absorbed(&msg.id);
            return Err(e);
        }
        Ok(())
    }

    /// Register `listener` for messages of type `kind`.
    ///
    /// Listeners for one type run in registration order; the first non-null
    /// result becomes the reply.
    pub fn on<F, Fut>(&self, kind: &str, listener: F) -> ListenerId
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<Value>> + Send + 'static,
    {
        self.add_listener(kind, Arc::new(move |data| listener(data).boxed()))
    }

    pub(crate) fn add_listener(&self, kind: &str, listener: Listener) -> ListenerId {
        let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::Relaxed));
        self.inner
            .listeners
            .lock()
            .entry(kind.to_string())
            .or_default()
            .push((id, listener));
        id
    }

    /// Remove one listener. Returns `false` if nothing was registered for
    /// `kind`. The type entry is dropped once its last listener goes.
    pub fn remove_listener(&self, kind: &str, id: ListenerId) -> bool {
        remove_listener(&self.inner, kind, id)
    }

    /// Remove every listener for `kind`.
    pub(crate) fn remove_all_listeners(&self, kind: &str) -> bool {
        self.inner.listeners.lock().remove(kind).is_some()
    }

    /// Whether any listener is registered for `kind`.
    pub fn has_listeners(&self, kind: &str) -> bool {
        self.inner.listeners.lock().contains_key(kind)
    }

    /// Wait for the next page message of type `kind`, returning its data.
    ///
    /// The listener is registered before this returns, so a message arriving
    /// before the future is first polled is not missed.
    pub fn once(&self, kind: &str) -> impl Future<Output = Result<Value>> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        let slot = Arc::new(Mutex::new(Some(tx)));
        let weak: Weak<BridgeInner> = Arc::downgrade(&self.inner);
        let id_cell: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));
        let owned_kind = kind.to_string();

        let listener: Listener = {
            let id_cell = Arc::clone(&id_cell);
            Arc::new(move |data: Value| {
                if let Some(tx) = slot.lock().take() {
                    let _ = tx.send(data);
                }
                if let (Some(inner), Some(id)) = (weak.upgrade(), *id_cell.lock()) {
                    let _ = remove_listener(&inner, &owned_kind, id);
                }
                async { None::<Value> }.boxed()
            })
        };
        let id = self.add_listener(kind, listener);
        *id_cell.lock() = Some(id);

        let shutdown = self.inner.shutdown.clone();
        async move {
            tokio::select! {
                () = shutdown.cancelled() => Err(IpcError::ChannelClosed),
                data = rx => data.map_err(|_| IpcError::ChannelClosed),
            }
        }
    }

    /// Stop pumping and fail every outstanding wait. Idempotent.
    pub fn close(&self) {
        if !self.inner.shutdown.is_cancelled() {
            debug!("closing ipc bridge");
        }
        self.inner.shutdown.cancel();
        self.inner.close_waits();
    }

    /// Whether the bridge has stopped.
    pub fn is_closed(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    fn install_store_listeners(&self) {
        let weak = Arc::downgrade(&self.inner);
        let _ = self.on(message::WEB_STORE_WRITE, move |data| {
            let weak = weak.clone();
            async move {
                if let Some(inner) = weak.upgrade() {
                    crate::store::apply_page_write(&inner, &data);
                }
                None
            }
        });

        let weak = Arc::downgrade(&self.inner);
        let _ = self.on(message::WEB_STORE_SYNC, move |_| {
            let snapshot = weak
                .upgrade()
                .map_or_else(|| json!({}), |inner| Value::Object(inner.store.lock().clone()));
            async move { Some(snapshot) }
        });
    }
}

fn remove_listener(inner: &BridgeInner, kind: &str, id: ListenerId) -> bool {
    let mut listeners = inner.listeners.lock();
    let Some(list) = listeners.get_mut(kind) else {
        return false;
    };
    list.retain(|(lid, _)| *lid != id);
    if list.is_empty() {
        let _ = listeners.remove(kind);
    }
    true
}

async fn pump(inner: Arc<BridgeInner>) {
    let (queue, requests) = mpsc::unbounded_channel();
    drop(tokio::spawn(dispatcher(Arc::clone(&inner), requests)));
    loop {
        let polled = tokio::select! {
            () = inner.shutdown.cancelled() => break,
            polled = inner.evaluator.evaluate(GET_EXPRESSION, true) => polled,
        };
        match polled {
            Ok(Value::String(raw)) => match serde_json::from_str::<IpcMessage>(&raw) {
                Ok(msg) => {
                    if let Some(request) = inner.route(msg)
                        && queue.send(request).is_err()
                    {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "dropping undecodable page message"),
            },
            Ok(other) => {
                debug!(value = %other, "empty pull from page");
                tokio::select! {
                    () = inner.shutdown.cancelled() => break,
                    () = tokio::time::sleep(PUMP_RETRY) => {}
                }
            }
            Err(e) if e.is_closed() => break,
            Err(e) => {
                debug!(error = %e, "pull from page failed, retrying");
                tokio::select! {
                    () = inner.shutdown.cancelled() => break,
                    () = tokio::time::sleep(PUMP_RETRY) => {}
                }
            }
        }
    }
    inner.shutdown.cancel();
    inner.close_waits();
    debug!("ipc pump stopped");
}

async fn dispatcher(inner: Arc<BridgeInner>, mut requests: mpsc::UnboundedReceiver<IpcMessage>) {
    while let Some(msg) = requests.recv().await {
        inner.dispatch(msg).await;
    }
}

#[cfg(test)]
impl IpcBridge {
    /// Bridge wired to `evaluator` without injecting, for unit tests.
    pub(crate) fn start_bare(evaluator: Arc<dyn PageEvaluator>, closed: &CancellationToken) -> Self {
        let bridge = Self::attach(evaluator, closed, BridgeOptions { log_ipc: true });
        bridge.install_store_listeners();
        drop(tokio::spawn(pump(Arc::clone(&bridge.inner))));
        bridge
    }
}
