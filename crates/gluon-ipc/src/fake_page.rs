//! Scripted stand-in for the page side of the bridge.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gluon_cdp::CdpError;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::evaluator::PageEvaluator;
use crate::injection::GET_EXPRESSION;
use crate::message::IpcMessage;

const FAIL_PULL: &str = "\u{0}fail";
const EMPTY_PULL: &str = "\u{0}empty";

pub(crate) struct FakePage {
    queue_tx: mpsc::UnboundedSender<String>,
    queue_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
    received_tx: mpsc::UnboundedSender<IpcMessage>,
    received_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<IpcMessage>>,
    init_scripts: Mutex<Vec<String>>,
    evaluated: Mutex<Vec<String>>,
}

impl FakePage {
    pub(crate) fn new() -> Arc<Self> {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (received_tx, received_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            queue_tx,
            queue_rx: tokio::sync::Mutex::new(queue_rx),
            received_tx,
            received_rx: tokio::sync::Mutex::new(received_rx),
            init_scripts: Mutex::new(Vec::new()),
            evaluated: Mutex::new(Vec::new()),
        })
    }

    /// Queue a page → host message for the next pull.
    pub(crate) fn push(&self, id: &str, kind: &str, data: Value) {
        let msg = IpcMessage {
            id: id.to_string(),
            kind: kind.to_string(),
            data,
        };
        let _ = self.queue_tx.send(serde_json::to_string(&msg).unwrap());
    }

    /// Make the next pull fail as if the document were being replaced.
    pub(crate) fn fail_next_pull(&self) {
        let _ = self.queue_tx.send(FAIL_PULL.to_string());
    }

    /// Make the next pull resolve to `undefined`.
    pub(crate) fn empty_next_pull(&self) {
        let _ = self.queue_tx.send(EMPTY_PULL.to_string());
    }

    /// Next message the host delivered into the page.
    pub(crate) async fn next_received(&self) -> IpcMessage {
        self.try_next_received(Duration::from_secs(2))
            .await
            .expect("host delivered nothing")
    }

    pub(crate) async fn try_next_received(&self, timeout: Duration) -> Option<IpcMessage> {
        let mut rx = self.received_rx.lock().await;
        tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
    }

    pub(crate) fn init_scripts(&self) -> Vec<String> {
        self.init_scripts.lock().clone()
    }

    pub(crate) fn evaluated(&self) -> Vec<String> {
        self.evaluated.lock().clone()
    }
}

#[async_trait]
impl PageEvaluator for FakePage {
    async fn evaluate(&self, expression: &str, _await_promise: bool) -> Result<Value, CdpError> {
        if expression == GET_EXPRESSION {
            let raw = self
                .queue_rx
                .lock()
                .await
                .recv()
                .await
                .ok_or(CdpError::ChannelClosed)?;
            if raw == FAIL_PULL {
                return Err(CdpError::Evaluate {
                    class_name: "Error".into(),
                    message: "Execution context was destroyed.".into(),
                });
            }
            if raw == EMPTY_PULL {
                return Ok(Value::Null);
            }
            return Ok(Value::String(raw));
        }
        if let Some(body) = expression
            .strip_prefix("window.Gluon.ipc._receive(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            let msg: IpcMessage = serde_json::from_str(body)?;
            let _ = self.received_tx.send(msg);
            return Ok(Value::Null);
        }
        self.evaluated.lock().push(expression.to_string());
        Ok(Value::Null)
    }

    async fn add_init_script(&self, source: &str) -> Result<(), CdpError> {
        self.init_scripts.lock().push(source.to_string());
        Ok(())
    }
}
