//! Host functions callable from the page as `Gluon.ipc.<name>(...args)`.
//!
//! An exposed name is an ordinary listener on the type `"exposed <name>"`;
//! the page proxy sends its call arguments as a JSON array.

use std::future::Future;

use futures::FutureExt;
use serde_json::Value;
use tracing::debug;

use crate::bridge::{IpcBridge, ListenerId};
use crate::error::{IpcError, Result};
use crate::message::exposed_type;

/// Boxed exposed function, for [`IpcBridge::expose_all`].
pub type ExposedFn = Box<dyn Fn(Vec<Value>) -> futures::future::BoxFuture<'static, Option<Value>> + Send + Sync>;

fn call_args(data: Value) -> Vec<Value> {
    match data {
        Value::Array(args) => args,
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

impl IpcBridge {
    /// Make `handler` callable from the page as `Gluon.ipc.<name>(...)`.
    ///
    /// The handler receives the call arguments; its result is the page-side
    /// promise's value (`null` when `None`).
    pub fn expose<F, Fut>(&self, name: &str, handler: F) -> Result<ListenerId>
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<Value>> + Send + 'static,
    {
        if name.trim().is_empty() {
            return Err(IpcError::InvalidArguments(
                "expected a non-empty name and a function".into(),
            ));
        }
        if self.inner.log_ipc {
            debug!(name, "ipc expose");
        }
        Ok(self.on(&exposed_type(name), move |data| handler(call_args(data))))
    }

    /// Expose every `(name, handler)` pair. Stops at the first invalid name.
    pub fn expose_all<I>(&self, handlers: I) -> Result<Vec<ListenerId>>
    where
        I: IntoIterator<Item = (String, ExposedFn)>,
    {
        handlers
            .into_iter()
            .map(|(name, handler)| self.expose(&name, move |args| handler(args)))
            .collect()
    }

    /// Remove everything exposed under `name`. Returns whether anything was.
    pub fn unexpose(&self, name: &str) -> bool {
        if self.inner.log_ipc {
            debug!(name, "ipc unexpose");
        }
        self.remove_all_listeners(&exposed_type(name))
    }
}

/// Box an async closure as an [`ExposedFn`].
pub fn exposed<F, Fut>(handler: F) -> ExposedFn
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<Value>> + Send + 'static,
{
    Box::new(move |args| handler(args).boxed())
}
