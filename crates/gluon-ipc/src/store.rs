//! Replicated key/value store shared with the page.
//!
//! Host writes update the local mirror and emit one `backend store write`;
//! page writes arrive as `web store write` and update the mirror without
//! echoing back. The names of the page-side accessors are reserved.

use serde_json::{Value, json};
use tracing::debug;

use crate::bridge::{BridgeInner, IpcBridge};
use crate::error::{IpcError, Result};
use crate::message::BACKEND_STORE_WRITE;

/// Keys that name built-in store accessors.
pub const RESERVED_KEYS: [&str; 4] = ["get", "set", "keys", "toJSON"];

/// Whether `key` is a built-in accessor name.
pub fn is_reserved(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// Handle on a bridge's replicated store.
#[derive(Clone, Debug)]
pub struct Store {
    bridge: IpcBridge,
}

impl Store {
    /// Current value for `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.bridge.inner.store.lock().get(key).cloned()
    }

    /// Mirror `key` to the page, then set it locally.
    ///
    /// A reserved key fails with [`IpcError::ReservedKey`] and leaves the
    /// store untouched. So does a failed delivery. A `Null` value deletes
    /// the key.
    pub async fn set(&self, key: &str, value: Value) -> Result<()> {
        if is_reserved(key) {
            return Err(IpcError::ReservedKey(key.to_string()));
        }
        self.emit(key, &value).await?;
        let mut store = self.bridge.inner.store.lock();
        if value.is_null() {
            let _ = store.remove(key);
        } else {
            let _ = store.insert(key.to_string(), value);
        }
        Ok(())
    }

    /// Remove `key` locally and mirror the removal to the page.
    pub async fn delete(&self, key: &str) -> Result<()> {
        self.set(key, Value::Null).await
    }

    /// Keys currently stored.
    pub fn keys(&self) -> Vec<String> {
        self.bridge.inner.store.lock().keys().cloned().collect()
    }

    /// Snapshot of the whole store.
    pub fn to_json(&self) -> Value {
        Value::Object(self.bridge.inner.store.lock().clone())
    }

    async fn emit(&self, key: &str, value: &Value) -> Result<()> {
        if self.bridge.inner.log_ipc {
            debug!(key, %value, "ipc store write (backend)");
        }
        self.bridge
            .post(BACKEND_STORE_WRITE, json!({"key": key, "value": value}))
            .await
    }
}

impl IpcBridge {
    /// The replicated store.
    pub fn store(&self) -> Store {
        Store {
            bridge: self.clone(),
        }
    }
}

/// Apply a `web store write` from the page. Never re-emits.
pub(crate) fn apply_page_write(inner: &BridgeInner, data: &Value) {
    let Some(key) = data.get("key").and_then(Value::as_str) else {
        debug!(%data, "ignoring store write without key");
        return;
    };
    if is_reserved(key) {
        debug!(key, "ignoring page write to reserved store key");
        return;
    }
    let value = data.get("value").cloned().unwrap_or(Value::Null);
    if inner.log_ipc {
        debug!(key, %value, "ipc store write (web)");
    }
    let mut store = inner.store.lock();
    if value.is_null() {
        let _ = store.remove(key);
    } else {
        let _ = store.insert(key.to_string(), value);
    }
}
