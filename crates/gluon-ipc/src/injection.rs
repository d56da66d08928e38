//! Page-side counterpart of the bridge.
//!
//! The script installs `window.Gluon` once per document:
//!
//! - `Gluon.versions`: the versions object handed in by the host.
//! - `Gluon.ipc.send(type, data)`: queue a message and resolve with the reply data.
//! - `Gluon.ipc.on` / `removeListener`: typed listeners for host messages.
//! - `Gluon.ipc._get()`: pop the next queued message as JSON, waiting if empty.
//! - `Gluon.ipc._receive(msg)`: entry point the host evaluates to deliver.
//! - `Gluon.ipc.store`: replicated key/value mirror.
//! - `Gluon.ipc.<anything else>(...args)`: call a host-exposed function.

use serde_json::Value;

use crate::error::Result;
use crate::message::IpcMessage;

/// Expression the pump evaluates to pull the next page message.
pub const GET_EXPRESSION: &str = "window.Gluon.ipc._get()";

const VERSIONS_SLOT: &str = "__GLUON_VERSIONS__";

const PAGE_SCRIPT: &str = r#"(() => {
  if (window.Gluon) return;

  const versions = __GLUON_VERSIONS__;
  const waiting = new Map();
  const listeners = new Map();
  const queue = [];
  let wake = null;

  const newId = () => Math.random().toString().slice(2);

  const enqueue = (type, data, id) => {
    queue.push({ id, type, data });
    if (wake) {
      const resume = wake;
      wake = null;
      resume();
    }
  };

  const send = (type, data = null) => {
    const id = newId();
    const answered = new Promise((resolve) => waiting.set(id, resolve));
    enqueue(type, data, id);
    return answered.then((msg) => msg.data);
  };

  const on = (type, cb) => {
    if (!listeners.has(type)) listeners.set(type, []);
    listeners.get(type).push(cb);
  };

  const removeListener = (type, cb) => {
    const list = listeners.get(type);
    if (!list) return false;
    const at = list.indexOf(cb);
    if (at === -1) return false;
    list.splice(at, 1);
    if (list.length === 0) listeners.delete(type);
    return true;
  };

  const ipc = {
    send,
    on,
    removeListener,

    _get: async () => {
      while (queue.length === 0) await new Promise((resolve) => (wake = resolve));
      return JSON.stringify(queue.shift());
    },

    _receive: async ({ id, type, data }) => {
      const resolve = waiting.get(id);
      if (resolve) {
        waiting.delete(id);
        resolve({ type, data });
        return;
      }
      if (type === 'pong' || type === 'reply') return;

      let reply = null;
      for (const cb of [...(listeners.get(type) ?? [])]) {
        const ret = await cb(data);
        if (reply == null && ret != null) reply = ret;
      }
      if (reply != null) enqueue('reply', reply, id);
      else enqueue('pong', null, id);
    },
  };

  let store = {};
  const writeBackend = (key, value) =>
    send('web store write', { key, value: value === undefined ? null : value });
  const accessors = {
    get: (key) => store[key],
    set: (key, value) => {
      if (Object.hasOwn(accessors, key)) throw new Error('Cannot overwrite Gluon functions');
      store[key] = value;
      writeBackend(key, value);
      return value;
    },
    keys: () => Object.keys(store),
    toJSON: () => ({ ...store }),
  };
  const reserved = (key) => Object.hasOwn(accessors, key);

  ipc.store = new Proxy(accessors, {
    get: (target, key) => (reserved(key) ? target[key] : store[key]),
    set: (target, key, value) => {
      if (reserved(key)) throw new Error('Cannot overwrite Gluon functions');
      store[key] = value;
      writeBackend(key, value);
      return true;
    },
    deleteProperty: (target, key) => {
      if (reserved(key)) throw new Error('Cannot overwrite Gluon functions');
      delete store[key];
      writeBackend(key, null);
      return true;
    },
  });

  on('backend store write', ({ key, value }) => {
    if (value == null) delete store[key];
    else store[key] = value;
  });
  send('web store sync').then((snapshot) => {
    store = snapshot ?? {};
  });

  window.Gluon = {
    versions,
    ipc: new Proxy(ipc, {
      get: (target, key) => {
        if (typeof key !== 'string' || key in target) return target[key];
        return (...args) => send('exposed ' + key, args);
      },
    }),
  };
})();"#;

/// Build the page script carrying `versions` as `window.Gluon.versions`.
pub fn page_script(versions: &Value) -> Result<String> {
    let versions = serde_json::to_string(versions)?;
    Ok(PAGE_SCRIPT.replacen(VERSIONS_SLOT, &versions, 1))
}

/// Expression delivering `msg` to the page.
pub fn receive_expression(msg: &IpcMessage) -> Result<String> {
    Ok(format!("window.Gluon.ipc._receive({})", serde_json::to_string(msg)?))
}
