//! # gluon-ipc
//!
//! Structured messaging between the host process and a controlled page.
//!
//! The only primitive available is "evaluate an expression in the page"
//! ([`PageEvaluator`]). The bridge injects a page script exposing a message
//! queue, pulls page messages by keeping one awaiting evaluation in flight,
//! and pushes host messages by evaluating the page's receive entry point.
//!
//! On top of plain messages it offers typed listeners, host functions exposed
//! to the page, and a key/value store replicated in both directions.

#![deny(unsafe_code)]

pub mod bridge;
pub mod error;
pub mod evaluator;
pub mod expose;
pub mod injection;
pub mod message;
pub mod store;

#[cfg(test)]
mod fake_page;

pub use bridge::{BridgeOptions, IpcBridge, Listener, ListenerId};
pub use error::{IpcError, Result};
pub use evaluator::PageEvaluator;
pub use expose::{ExposedFn, exposed};
pub use injection::{GET_EXPRESSION, page_script, receive_expression};
pub use message::{IpcMessage, exposed_type};
pub use store::{RESERVED_KEYS, Store};
