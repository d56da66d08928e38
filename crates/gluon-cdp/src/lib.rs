//! # gluon-cdp
//!
//! Control channel to a remote-controlled browser process.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `transport` | NUL-delimited pipe and WebSocket transports, endpoint discovery |
//! | `client` | Request ids, pending replies, event subscriptions, close semantics |
//! | `session` | Page target acquisition and session-scoped commands |
//! | `evaluate` | Expression evaluation and init scripts on a session |
//! | `guard` | Navigation policy enforcement |
//! | `retry` | Fixed-interval polling shared by discovery and acquisition |
//! | `types` | Frame shape, targets, history, method and event names |
//!
//! ```text
//! Transport ──► ProtocolClient ──┬─► SessionManager ──► SessionClient
//!                                ├─► NavigationGuard
//!                                └─► (IPC bridge, in gluon-ipc)
//! ```

#![deny(unsafe_code)]

pub mod client;
pub mod error;
pub mod evaluate;
pub mod guard;
pub mod retry;
pub mod session;
#[cfg(any(test, feature = "test-util"))]
pub mod testutil;
pub mod transport;
pub mod types;

pub use client::{ClientOptions, EventHandler, EventStream, ProtocolClient, SubscriptionHandle};
pub use error::{CdpError, Result};
pub use guard::{GuardAction, NavigationGuard};
pub use retry::{RetryPolicy, poll_with_backoff};
pub use session::{Session, SessionClient, SessionId, SessionManager};
pub use transport::{Incoming, PipeTransport, Transport, WebSocketTransport};
pub use types::{BLANK_PAGE, BrowserVersion, Frame, NavigationHistory, TargetInfo, events, methods};
