//! # gluon
//!
//! Open an app page in a remote-controlled browser and talk to it.
//!
//! A [`Window`] owns one control channel (pipe or WebSocket), the session on
//! the app page, a navigation guard, and the IPC bridge injected into the
//! page. Lower layers live in `gluon-cdp` and `gluon-ipc` and are re-exported
//! here for callers that need them directly.

#![deny(unsafe_code)]

pub mod error;
pub mod logging;
pub mod versions;
pub mod window;

pub use error::{GluonError, Result};
pub use logging::init_tracing;
pub use versions::{BrowserEngine, VersionInfo, Versions};
pub use window::{Window, WindowOptions};

pub use gluon_cdp as cdp;
pub use gluon_ipc as ipc;
pub use gluon_settings as settings;
