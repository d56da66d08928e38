//! Control channel settings.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::SettingsError;

/// Which transport carries protocol frames to the browser process.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// NUL-delimited JSON over the process's debugging pipe.
    #[default]
    Pipe,
    /// One JSON document per WebSocket text frame.
    #[serde(rename = "websocket")]
    WebSocket,
}

impl FromStr for TransportKind {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pipe" | "stdio" => Ok(Self::Pipe),
            "websocket" | "ws" => Ok(Self::WebSocket),
            _ => Err(SettingsError::InvalidValue {
                field: "channel.transport".into(),
                value: s.to_string(),
            }),
        }
    }
}

/// Control channel settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelSettings {
    /// Transport the launcher should use to reach the browser.
    ///
    /// Advisory: the window layer never reads it. The launcher picks
    /// `Window::connect_pipe` or `Window::connect_websocket` from it.
    pub transport: TransportKind,
    /// Host queried for `/json/list` when using the WebSocket transport.
    pub discovery_host: String,
    /// Delay between discovery attempts in milliseconds.
    pub discovery_retry_ms: u64,
    /// Give up discovery after this many attempts (`None` = keep trying).
    pub discovery_max_attempts: Option<u32>,
    /// Delay between target list polls while acquiring a session.
    pub acquire_retry_ms: u64,
    /// Upper bound on the initial load-event waits in milliseconds.
    pub load_timeout_ms: u64,
    /// Trace every sent and received protocol frame.
    pub log_protocol: bool,
    /// Trace IPC sends, exposes and store writes.
    pub log_ipc: bool,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            transport: TransportKind::Pipe,
            discovery_host: "127.0.0.1".to_string(),
            discovery_retry_ms: 200,
            discovery_max_attempts: None,
            acquire_retry_ms: 200,
            load_timeout_ms: 10_000,
            log_protocol: false,
            log_ipc: false,
        }
    }
}

impl ChannelSettings {
    /// Discovery retry interval.
    pub fn discovery_retry(&self) -> Duration {
        Duration::from_millis(self.discovery_retry_ms)
    }

    /// Target acquisition retry interval.
    pub fn acquire_retry(&self) -> Duration {
        Duration::from_millis(self.acquire_retry_ms)
    }

    /// Load-event wait bound.
    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }
}
