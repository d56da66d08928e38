//! Bridge error type.

use gluon_cdp::CdpError;

/// Errors surfaced by the IPC bridge.
#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    /// The bridge or its control channel has closed.
    #[error("ipc channel closed")]
    ChannelClosed,

    /// An evaluate call failed for a reason other than closure.
    #[error("control channel error: {0}")]
    Cdp(#[source] CdpError),

    /// Caller supplied unusable arguments (e.g. an empty exposed name).
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// A store write targeted one of the built-in accessor names.
    #[error("cannot overwrite built-in store accessor `{0}`")]
    ReservedKey(String),

    /// A queued page message was not valid JSON of the expected shape.
    #[error("undecodable ipc message: {0}")]
    Decode(#[from] serde_json::Error),
}

impl IpcError {
    /// Whether this error means the bridge is gone for good.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::ChannelClosed)
    }
}

impl From<CdpError> for IpcError {
    fn from(e: CdpError) -> Self {
        if e.is_closed() {
            Self::ChannelClosed
        } else {
            Self::Cdp(e)
        }
    }
}

/// Convenience alias for bridge results.
pub type Result<T> = std::result::Result<T, IpcError>;
