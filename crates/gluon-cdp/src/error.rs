//! Control channel error type.

/// Errors surfaced by the control channel.
#[derive(Debug, thiserror::Error)]
pub enum CdpError {
    /// The channel was closed before (or while) the operation ran.
    #[error("channel closed")]
    ChannelClosed,

    /// The peer answered with an `error` field.
    #[error("{method} failed ({code}): {message}")]
    Protocol {
        /// Method of the failed request.
        method: String,
        /// Peer error code.
        code: i64,
        /// Peer error message.
        message: String,
    },

    /// The underlying pipe or socket failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The control endpoint could not be discovered.
    #[error("discovery failed: {0}")]
    Discovery(String),

    /// A frame could not be encoded or decoded.
    #[error("invalid frame JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// An evaluated expression threw inside the page.
    #[error("{class_name}: {message}")]
    Evaluate {
        /// Exception class reported by the page (`Error` when unknown).
        class_name: String,
        /// Exception message.
        message: String,
    },

    /// A reply arrived but did not have the expected shape.
    #[error("unexpected reply to {method}: {reason}")]
    UnexpectedReply {
        /// Method whose reply was malformed.
        method: String,
        /// What was missing or wrong.
        reason: String,
    },
}

impl CdpError {
    /// Whether this error means the channel is gone for good.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::ChannelClosed)
    }

    pub(crate) fn unexpected(method: &str, reason: impl Into<String>) -> Self {
        Self::UnexpectedReply {
            method: method.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for CdpError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match e {
            WsError::ConnectionClosed | WsError::AlreadyClosed => Self::ChannelClosed,
            other => Self::Transport(other.to_string()),
        }
    }
}

/// Convenience alias for channel results.
pub type Result<T> = std::result::Result<T, CdpError>;
