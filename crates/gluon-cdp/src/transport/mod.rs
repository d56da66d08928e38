//! Raw message transports.
//!
//! | Module | Framing |
//! |--------|---------|
//! | `pipe` | NUL-terminated JSON documents over a byte stream |
//! | `websocket` | One JSON document per text frame, endpoint found via `/json/list` |
//!
//! A transport is created together with an [`Incoming`] receiver that yields
//! each complete message in receipt order and ends when the peer goes away
//! or the transport is closed. The receiver is handed to exactly one
//! [`ProtocolClient`](crate::ProtocolClient), which becomes the sole writer.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

pub mod pipe;
pub mod websocket;

pub use pipe::{NulDelimitedCodec, PipeTransport};
pub use websocket::{TargetDescriptor, WebSocketTransport, discover_endpoint};

/// Stream of complete raw messages received from the peer.
pub type Incoming = mpsc::UnboundedReceiver<String>;

/// Outbound half of a transport.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Write one complete message. Fails with
    /// [`CdpError::ChannelClosed`](crate::CdpError::ChannelClosed) after [`close`](Self::close).
    async fn send(&self, raw: String) -> Result<()>;

    /// Shut the connection down and end the [`Incoming`] stream. Idempotent.
    async fn close(&self);

    /// Whether [`close`](Self::close) has been called.
    fn is_closed(&self) -> bool;
}
