//! WebSocket transport with `/json/list` endpoint discovery.
//!
//! The browser publishes its debugger endpoints over HTTP once it is ready.
//! Discovery polls `http://{host}:{port}/json/list` at a fixed interval until
//! the list is non-empty, then connects to the first entry's
//! `webSocketDebuggerUrl`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{Incoming, Transport};
use crate::error::{CdpError, Result};
use crate::retry::{RetryPolicy, poll_with_backoff};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One entry of the `/json/list` discovery document.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDescriptor {
    /// Target id.
    #[serde(default)]
    pub id: String,
    /// Target kind.
    #[serde(default, rename = "type")]
    pub target_type: String,
    /// Current URL.
    #[serde(default)]
    pub url: String,
    /// Socket endpoint for this target.
    #[serde(default)]
    pub web_socket_debugger_url: Option<String>,
}

/// Poll the discovery document until it lists an endpoint.
///
/// Connection failures, non-success statuses and empty lists are retried per
/// `policy`. Fails with [`CdpError::Discovery`] once the attempts run out.
pub async fn discover_endpoint(
    http: &reqwest::Client,
    host: &str,
    port: u16,
    policy: RetryPolicy,
) -> Result<String> {
    let list_url = format!("http://{host}:{port}/json/list");
    let found = poll_with_backoff(policy, |attempt| {
        let list_url = list_url.clone();
        async move {
            let Ok(resp) = http.get(&list_url).send().await else {
                debug!(attempt, url = %list_url, "discovery endpoint not reachable yet");
                return Ok::<_, CdpError>(None);
            };
            if !resp.status().is_success() {
                debug!(attempt, status = %resp.status(), "discovery endpoint not ready");
                return Ok(None);
            }
            let Ok(targets) = resp.json::<Vec<TargetDescriptor>>().await else {
                debug!(attempt, "discovery document not parseable yet");
                return Ok(None);
            };
            Ok(targets
                .into_iter()
                .next()
                .and_then(|t| t.web_socket_debugger_url))
        }
    })
    .await?;

    found.ok_or_else(|| {
        CdpError::Discovery(format!("no debugger endpoint listed at {list_url}"))
    })
}

/// Transport over a single WebSocket connection.
pub struct WebSocketTransport {
    sink: Mutex<SplitSink<WsStream, Message>>,
    closed: AtomicBool,
    shutdown: CancellationToken,
}

impl WebSocketTransport {
    /// Connect to a known `ws://` endpoint.
    pub async fn connect(ws_url: &str) -> Result<(Arc<Self>, Incoming)> {
        let (ws, _) = connect_async(ws_url).await?;
        info!(url = %ws_url, "control socket connected");

        let (sink, stream) = ws.split();
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        drop(tokio::spawn(read_loop(stream, tx, shutdown.clone())));

        Ok((
            Arc::new(Self {
                sink: Mutex::new(sink),
                closed: AtomicBool::new(false),
                shutdown,
            }),
            rx,
        ))
    }

    /// Discover the endpoint on `host:port`, then connect.
    pub async fn discover_and_connect(
        host: &str,
        port: u16,
        policy: RetryPolicy,
    ) -> Result<(Arc<Self>, Incoming)> {
        let http = reqwest::Client::new();
        let ws_url = discover_endpoint(&http, host, port, policy).await?;
        Self::connect(&ws_url).await
    }
}

async fn read_loop(
    mut stream: futures::stream::SplitStream<WsStream>,
    tx: mpsc::UnboundedSender<String>,
    shutdown: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            () = shutdown.cancelled() => break,
            next = stream.next() => next,
        };
        let message = match next {
            Some(Ok(Message::Text(text))) => text.as_str().to_string(),
            Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "dropping non UTF-8 binary frame");
                    continue;
                }
            },
            Some(Ok(Message::Close(frame))) => {
                debug!(?frame, "control socket closed by peer");
                break;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                warn!(error = %e, "control socket read failed");
                break;
            }
            None => break,
        };
        if tx.send(message).is_err() {
            break;
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&self, raw: String) -> Result<()> {
        if self.is_closed() {
            return Err(CdpError::ChannelClosed);
        }
        self.sink
            .lock()
            .await
            .send(Message::Text(raw.into()))
            .await
            .map_err(CdpError::from)
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown.cancel();
        if let Err(e) = self.sink.lock().await.close().await {
            debug!(error = %e, "control socket close failed");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
