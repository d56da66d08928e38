//! A controlled browser window.
//!
//! Opening a window runs the handshake on an established control channel:
//!
//! 1. subscribe to the first-load events and install the navigation guard
//! 2. read the browser version
//! 3. acquire the app page (first page target that has left `about:blank`)
//! 4. enable the runtime and page domains on its session
//! 5. wait, bounded, for the first load to finish
//! 6. start the IPC bridge
//!
//! Any failure closes the channel and is returned as a single error.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use gluon_cdp::{
    BLANK_PAGE, BrowserVersion, ClientOptions, EventStream, NavigationGuard, PipeTransport,
    ProtocolClient, RetryPolicy, SessionClient, SessionManager, WebSocketTransport, events,
    methods,
};
use gluon_ipc::{BridgeOptions, IpcBridge};
use gluon_settings::{GluonSettings, NavigationPolicy};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, instrument, warn};

use crate::error::{GluonError, Result};
use crate::versions::{BrowserEngine, Versions};

/// How long `close` waits for the browser to acknowledge `Browser.close`.
const BROWSER_CLOSE_GRACE: Duration = Duration::from_secs(1);

type CloseHandler = Box<dyn FnOnce() + Send>;

/// How to open a window.
#[derive(Clone, Debug)]
pub struct WindowOptions {
    /// URL the app was launched with; the navigation guard's reference point.
    pub url: String,
    /// Product name reported to the page. Defaults to the name in the
    /// browser's product string.
    pub browser_name: Option<String>,
    /// Engine family. Guessed from the product string when unset.
    pub engine: Option<BrowserEngine>,
    /// Navigation policy for the app page.
    pub navigation: NavigationPolicy,
    /// Host serving `/json/list` for the WebSocket transport.
    pub discovery_host: String,
    /// Discovery polling.
    pub discovery: RetryPolicy,
    /// Pause between target list polls.
    pub acquire_retry: Duration,
    /// Bound on the first-load wait.
    pub load_timeout: Duration,
    /// Fail the open when the first load does not finish in time.
    pub strict_load: bool,
    /// Trace every protocol frame.
    pub log_protocol: bool,
    /// Trace IPC traffic.
    pub log_ipc: bool,
}

impl WindowOptions {
    /// Options for `url` with default settings.
    pub fn new(url: impl Into<String>) -> Self {
        Self::from_settings(url, &GluonSettings::default())
    }

    /// Options for `url` taken from loaded settings.
    pub fn from_settings(url: impl Into<String>, settings: &GluonSettings) -> Self {
        let channel = &settings.channel;
        Self {
            url: url.into(),
            browser_name: None,
            engine: None,
            navigation: settings.navigation.policy,
            discovery_host: channel.discovery_host.clone(),
            discovery: RetryPolicy::fixed(channel.discovery_retry())
                .with_max_attempts(channel.discovery_max_attempts),
            acquire_retry: channel.acquire_retry(),
            load_timeout: channel.load_timeout(),
            strict_load: false,
            log_protocol: channel.log_protocol,
            log_ipc: channel.log_ipc,
        }
    }
}

struct WindowInner {
    url: String,
    client: ProtocolClient,
    cdp: SessionClient,
    ipc: IpcBridge,
    versions: Versions,
    closed: AtomicBool,
    close_handlers: Mutex<Vec<CloseHandler>>,
}

/// Handle on an open window. Clones share the same window.
#[derive(Clone)]
pub struct Window {
    inner: Arc<WindowInner>,
}

impl std::fmt::Debug for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Window")
            .field("url", &self.inner.url)
            .field("session", &self.inner.cdp.session_id())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Window {
    /// Open a window over a browser's NUL-delimited debugging pipe.
    pub async fn connect_pipe<R, W>(reader: R, writer: W, options: WindowOptions) -> Result<Self>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (transport, incoming) = PipeTransport::spawn(reader, writer);
        let client = ProtocolClient::with_options(
            transport,
            incoming,
            ClientOptions {
                log_frames: options.log_protocol,
            },
        );
        Self::open(client, options).await
    }

    /// Open a window over the debugging WebSocket advertised on `port`.
    pub async fn connect_websocket(port: u16, options: WindowOptions) -> Result<Self> {
        let (transport, incoming) = WebSocketTransport::discover_and_connect(
            &options.discovery_host,
            port,
            options.discovery,
        )
        .await?;
        let client = ProtocolClient::with_options(
            transport,
            incoming,
            ClientOptions {
                log_frames: options.log_protocol,
            },
        );
        Self::open(client, options).await
    }

    /// Run the open handshake on an established channel.
    ///
    /// On failure the channel is closed before the error is returned.
    #[instrument(skip_all, fields(url = %options.url))]
    pub async fn open(client: ProtocolClient, options: WindowOptions) -> Result<Self> {
        match Self::establish(client.clone(), options).await {
            Ok(window) => Ok(window),
            Err(e) => {
                warn!(error = %e, "window open failed");
                client.close().await;
                Err(e)
            }
        }
    }

    async fn establish(client: ProtocolClient, options: WindowOptions) -> Result<Self> {
        let frame_stopped = client.events(events::FRAME_STOPPED_LOADING);
        let load_fired = client.events(events::LOAD_EVENT_FIRED);
        drop(NavigationGuard::new(options.url.clone(), options.navigation).install(&client));

        let info: BrowserVersion = client
            .call_as(methods::BROWSER_GET_VERSION, json!({}), None)
            .await?;
        let engine = options
            .engine
            .unwrap_or_else(|| BrowserEngine::from_product(&info.product));
        let browser_name = options.browser_name.clone().unwrap_or_else(|| {
            info.product
                .split('/')
                .next()
                .unwrap_or_default()
                .to_string()
        });
        let versions = Versions::from_browser(&browser_name, engine, &info);
        debug!(product = %info.product, js = %info.js_version, "browser version");

        let session = SessionManager::new(client.clone())
            .with_interval(options.acquire_retry)
            .acquire(|target| target.url != BLANK_PAGE)
            .await?;
        let cdp = SessionClient::new(client.clone(), session);
        let _ = cdp.send(methods::RUNTIME_ENABLE, json!({})).await?;
        let _ = cdp.send(methods::PAGE_ENABLE, json!({})).await?;

        wait_for_first_load(frame_stopped, load_fired, options.load_timeout, options.strict_load)
            .await?;

        let ipc = IpcBridge::start(
            Arc::new(cdp.clone()),
            &versions.page_object(),
            &client.closed_token(),
            BridgeOptions {
                log_ipc: options.log_ipc,
            },
        )
        .await?;

        let window = Self {
            inner: Arc::new(WindowInner {
                url: options.url,
                client,
                cdp,
                ipc,
                versions,
                closed: AtomicBool::new(false),
                close_handlers: Mutex::new(Vec::new()),
            }),
        };
        window.close_when_channel_drops();
        info!(session_id = %window.inner.cdp.session_id(), "window open");
        Ok(window)
    }

    fn close_when_channel_drops(&self) {
        let token = self.inner.client.closed_token();
        let weak = Arc::downgrade(&self.inner);
        drop(tokio::spawn(async move {
            token.cancelled().await;
            if let Some(inner) = weak.upgrade() {
                let _ = Window { inner }.close().await;
            }
        }));
    }

    /// URL the window was opened for.
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Protocol handle scoped to the app page's session.
    pub fn cdp(&self) -> &SessionClient {
        &self.inner.cdp
    }

    /// The IPC bridge into the page.
    pub fn ipc(&self) -> &IpcBridge {
        &self.inner.ipc
    }

    /// Versions of the browser behind this window.
    pub fn versions(&self) -> &Versions {
        &self.inner.versions
    }

    /// Evaluate `expression` in the page, awaiting a returned promise.
    pub async fn evaluate(&self, expression: &str) -> Result<Value> {
        Ok(self.inner.cdp.evaluate(expression, true).await?)
    }

    /// Run `handler` once when the window closes.
    ///
    /// A handler registered after close never runs.
    pub fn on_close(&self, handler: impl FnOnce() + Send + 'static) {
        if self.is_closed() {
            return;
        }
        self.inner.close_handlers.lock().push(Box::new(handler));
    }

    /// Close the window.
    ///
    /// Runs the close handlers, stops the IPC bridge, asks the browser to
    /// exit, then closes the channel. Returns `false` if the window was
    /// already closed.
    pub async fn close(&self) -> bool {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        info!(url = %self.inner.url, "closing window");

        let handlers = std::mem::take(&mut *self.inner.close_handlers.lock());
        for handler in handlers {
            if std::panic::catch_unwind(AssertUnwindSafe(handler)).is_err() {
                warn!("close handler panicked");
            }
        }

        self.inner.ipc.close();

        let client = &self.inner.client;
        if !client.is_closed() {
            let exit = client.call(methods::BROWSER_CLOSE, json!({}), None);
            match tokio::time::timeout(BROWSER_CLOSE_GRACE, exit).await {
                Ok(Ok(_)) => debug!("browser acknowledged close"),
                Ok(Err(e)) if e.is_closed() => {}
                Ok(Err(e)) => warn!(error = %e, "Browser.close failed"),
                Err(_) => debug!("browser did not acknowledge close"),
            }
        }
        client.close().await;
        true
    }

    /// Whether the window has closed, by [`close`](Self::close) or because
    /// the channel went away.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst) || self.inner.client.is_closed()
    }
}

async fn wait_for_first_load(
    mut frame_stopped: EventStream,
    mut load_fired: EventStream,
    timeout: Duration,
    strict: bool,
) -> Result<()> {
    let loaded = async {
        let _ = tokio::join!(frame_stopped.recv(), load_fired.recv());
    };
    if tokio::time::timeout(timeout, loaded).await.is_ok() {
        debug!("first load finished");
        return Ok(());
    }
    if strict {
        return Err(GluonError::LoadTimeout(timeout));
    }
    warn!(timeout_ms = timeout.as_millis() as u64, "first load did not finish in time");
    Ok(())
}
