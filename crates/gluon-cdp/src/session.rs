//! Target acquisition and session-scoped commands.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, instrument};

use crate::client::{ProtocolClient, SubscriptionHandle};
use crate::error::{CdpError, Result};
use crate::retry::{RetryPolicy, poll_with_backoff};
use crate::types::{Frame, TargetInfo, TargetList, methods};

/// Identifier of an attached session.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap a raw id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as `&str`.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An attached target.
#[derive(Clone, Debug, PartialEq)]
pub struct Session {
    /// Session id used to scope commands.
    pub id: SessionId,
    /// The target at the time it was attached.
    pub target: TargetInfo,
}

/// Polls the browser for a page target and attaches to it.
#[derive(Clone, Debug)]
pub struct SessionManager {
    client: ProtocolClient,
    policy: RetryPolicy,
}

impl SessionManager {
    /// Manager polling every 200ms until a target appears.
    pub fn new(client: ProtocolClient) -> Self {
        Self {
            client,
            policy: RetryPolicy::default(),
        }
    }

    /// Override the polling interval.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.policy.interval = interval;
        self
    }

    /// Override the full retry policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Find the first `page` target accepted by `predicate` and attach to it.
    ///
    /// Re-polls `Target.getTargets` until one appears. Attaches with
    /// `flatten: true` so session-scoped commands share this connection.
    /// Protocol errors and channel closure end the wait.
    #[instrument(skip_all)]
    pub async fn acquire<P>(&self, predicate: P) -> Result<Session>
    where
        P: Fn(&TargetInfo) -> bool,
    {
        let client = &self.client;
        let predicate = &predicate;
        let target = poll_with_backoff(self.policy, |attempt| async move {
            let list: TargetList = client.call_as(methods::GET_TARGETS, json!({}), None).await?;
            let found = list
                .target_infos
                .into_iter()
                .find(|t| t.is_page() && predicate(t));
            if found.is_none() {
                debug!(attempt, "no matching page target yet");
            }
            Ok::<_, CdpError>(found)
        })
        .await?
        .ok_or_else(|| CdpError::unexpected(methods::GET_TARGETS, "no matching target"))?;

        let reply = client
            .call(
                methods::ATTACH_TO_TARGET,
                json!({"targetId": target.target_id, "flatten": true}),
                None,
            )
            .await?;
        let id = reply
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| CdpError::unexpected(methods::ATTACH_TO_TARGET, "missing sessionId"))?;

        info!(target_id = %target.target_id, session_id = %id, url = %target.url, "attached to target");
        Ok(Session {
            id: SessionId::new(id),
            target,
        })
    }
}

/// A [`ProtocolClient`] bound to one session.
#[derive(Clone, Debug)]
pub struct SessionClient {
    client: ProtocolClient,
    session: Arc<Session>,
}

impl SessionClient {
    /// Bind `client` to `session`.
    pub fn new(client: ProtocolClient, session: Session) -> Self {
        Self {
            client,
            session: Arc::new(session),
        }
    }

    /// Send a command scoped to this session.
    pub async fn send(&self, method: &str, params: Value) -> Result<Value> {
        self.client
            .call(method, params, Some(self.session.id.as_str()))
            .await
    }

    /// Send a browser-level command (no session scope).
    pub async fn send_unscoped(&self, method: &str, params: Value) -> Result<Value> {
        self.client.call(method, params, None).await
    }

    /// Subscribe to an event method on the underlying channel.
    pub fn on(
        &self,
        method: &str,
        handler: impl Fn(&Frame) + Send + Sync + 'static,
        once: bool,
    ) -> SubscriptionHandle {
        self.client.subscribe(method, handler, once)
    }

    /// The attached session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The attached session's id.
    pub fn session_id(&self) -> &SessionId {
        &self.session.id
    }

    /// The underlying channel.
    pub fn client(&self) -> &ProtocolClient {
        &self.client
    }
}
