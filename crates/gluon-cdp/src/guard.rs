//! Navigation guard.
//!
//! Watches both the pre-commit `frameScheduledNavigation` and the post-commit
//! `frameNavigated` events, since engines differ in which one they fire. A
//! disallowed destination is stopped; a disallowed committed navigation is
//! additionally reverted to the previous history entry when there is one.

use gluon_settings::NavigationPolicy;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::{Origin, Url};

use crate::client::ProtocolClient;
use crate::error::Result;
use crate::types::{BLANK_PAGE, Frame, NavigationHistory, events, methods};

/// What the guard did about one navigation event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardAction {
    /// Destination allowed; nothing sent.
    Allowed,
    /// Pre-commit navigation stopped.
    Stopped,
    /// Committed navigation stopped and the frame sent back to `url`.
    Reverted {
        /// URL restored from history.
        url: String,
    },
    /// Committed navigation stopped, but history had no earlier entry.
    NothingToRevert,
}

/// Policy check plus corrective calls for one channel.
#[derive(Clone, Debug)]
pub struct NavigationGuard {
    origin_url: String,
    origin: Option<Origin>,
    policy: NavigationPolicy,
}

impl NavigationGuard {
    /// Guard pages opened at `origin_url` under `policy`.
    pub fn new(origin_url: impl Into<String>, policy: NavigationPolicy) -> Self {
        let origin_url = origin_url.into();
        let origin = Url::parse(&origin_url).ok().map(|u| u.origin());
        Self {
            origin_url,
            origin,
            policy,
        }
    }

    /// The policy in force.
    pub fn policy(&self) -> NavigationPolicy {
        self.policy
    }

    /// Whether a navigation to `destination` may proceed.
    ///
    /// Unparseable destinations never share an origin.
    pub fn allows(&self, destination: &str) -> bool {
        if destination == BLANK_PAGE {
            return true;
        }
        match self.policy {
            NavigationPolicy::AllowAll => true,
            NavigationPolicy::ExactUrl => destination == self.origin_url,
            NavigationPolicy::SameOrigin => match (&self.origin, Url::parse(destination)) {
                (Some(origin), Ok(dest)) => {
                    let dest = dest.origin();
                    dest.is_tuple() && &dest == origin
                }
                _ => false,
            },
        }
    }

    /// Apply the policy to one navigation event.
    ///
    /// Corrective calls are scoped to the event's session. Frames for other
    /// methods are ignored.
    pub async fn handle(&self, client: &ProtocolClient, frame: &Frame) -> Result<GuardAction> {
        let committed = match frame.method() {
            events::FRAME_NAVIGATED => true,
            events::FRAME_SCHEDULED_NAVIGATION => false,
            _ => return Ok(GuardAction::Allowed),
        };
        let Some(destination) = destination_url(frame) else {
            debug!(method = frame.method(), "navigation event without url");
            return Ok(GuardAction::Allowed);
        };
        if self.allows(destination) {
            return Ok(GuardAction::Allowed);
        }

        let kind = if committed { "committed" } else { "scheduled" };
        metrics::counter!("navigation_blocked_total", "kind" => kind).increment(1);
        info!(
            destination,
            origin = %self.origin_url,
            policy = %self.policy,
            kind,
            "blocking navigation"
        );

        let session = frame.session_id.as_deref();
        let stop = client.call(methods::STOP_LOADING, json!({}), session);
        if !committed {
            if let Err(e) = stop.await {
                warn!(error = %e, "stopLoading failed");
            }
            return Ok(GuardAction::Stopped);
        }

        let history = client.call_as::<NavigationHistory>(methods::GET_NAVIGATION_HISTORY, json!({}), session);
        let (stopped, history) = tokio::join!(stop, history);
        if let Err(e) = stopped {
            warn!(error = %e, "stopLoading failed");
        }
        let history = history?;
        let Some(previous) = history.previous() else {
            warn!(destination, "no earlier history entry to restore");
            return Ok(GuardAction::NothingToRevert);
        };

        let mut params = json!({"url": previous.url});
        let frame_id = &frame.param("frame")["id"];
        if !frame_id.is_null() {
            params["frameId"] = frame_id.clone();
        }
        let _ = client.call(methods::NAVIGATE, params, session).await?;
        Ok(GuardAction::Reverted {
            url: previous.url.clone(),
        })
    }

    /// Subscribe to navigation events on `client` and police them until the
    /// channel closes. The subscription is in place when this returns.
    pub fn install(self, client: &ProtocolClient) -> JoinHandle<()> {
        let mut stream =
            client.events_for(&[events::FRAME_SCHEDULED_NAVIGATION, events::FRAME_NAVIGATED]);
        let client = client.clone();
        tokio::spawn(async move {
            while let Some(frame) = stream.recv().await {
                let guard = self.clone();
                let client = client.clone();
                drop(tokio::spawn(async move {
                    match guard.handle(&client, &frame).await {
                        Ok(action) => debug!(?action, "navigation handled"),
                        Err(e) if e.is_closed() => {}
                        Err(e) => warn!(error = %e, "navigation guard call failed"),
                    }
                }));
            }
            debug!("navigation guard stopped");
        })
    }
}

fn destination_url(frame: &Frame) -> Option<&str> {
    frame.param("frame")["url"]
        .as_str()
        .or_else(|| frame.param("url").as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{Response, mock_client};
    use std::time::Duration;

    const ORIGIN: &str = "https://app.example/";

    fn scheduled(url: &str) -> Frame {
        Frame::event(
            events::FRAME_SCHEDULED_NAVIGATION,
            json!({"frameId": "F1", "reason": "scriptInitiated", "url": url}),
            Some("S1"),
        )
    }

    fn navigated(url: &str) -> Frame {
        Frame::event(
            events::FRAME_NAVIGATED,
            json!({"frame": {"id": "F1", "url": url}}),
            Some("S1"),
        )
    }

    #[test]
    fn same_origin_policy() {
        let guard = NavigationGuard::new(ORIGIN, NavigationPolicy::SameOrigin);
        assert!(guard.allows("https://app.example/page2"));
        assert!(guard.allows("https://app.example:443/x?y#z"));
        assert!(!guard.allows("https://evil.example/"));
        assert!(!guard.allows("http://app.example/"));
        assert!(!guard.allows("data:text/html,hi"));
        assert!(!guard.allows("not a url"));
        assert!(guard.allows(BLANK_PAGE));
    }

    #[test]
    fn exact_url_policy_is_verbatim() {
        let guard = NavigationGuard::new(ORIGIN, NavigationPolicy::ExactUrl);
        assert!(guard.allows(ORIGIN));
        assert!(!guard.allows("https://app.example"));
        assert!(!guard.allows("https://app.example/page2"));
        assert!(guard.allows(BLANK_PAGE));
    }

    #[test]
    fn allow_all_policy() {
        let guard = NavigationGuard::new(ORIGIN, NavigationPolicy::AllowAll);
        assert!(guard.allows("https://evil.example/"));
        assert!(guard.allows("file:///etc/passwd"));
    }

    #[tokio::test]
    async fn allowed_navigation_sends_nothing() {
        let (client, mut peer) = mock_client();
        let guard = NavigationGuard::new(ORIGIN, NavigationPolicy::SameOrigin);
        let action = guard
            .handle(&client, &scheduled("https://app.example/page2"))
            .await
            .unwrap();
        assert_eq!(action, GuardAction::Allowed);
        assert!(peer.try_next_request(Duration::from_millis(20)).await.is_none());
    }

    #[tokio::test]
    async fn scheduled_disallowed_navigation_is_stopped_only() {
        let (client, peer) = mock_client();
        let responder = peer.spawn_responder(|_, _| json!({}).into());
        let guard = NavigationGuard::new(ORIGIN, NavigationPolicy::SameOrigin);

        let action = guard
            .handle(&client, &scheduled("https://evil.example/"))
            .await
            .unwrap();

        assert_eq!(action, GuardAction::Stopped);
        assert_eq!(responder.methods(), vec![methods::STOP_LOADING]);
        assert_eq!(responder.requests()[0].session_id.as_deref(), Some("S1"));
    }

    #[tokio::test]
    async fn committed_disallowed_navigation_is_reverted() {
        let (client, peer) = mock_client();
        let responder = peer.spawn_responder(|frame, _| match frame.method() {
            methods::GET_NAVIGATION_HISTORY => json!({
                "currentIndex": 1,
                "entries": [
                    {"id": 1, "url": ORIGIN, "title": "App"},
                    {"id": 2, "url": "https://evil.example/", "title": "Evil"}
                ]
            })
            .into(),
            _ => json!({}).into(),
        });
        let guard = NavigationGuard::new(ORIGIN, NavigationPolicy::SameOrigin);

        let action = guard
            .handle(&client, &navigated("https://evil.example/"))
            .await
            .unwrap();

        assert_eq!(action, GuardAction::Reverted { url: ORIGIN.into() });
        assert_eq!(
            responder.methods(),
            vec![
                methods::STOP_LOADING,
                methods::GET_NAVIGATION_HISTORY,
                methods::NAVIGATE
            ]
        );
        let navigate = &responder.requests()[2];
        assert_eq!(navigate.params, Some(json!({"url": ORIGIN, "frameId": "F1"})));
    }

    #[tokio::test]
    async fn committed_navigation_without_history_is_not_reverted() {
        let (client, peer) = mock_client();
        let responder = peer.spawn_responder(|frame, _| match frame.method() {
            methods::GET_NAVIGATION_HISTORY => json!({
                "currentIndex": 0,
                "entries": [{"id": 1, "url": "https://evil.example/", "title": ""}]
            })
            .into(),
            _ => json!({}).into(),
        });
        let guard = NavigationGuard::new(ORIGIN, NavigationPolicy::SameOrigin);

        let action = guard
            .handle(&client, &navigated("https://evil.example/"))
            .await
            .unwrap();

        assert_eq!(action, GuardAction::NothingToRevert);
        assert!(!responder.methods().iter().any(|m| m == methods::NAVIGATE));
    }

    #[tokio::test]
    async fn stop_failure_does_not_block_revert() {
        let (client, peer) = mock_client();
        let _responder = peer.spawn_responder(|frame, _| match frame.method() {
            methods::STOP_LOADING => Response::Err {
                code: -32000,
                message: "nothing to stop".into(),
            },
            methods::GET_NAVIGATION_HISTORY => json!({
                "currentIndex": 1,
                "entries": [{"url": ORIGIN}, {"url": "https://evil.example/"}]
            })
            .into(),
            _ => json!({}).into(),
        });
        let guard = NavigationGuard::new(ORIGIN, NavigationPolicy::SameOrigin);
        let action = guard
            .handle(&client, &navigated("https://evil.example/"))
            .await
            .unwrap();
        assert_eq!(action, GuardAction::Reverted { url: ORIGIN.into() });
    }

    #[tokio::test]
    async fn installed_guard_reacts_to_events() {
        let (client, peer) = mock_client();
        let responder = peer.spawn_responder(|_, _| json!({}).into());
        let task = NavigationGuard::new(ORIGIN, NavigationPolicy::ExactUrl).install(&client);

        responder.handle().send_frame(&scheduled("https://app.example/other"));
        let stop = responder
            .wait_for(methods::STOP_LOADING, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(stop.session_id.as_deref(), Some("S1"));

        client.close().await;
        task.await.unwrap();
    }
}
