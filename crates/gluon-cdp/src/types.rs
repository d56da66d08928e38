//! Wire types: frames, targets, navigation history, method and event names.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol methods the channel issues.
pub mod methods {
    /// List attachable targets.
    pub const GET_TARGETS: &str = "Target.getTargets";
    /// Attach to a target, yielding a session.
    pub const ATTACH_TO_TARGET: &str = "Target.attachToTarget";
    /// Enable runtime (evaluation) domain.
    pub const RUNTIME_ENABLE: &str = "Runtime.enable";
    /// Enable page lifecycle events.
    pub const PAGE_ENABLE: &str = "Page.enable";
    /// Evaluate an expression in the page.
    pub const EVALUATE: &str = "Runtime.evaluate";
    /// Register a script to run in every new document.
    pub const ADD_SCRIPT_ON_NEW_DOCUMENT: &str = "Page.addScriptToEvaluateOnNewDocument";
    /// Navigate a frame.
    pub const NAVIGATE: &str = "Page.navigate";
    /// Abort the current load.
    pub const STOP_LOADING: &str = "Page.stopLoading";
    /// Fetch the navigation history list.
    pub const GET_NAVIGATION_HISTORY: &str = "Page.getNavigationHistory";
    /// Browser product and engine versions.
    pub const BROWSER_GET_VERSION: &str = "Browser.getVersion";
    /// Close the browser process.
    pub const BROWSER_CLOSE: &str = "Browser.close";
}

/// Events the channel consumes.
pub mod events {
    /// A frame committed a navigation.
    pub const FRAME_NAVIGATED: &str = "Page.frameNavigated";
    /// A frame is about to navigate.
    pub const FRAME_SCHEDULED_NAVIGATION: &str = "Page.frameScheduledNavigation";
    /// A frame finished loading.
    pub const FRAME_STOPPED_LOADING: &str = "Page.frameStoppedLoading";
    /// The page `load` event fired.
    pub const LOAD_EVENT_FIRED: &str = "Page.loadEventFired";
}

/// Placeholder page the browser shows before real content.
pub const BLANK_PAGE: &str = "about:blank";

/// One decoded protocol message: request, reply or event.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    /// Request id; present on requests and their replies only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// Method name; present on requests and events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Request or event payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Successful reply payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failed reply payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ProtocolError>,
    /// Session scope.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl Frame {
    /// Build a request frame. `Null` params are sent as an empty object.
    pub fn request(id: u64, method: &str, params: Value, session_id: Option<&str>) -> Self {
        let params = if params.is_null() {
            Value::Object(serde_json::Map::new())
        } else {
            params
        };
        Self {
            id: Some(id),
            method: Some(method.to_string()),
            params: Some(params),
            session_id: session_id.map(str::to_string),
            ..Self::default()
        }
    }

    /// Build an event frame.
    pub fn event(method: &str, params: Value, session_id: Option<&str>) -> Self {
        Self {
            method: Some(method.to_string()),
            params: Some(params),
            session_id: session_id.map(str::to_string),
            ..Self::default()
        }
    }

    /// Method name, or `""` for replies.
    pub fn method(&self) -> &str {
        self.method.as_deref().unwrap_or_default()
    }

    /// Look up a params field, returning `Null` when absent.
    pub fn param(&self, key: &str) -> &Value {
        self.params
            .as_ref()
            .and_then(|p| p.get(key))
            .unwrap_or(&Value::Null)
    }
}

/// Error object carried by a failed reply.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtocolError {
    /// Peer error code.
    #[serde(default)]
    pub code: i64,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
    /// Optional extra detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// An attachable surface exposed by the browser.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
    /// Target identifier.
    pub target_id: String,
    /// Target kind (`page`, `iframe`, `service_worker`, ...).
    #[serde(rename = "type")]
    pub target_type: String,
    /// Document title.
    #[serde(default)]
    pub title: String,
    /// Current URL.
    #[serde(default)]
    pub url: String,
    /// Whether a client is already attached.
    #[serde(default)]
    pub attached: bool,
}

impl TargetInfo {
    /// Whether this target is a top-level page.
    pub fn is_page(&self) -> bool {
        self.target_type == "page"
    }
}

/// Reply to `Target.getTargets`.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TargetList {
    #[serde(default)]
    pub target_infos: Vec<TargetInfo>,
}

/// One entry of the navigation history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationEntry {
    /// Entry id.
    #[serde(default)]
    pub id: i64,
    /// Entry URL.
    pub url: String,
    /// Entry title.
    #[serde(default)]
    pub title: String,
}

/// Reply to `Page.getNavigationHistory`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationHistory {
    /// Index of the current entry in `entries`.
    pub current_index: usize,
    /// History entries, oldest first.
    pub entries: Vec<NavigationEntry>,
}

impl NavigationHistory {
    /// The entry just before the current one, if any.
    pub fn previous(&self) -> Option<&NavigationEntry> {
        self.current_index
            .checked_sub(1)
            .and_then(|i| self.entries.get(i))
    }
}

/// Reply to `Browser.getVersion`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserVersion {
    /// `Name/version`, e.g. `Chrome/121.0.6167.85`.
    #[serde(default)]
    pub product: String,
    /// JavaScript engine version.
    #[serde(default)]
    pub js_version: String,
    /// Protocol version.
    #[serde(default)]
    pub protocol_version: String,
    /// Browser user agent.
    #[serde(default)]
    pub user_agent: String,
}
