//! Bridge message envelope.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Sent by the page when it has nothing to reply.
pub const PONG: &str = "pong";
/// Sent in answer to a message, carrying the first listener result.
pub const REPLY: &str = "reply";
/// Page asks for the current store snapshot.
pub const WEB_STORE_SYNC: &str = "web store sync";
/// Page-side store write `{key, value}`.
pub const WEB_STORE_WRITE: &str = "web store write";
/// Host-side store write `{key, value}`.
pub const BACKEND_STORE_WRITE: &str = "backend store write";

const EXPOSED_PREFIX: &str = "exposed ";

/// Message `type` used for an exposed function name.
pub fn exposed_type(name: &str) -> String {
    format!("{EXPOSED_PREFIX}{name}")
}

/// One bridge message in either direction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IpcMessage {
    /// Correlation id; replies reuse the id of the message they answer.
    #[serde(deserialize_with = "id_from_any")]
    pub id: String,
    /// Message type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Payload.
    #[serde(default)]
    pub data: Value,
}

impl IpcMessage {
    /// Whether this is an acknowledgement rather than a request.
    pub fn is_answer(&self) -> bool {
        self.kind == PONG || self.kind == REPLY
    }
}

fn id_from_any<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(de)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Fresh random correlation id.
pub(crate) fn new_id() -> String {
    rand::random::<u64>().to_string()
}
