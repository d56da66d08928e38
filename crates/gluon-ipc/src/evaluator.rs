//! The one primitive the bridge needs from the page: evaluate an expression.

use async_trait::async_trait;
use gluon_cdp::{CdpError, SessionClient};
use serde_json::Value;

/// Something that can run script in the page and register init scripts.
#[async_trait]
pub trait PageEvaluator: Send + Sync + 'static {
    /// Evaluate `expression`, optionally awaiting a returned promise, and
    /// return the result by value.
    async fn evaluate(&self, expression: &str, await_promise: bool) -> Result<Value, CdpError>;

    /// Run `source` at the start of every future document.
    async fn add_init_script(&self, source: &str) -> Result<(), CdpError>;
}

#[async_trait]
impl PageEvaluator for SessionClient {
    async fn evaluate(&self, expression: &str, await_promise: bool) -> Result<Value, CdpError> {
        SessionClient::evaluate(self, expression, await_promise).await
    }

    async fn add_init_script(&self, source: &str) -> Result<(), CdpError> {
        self.add_script_on_new_document(source).await
    }
}
