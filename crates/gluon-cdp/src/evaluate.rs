//! Page-side evaluation helpers.

use serde_json::{Value, json};

use crate::error::{CdpError, Result};
use crate::session::SessionClient;
use crate::types::methods;

impl SessionClient {
    /// Evaluate `expression` in the page and return its value by value.
    ///
    /// With `await_promise` the reply waits for a returned promise to settle.
    /// A thrown exception becomes [`CdpError::Evaluate`].
    pub async fn evaluate(&self, expression: &str, await_promise: bool) -> Result<Value> {
        let reply = self
            .send(
                methods::EVALUATE,
                json!({
                    "expression": expression,
                    "awaitPromise": await_promise,
                    "returnByValue": true,
                }),
            )
            .await?;
        evaluation_outcome(reply)
    }

    /// Register `source` to run at the start of every new document.
    pub async fn add_script_on_new_document(&self, source: &str) -> Result<()> {
        let _ = self
            .send(methods::ADD_SCRIPT_ON_NEW_DOCUMENT, json!({"source": source}))
            .await?;
        Ok(())
    }
}

fn evaluation_outcome(mut reply: Value) -> Result<Value> {
    if let Some(details) = reply.get("exceptionDetails") {
        return Err(exception_error(details));
    }
    Ok(reply
        .get_mut("result")
        .and_then(|r| r.get_mut("value"))
        .map(Value::take)
        .unwrap_or(Value::Null))
}

fn exception_error(details: &Value) -> CdpError {
    let exception = &details["exception"];
    let class_name = exception["className"]
        .as_str()
        .unwrap_or("Error")
        .to_string();
    // Descriptions look like "TypeError: x is not a function\n    at <anonymous>:1:1".
    let message = exception["description"]
        .as_str()
        .and_then(|d| d.lines().next())
        .and_then(|line| line.split_once(':'))
        .map(|(_, rest)| rest.trim().to_string())
        .or_else(|| details["text"].as_str().map(str::to_string))
        .unwrap_or_else(|| "evaluation failed".to_string());
    CdpError::Evaluate {
        class_name,
        message,
    }
}
