//! Open a window against a scripted browser on the other end of a pipe.

use std::time::Duration;

use gluon::{Window, WindowOptions};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;

const APP: &str = "https://app.example/";

fn answer(request: &Value) -> Option<Value> {
    let result = match request["method"].as_str()? {
        "Browser.getVersion" => json!({"product": "Chrome/121.0.6167.85", "jsVersion": "12.1.285.20"}),
        "Target.getTargets" => json!({"targetInfos": [
            {"targetId": "T1", "type": "page", "url": APP, "title": "App"}
        ]}),
        "Target.attachToTarget" => json!({"sessionId": "S1"}),
        "Runtime.evaluate" if request["params"]["expression"] == "window.Gluon.ipc._get()" => {
            return None;
        }
        "Runtime.evaluate" => json!({"result": {"type": "string", "value": "hello"}}),
        _ => json!({}),
    };
    let mut reply = json!({"id": request["id"], "result": result});
    if let Some(session) = request.get("sessionId") {
        reply["sessionId"] = session.clone();
    }
    Some(reply)
}

/// Reads NUL-terminated requests, answers them, and reports each method.
async fn fake_browser(mut commands: DuplexStream, mut replies: DuplexStream, seen: mpsc::UnboundedSender<String>) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let Ok(n) = commands.read(&mut chunk).await else { return };
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);
        while let Some(end) = buf.iter().position(|b| *b == 0) {
            let raw: Vec<u8> = buf.drain(..=end).collect();
            let request: Value = serde_json::from_slice(&raw[..raw.len() - 1]).unwrap();
            let method = request["method"].as_str().unwrap_or_default().to_string();
            let _ = seen.send(method.clone());

            let mut out = Vec::new();
            if let Some(reply) = answer(&request) {
                out.extend(serde_json::to_vec(&reply).unwrap());
                out.push(0);
            }
            if method == "Page.enable" {
                for event in ["Page.frameStoppedLoading", "Page.loadEventFired"] {
                    let frame = json!({"method": event, "params": {}, "sessionId": "S1"});
                    out.extend(serde_json::to_vec(&frame).unwrap());
                    out.push(0);
                }
            }
            if replies.write_all(&out).await.is_err() {
                return;
            }
        }
    }
}

#[tokio::test]
async fn window_opens_over_pipe_and_closes_browser() {
    let (host_writer, browser_reader) = tokio::io::duplex(4096);
    let (browser_writer, host_reader) = tokio::io::duplex(4096);
    let (seen_tx, mut seen) = mpsc::unbounded_channel();
    let browser = tokio::spawn(fake_browser(browser_reader, browser_writer, seen_tx));

    let window = Window::connect_pipe(host_reader, host_writer, WindowOptions::new(APP))
        .await
        .unwrap();
    assert_eq!(window.versions().product.version, "121.0.6167.85");
    assert_eq!(window.evaluate("'hel' + 'lo'").await.unwrap(), json!("hello"));

    assert!(window.close().await);
    assert!(window.is_closed());

    let mut methods = Vec::new();
    while let Ok(Some(m)) = tokio::time::timeout(Duration::from_millis(200), seen.recv()).await {
        methods.push(m);
    }
    assert_eq!(methods.first().map(String::as_str), Some("Browser.getVersion"));
    assert!(methods.iter().any(|m| m == "Page.addScriptToEvaluateOnNewDocument"));
    assert_eq!(methods.last().map(String::as_str), Some("Browser.close"));

    browser.abort();
}
