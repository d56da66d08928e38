#![allow(missing_docs)]

use std::time::Duration;

use gluon_cdp::{CdpError, Frame, PipeTransport, ProtocolClient};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

/// Read NUL-terminated frames written by the client.
async fn read_frame(stream: &mut DuplexStream, buf: &mut Vec<u8>) -> Frame {
    loop {
        if let Some(pos) = buf.iter().position(|b| *b == 0) {
            let raw: Vec<u8> = buf.drain(..=pos).collect();
            return serde_json::from_slice(&raw[..raw.len() - 1]).unwrap();
        }
        let mut chunk = [0u8; 256];
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "client closed the pipe");
        buf.extend_from_slice(&chunk[..n]);
    }
}

#[tokio::test]
async fn replies_resolve_out_of_order_over_a_pipe() {
    let (mut browser_out, our_in) = tokio::io::duplex(1024);
    let (our_out, mut browser_in) = tokio::io::duplex(1024);
    let (transport, incoming) = PipeTransport::spawn(our_in, our_out);
    let client = ProtocolClient::new(transport, incoming);

    let c1 = client.clone();
    let c2 = client.clone();
    let first = tokio::spawn(async move { c1.call("Browser.getVersion", Value::Null, None).await });
    let mut buf = Vec::new();
    let req1 = read_frame(&mut browser_in, &mut buf).await;
    let second = tokio::spawn(async move { c2.call("Target.getTargets", Value::Null, None).await });
    let req2 = read_frame(&mut browser_in, &mut buf).await;

    let replies = format!(
        "{}\0{}\0",
        json!({"id": req2.id, "result": {"targetInfos": []}}),
        json!({"id": req1.id, "result": {"product": "Chrome/121.0.0.0"}})
    );
    // Split mid-frame to exercise reassembly.
    let (a, b) = replies.as_bytes().split_at(10);
    browser_out.write_all(a).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    browser_out.write_all(b).await.unwrap();

    assert_eq!(second.await.unwrap().unwrap(), json!({"targetInfos": []}));
    assert_eq!(
        first.await.unwrap().unwrap()["product"],
        "Chrome/121.0.0.0"
    );
}

#[tokio::test]
async fn browser_exit_fails_pending_calls() {
    let (browser_out, our_in) = tokio::io::duplex(1024);
    let (our_out, mut browser_in) = tokio::io::duplex(1024);
    let (transport, incoming) = PipeTransport::spawn(our_in, our_out);
    let client = ProtocolClient::new(transport, incoming);

    let c = client.clone();
    let pending = tokio::spawn(async move { c.call("Page.enable", Value::Null, Some("S")).await });
    let mut buf = Vec::new();
    let req = read_frame(&mut browser_in, &mut buf).await;
    assert_eq!(req.session_id.as_deref(), Some("S"));

    drop(browser_out);
    assert!(matches!(pending.await.unwrap(), Err(CdpError::ChannelClosed)));
    client.closed_token().cancelled().await;
    assert!(client.is_closed());
}
