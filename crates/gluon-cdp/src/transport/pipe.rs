//! NUL-delimited byte pipe transport.
//!
//! Each message is a UTF-8 JSON document followed by a single `0x00`. Reads
//! may split a message across chunks or carry several messages at once; the
//! codec buffers until a terminator is seen and carries the trailing partial
//! fragment forward.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex, mpsc};
use tokio_util::codec::{Decoder, Encoder, FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{Incoming, Transport};
use crate::error::{CdpError, Result};

const DELIMITER: u8 = 0;

/// Codec splitting a byte stream on NUL terminators.
#[derive(Clone, Copy, Debug, Default)]
pub struct NulDelimitedCodec {
    /// Bytes already scanned without finding a terminator.
    next_index: usize,
}

impl Decoder for NulDelimitedCodec {
    type Item = Bytes;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> io::Result<Option<Bytes>> {
        let Some(offset) = buf[self.next_index..].iter().position(|b| *b == DELIMITER) else {
            self.next_index = buf.len();
            return Ok(None);
        };
        let end = self.next_index + offset;
        self.next_index = 0;
        let message = buf.split_to(end).freeze();
        buf.advance(1);
        Ok(Some(message))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> io::Result<Option<Bytes>> {
        if let Some(message) = self.decode(buf)? {
            return Ok(Some(message));
        }
        if !buf.is_empty() {
            debug!(bytes = buf.len(), "discarding unterminated trailing fragment");
            buf.clear();
            self.next_index = 0;
        }
        Ok(None)
    }
}

impl Encoder<String> for NulDelimitedCodec {
    type Error = io::Error;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> io::Result<()> {
        if item.as_bytes().contains(&DELIMITER) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "message contains a NUL byte",
            ));
        }
        dst.reserve(item.len() + 1);
        dst.put_slice(item.as_bytes());
        dst.put_u8(DELIMITER);
        Ok(())
    }
}

/// Transport over a pair of pipe handles (e.g. the browser's fd 3/4).
pub struct PipeTransport<W> {
    writer: Mutex<FramedWrite<W, NulDelimitedCodec>>,
    closed: AtomicBool,
    shutdown: CancellationToken,
}

impl<W> PipeTransport<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Start reading from `reader` and return the transport plus its
    /// incoming message stream. Must be called inside a tokio runtime.
    pub fn spawn<R>(reader: R, writer: W) -> (Arc<Self>, Incoming)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let transport = Arc::new(Self {
            writer: Mutex::new(FramedWrite::new(writer, NulDelimitedCodec::default())),
            closed: AtomicBool::new(false),
            shutdown: shutdown.clone(),
        });
        drop(tokio::spawn(read_loop(reader, tx, shutdown)));
        (transport, rx)
    }
}

async fn read_loop<R>(reader: R, tx: mpsc::UnboundedSender<String>, shutdown: CancellationToken)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut frames = FramedRead::new(reader, NulDelimitedCodec::default());
    loop {
        let next = tokio::select! {
            () = shutdown.cancelled() => break,
            next = frames.next() => next,
        };
        match next {
            Some(Ok(bytes)) => match String::from_utf8(bytes.to_vec()) {
                Ok(message) => {
                    if tx.send(message).is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "dropping non UTF-8 pipe message"),
            },
            Some(Err(e)) => {
                warn!(error = %e, "pipe read failed");
                break;
            }
            None => {
                debug!("pipe reached EOF");
                break;
            }
        }
    }
}

#[async_trait]
impl<W> Transport for PipeTransport<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&self, raw: String) -> Result<()> {
        if self.is_closed() {
            return Err(CdpError::ChannelClosed);
        }
        let mut writer = self.writer.lock().await;
        writer
            .send(raw)
            .await
            .map_err(|e| CdpError::Transport(e.to_string()))
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown.cancel();
        if let Err(e) = self.writer.lock().await.close().await {
            debug!(error = %e, "pipe writer close failed");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn decode_chunks(chunks: &[&[u8]]) -> Vec<Bytes> {
        let mut codec = NulDelimitedCodec::default();
        let mut buf = BytesMut::new();
        let mut out = Vec::new();
        for chunk in chunks {
            buf.extend_from_slice(chunk);
            while let Some(msg) = codec.decode(&mut buf).unwrap() {
                out.push(msg);
            }
        }
        out
    }

    #[test]
    fn single_message() {
        let out = decode_chunks(&[b"{\"id\":1}\0"]);
        assert_eq!(out, vec![Bytes::from_static(b"{\"id\":1}")]);
    }

    #[test]
    fn no_dispatch_before_terminator() {
        let out = decode_chunks(&[b"{\"id\":1", b"}"]);
        assert!(out.is_empty());
    }

    #[test]
    fn two_messages_in_one_chunk_keep_order() {
        let out = decode_chunks(&[b"{\"id\":1}\0{\"id\":2}\0"]);
        assert_eq!(
            out,
            vec![Bytes::from_static(b"{\"id\":1}"), Bytes::from_static(b"{\"id\":2}")]
        );
    }

    #[test]
    fn trailing_fragment_carries_forward() {
        let out = decode_chunks(&[b"{\"a\":1}\0{\"b\"", b":2}\0"]);
        assert_eq!(
            out,
            vec![Bytes::from_static(b"{\"a\":1}"), Bytes::from_static(b"{\"b\":2}")]
        );
    }

    #[test]
    fn eof_discards_partial_fragment() {
        let mut codec = NulDelimitedCodec::default();
        let mut buf = BytesMut::from(&b"{\"half\":"[..]);
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn encoder_appends_terminator() {
        let mut codec = NulDelimitedCodec::default();
        let mut dst = BytesMut::new();
        codec.encode("{}".to_string(), &mut dst).unwrap();
        assert_eq!(&dst[..], b"{}\0");
    }

    #[test]
    fn encoder_rejects_embedded_nul() {
        let mut codec = NulDelimitedCodec::default();
        let mut dst = BytesMut::new();
        let err = codec.encode("a\0b".to_string(), &mut dst).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(dst.is_empty());
    }

    proptest! {
        #[test]
        fn arbitrary_split_yields_identical_message(
            body in "[^\\x00]{0,200}",
            cuts in proptest::collection::vec(any::<prop::sample::Index>(), 0..8),
        ) {
            let mut encoded = body.clone().into_bytes();
            encoded.push(0);

            let mut points: Vec<usize> = cuts.iter().map(|c| c.index(encoded.len() + 1)).collect();
            points.sort_unstable();
            points.dedup();

            let mut chunks: Vec<&[u8]> = Vec::new();
            let mut start = 0;
            for p in points {
                chunks.push(&encoded[start..p]);
                start = p;
            }
            chunks.push(&encoded[start..]);

            let out = decode_chunks(&chunks);
            prop_assert_eq!(out.len(), 1);
            prop_assert_eq!(&out[0][..], body.as_bytes());
        }
    }

    #[tokio::test]
    async fn transport_reads_split_writes() {
        let (peer_side, our_read) = tokio::io::duplex(64);
        let (our_write, _sink) = tokio::io::duplex(64);
        let (_transport, mut incoming) = PipeTransport::spawn(our_read, our_write);

        let mut peer_side = peer_side;
        peer_side.write_all(b"{\"method\":\"A\"}\0{\"met").await.unwrap();
        peer_side.write_all(b"hod\":\"B\"}\0").await.unwrap();

        assert_eq!(incoming.recv().await.unwrap(), r#"{"method":"A"}"#);
        assert_eq!(incoming.recv().await.unwrap(), r#"{"method":"B"}"#);
    }

    #[tokio::test]
    async fn transport_writes_terminated_messages() {
        let (_unused, our_read) = tokio::io::duplex(64);
        let (our_write, mut peer_read) = tokio::io::duplex(64);
        let (transport, _incoming) = PipeTransport::spawn(our_read, our_write);

        transport.send(r#"{"id":1}"#.to_string()).await.unwrap();
        let mut buf = [0u8; 9];
        peer_read.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"{\"id\":1}\0");
    }

    #[tokio::test]
    async fn send_after_close_fails_fast() {
        let (_a, our_read) = tokio::io::duplex(64);
        let (our_write, _b) = tokio::io::duplex(64);
        let (transport, mut incoming) = PipeTransport::spawn(our_read, our_write);

        transport.close().await;
        transport.close().await;
        assert!(transport.is_closed());
        assert!(matches!(
            transport.send("{}".into()).await,
            Err(CdpError::ChannelClosed)
        ));
        assert!(incoming.recv().await.is_none());
    }

    #[tokio::test]
    async fn incoming_ends_on_peer_eof() {
        let (peer_side, our_read) = tokio::io::duplex(64);
        let (our_write, _b) = tokio::io::duplex(64);
        let (_transport, mut incoming) = PipeTransport::spawn(our_read, our_write);
        drop(peer_side);
        assert!(incoming.recv().await.is_none());
    }
}
