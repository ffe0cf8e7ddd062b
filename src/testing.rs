//! Reusable test utilities for exercising the push actor without a real socket.
//!
//! [`MockTransport`] hands every successful `connect` to the paired [`MockListener`] as a
//! [`MockServer`], so tests can play the server side of each connection epoch: push frames,
//! inspect what the client wrote, and drop or close the socket.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures_util::Sink;
use tokio::sync::mpsc;

use crate::core::{
    Envelope, PushError, WebSocketBufferConfig, WsCloseFrame, WsFrame, WsTlsConfig,
};
use crate::transport::{WsTransport, WsTransportConnectFuture};

struct MockShared {
    accepted_tx: mpsc::UnboundedSender<MockServer>,
    scripted_failures: Mutex<VecDeque<String>>,
    attempts: AtomicU32,
    last_url: Mutex<Option<String>>,
}

/// A transport backed by in-memory channels.
#[derive(Clone)]
pub struct MockTransport {
    shared: Arc<MockShared>,
}

impl MockTransport {
    /// Build a transport and the listener that receives its connections.
    pub fn new() -> (Self, MockListener) {
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
        (
            Self {
                shared: Arc::new(MockShared {
                    accepted_tx,
                    scripted_failures: Mutex::new(VecDeque::new()),
                    attempts: AtomicU32::new(0),
                    last_url: Mutex::new(None),
                }),
            },
            MockListener { accepted_rx },
        )
    }

    /// Make the next `count` connect attempts fail with a handshake error.
    pub fn fail_next_connects(&self, count: usize) {
        let mut failures = self
            .shared
            .scripted_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        failures.extend((0..count).map(|_| "scripted handshake failure".to_string()));
    }

    /// Total connect attempts, successful or not.
    pub fn connect_attempts(&self) -> u32 {
        self.shared.attempts.load(Ordering::Acquire)
    }

    /// URL passed to the most recent connect attempt.
    pub fn last_url(&self) -> Option<String> {
        self.shared
            .last_url
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl WsTransport for MockTransport {
    type Reader = MockReader;
    type Writer = MockWriter;

    fn connect(
        &self,
        url: String,
        _buffers: WebSocketBufferConfig,
        _tls: WsTlsConfig,
    ) -> WsTransportConnectFuture<Self::Reader, Self::Writer> {
        let shared = Arc::clone(&self.shared);
        Box::pin(async move {
            shared.attempts.fetch_add(1, Ordering::AcqRel);
            *shared.last_url.lock().unwrap_or_else(PoisonError::into_inner) = Some(url);

            let scripted = shared
                .scripted_failures
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            if let Some(error) = scripted {
                return Err(PushError::ConnectionFailed(error));
            }

            let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
            let (writer, outbound_rx) = MockWriter::channel();
            let server = MockServer {
                outbound_rx,
                inbound_tx: Some(inbound_tx),
            };
            shared
                .accepted_tx
                .send(server)
                .map_err(|_| PushError::ConnectionFailed("mock listener closed".to_string()))?;
            Ok((MockReader { rx: inbound_rx }, writer))
        })
    }
}

/// Receives the server side of every connection opened through a [`MockTransport`].
pub struct MockListener {
    accepted_rx: mpsc::UnboundedReceiver<MockServer>,
}

impl MockListener {
    pub async fn accept(&mut self) -> Option<MockServer> {
        self.accepted_rx.recv().await
    }

    pub async fn accept_timeout(&mut self, timeout: Duration) -> Option<MockServer> {
        tokio::time::timeout(timeout, self.accepted_rx.recv())
            .await
            .unwrap_or_default()
    }

    /// Connections accepted but not yet taken by the test.
    pub fn try_accept(&mut self) -> Option<MockServer> {
        self.accepted_rx.try_recv().ok()
    }
}

/// Error surface for operations on [`MockServer`].
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum MockServerError {
    /// The inbound socket side was intentionally dropped.
    SocketDropped,
    /// The client side is no longer reading.
    ChannelClosed,
}

impl std::fmt::Display for MockServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MockServerError::SocketDropped => f.write_str("mock socket already dropped"),
            MockServerError::ChannelClosed => f.write_str("mock client reader is closed"),
        }
    }
}

impl std::error::Error for MockServerError {}

/// Server side of one mock connection.
pub struct MockServer {
    outbound_rx: mpsc::UnboundedReceiver<WsFrame>,
    inbound_tx: Option<mpsc::UnboundedSender<Result<WsFrame, PushError>>>,
}

impl MockServer {
    /// Receive a frame written by the client.
    pub async fn recv_outbound(&mut self) -> Option<WsFrame> {
        self.outbound_rx.recv().await
    }

    pub async fn recv_outbound_timeout(&mut self, timeout: Duration) -> Option<WsFrame> {
        tokio::time::timeout(timeout, self.outbound_rx.recv())
            .await
            .unwrap_or_default()
    }

    fn push(&self, item: Result<WsFrame, PushError>) -> Result<(), MockServerError> {
        let Some(tx) = self.inbound_tx.as_ref() else {
            return Err(MockServerError::SocketDropped);
        };
        tx.send(item).map_err(|_| MockServerError::ChannelClosed)
    }

    pub fn send_inbound(&self, frame: WsFrame) -> Result<(), MockServerError> {
        self.push(Ok(frame))
    }

    /// Push a UTF-8 payload as a websocket text frame.
    pub fn send_text(&self, text: impl AsRef<str>) -> Result<(), MockServerError> {
        let bytes = Bytes::copy_from_slice(text.as_ref().as_bytes());
        self.send_inbound(WsFrame::Text(bytes))
    }

    /// Serialize and push an envelope.
    pub fn send_envelope(&self, envelope: &Envelope) -> Result<(), MockServerError> {
        match envelope.encode() {
            Ok(text) => self.send_text(text),
            Err(_) => Err(MockServerError::ChannelClosed),
        }
    }

    /// Send a close frame; the client treats it as a remote close.
    pub fn close(&mut self, code: u16) -> Result<(), MockServerError> {
        let result = self.send_inbound(WsFrame::Close(Some(WsCloseFrame {
            code,
            reason: Bytes::from_static(b"server closing"),
        })));
        self.inbound_tx = None;
        result
    }

    /// Surface a read error to the client.
    pub fn fail_read(&mut self, error: impl Into<String>) -> Result<(), MockServerError> {
        let result = self.push(Err(PushError::TransportError {
            context: "read",
            error: error.into(),
        }));
        self.inbound_tx = None;
        result
    }

    /// Simulate a server-side socket drop by ending the client's read stream.
    pub fn drop_socket(&mut self) {
        self.inbound_tx = None;
    }

    /// Whether the client's reader has gone away (connection torn down on the client side).
    pub fn is_client_closed(&self) -> bool {
        self.inbound_tx.as_ref().is_none_or(|tx| tx.is_closed())
    }
}

/// Reader side for [`MockTransport`].
pub struct MockReader {
    rx: mpsc::UnboundedReceiver<Result<WsFrame, PushError>>,
}

impl futures_util::Stream for MockReader {
    type Item = Result<WsFrame, PushError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx).poll_recv(cx)
    }
}

/// Writer side for [`MockTransport`].
pub struct MockWriter {
    sent_tx: mpsc::UnboundedSender<WsFrame>,
}

impl MockWriter {
    /// Standalone writer plus the receiver observing everything written to it.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<WsFrame>) {
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        (Self { sent_tx }, sent_rx)
    }
}

impl Sink<WsFrame> for MockWriter {
    type Error = PushError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: WsFrame) -> Result<(), Self::Error> {
        self.get_mut()
            .sent_tx
            .send(item)
            .map_err(|_| PushError::TransportError {
                context: "mock_transport_write",
                error: "mock outbound channel closed".to_string(),
            })
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}

/// Text payload of a frame, if it is a text frame.
pub fn frame_text(frame: &WsFrame) -> Option<&str> {
    match frame {
        WsFrame::Text(bytes) => std::str::from_utf8(bytes).ok(),
        _ => None,
    }
}
