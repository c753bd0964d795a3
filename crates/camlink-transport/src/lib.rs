//! camlink-transport — persistent full-duplex WebSocket frame channel.
//!
//! One binary message = one complete encoded image, in both directions.
//! There is no framing envelope beyond the WebSocket protocol itself, no
//! handshake beyond connection establishment, and no authentication.
//!
//! # Lifecycle
//!
//! ```text
//! 1. FrameSocket::connect(endpoint)
//! 2. let (writer, remote_rx) = socket.start_recv_loop()
//!       ├─ writer:    FrameSocketWriter for outbound frames
//!       └─ remote_rx: channel of inbound binary frames
//! 3. writer.send_frame(bytes)   ← fire-and-forget, per outbound frame
//! 4. writer.close(1000, "camera stopped")
//! ```
//!
//! # No read timeout
//!
//! The connection carries no read deadline: the remote may take arbitrarily
//! long to answer a frame, and a slow result beats a dropped one. The
//! hang-risk is accepted and deliberate.
//!
//! # No retries
//!
//! A failed or closed connection is terminal for this socket. Sends after a
//! failure are silently lost (logged at debug); reconnection is the
//! caller's decision, not this layer's.

use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::frame::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Inbound frames buffered between the receive task and the consumer.
const INBOUND_CHANNEL_CAPACITY: usize = 256;

// ── FrameSocket ───────────────────────────────────────────────────────────────

/// A connected frame channel, not yet split.
///
/// Use [`FrameSocket::connect`] to open the session, then
/// [`start_recv_loop`](FrameSocket::start_recv_loop) to obtain a
/// [`FrameSocketWriter`] plus the inbound-frame channel.
pub struct FrameSocket {
    stream: WsStream,
    endpoint: String,
}

impl FrameSocket {
    /// Establish one WebSocket session with the remote endpoint.
    ///
    /// `ws://` and `wss://` URLs are both accepted; TLS endpoints are
    /// verified against the webpki root store.
    pub async fn connect(endpoint: &str) -> anyhow::Result<Self> {
        use anyhow::Context;

        let (stream, response) = connect_async(endpoint)
            .await
            .with_context(|| format!("WebSocket connect to {endpoint}"))?;

        info!("connected to {} (HTTP {})", endpoint, response.status());
        Ok(Self { stream, endpoint: endpoint.to_owned() })
    }

    /// Consume this socket, spawning a background receive task.
    ///
    /// Returns:
    /// - [`FrameSocketWriter`] — for outbound frames and `close`
    /// - `Receiver<Bytes>` — inbound binary frames from the remote
    pub fn start_recv_loop(self) -> (FrameSocketWriter, mpsc::Receiver<Bytes>) {
        let (frame_tx, frame_rx) = mpsc::channel::<Bytes>(INBOUND_CHANNEL_CAPACITY);
        let (sink, stream) = self.stream.split();
        let endpoint = self.endpoint.clone();

        tokio::spawn(recv_loop(stream, frame_tx, endpoint));

        let writer = FrameSocketWriter {
            sink,
            endpoint: self.endpoint,
            closed: false,
            frames_sent: 0,
        };
        (writer, frame_rx)
    }
}

// ── Background receive loop ───────────────────────────────────────────────────

async fn recv_loop(mut stream: SplitStream<WsStream>, frame_tx: mpsc::Sender<Bytes>, endpoint: String) {
    while let Some(next) = stream.next().await {
        match next {
            Ok(Message::Binary(payload)) => {
                debug!("received {} bytes from {}", payload.len(), endpoint);
                if frame_tx.send(Bytes::from(payload)).await.is_err() {
                    debug!("inbound channel closed; stopping recv loop");
                    return;
                }
            }
            Ok(Message::Text(text)) => {
                // Only the binary path is wired; the remote speaks images.
                debug!("ignoring text message ({} chars) from {}", text.len(), endpoint);
            }
            Ok(Message::Close(frame)) => {
                info!("remote closed {}: {:?}", endpoint, frame);
                return;
            }
            Ok(_) => {} // ping/pong handled by the protocol layer
            Err(e) => {
                warn!("receive error on {}: {}", endpoint, e);
                return;
            }
        }
    }
    info!("stream from {} ended", endpoint);
}

// ── FrameSocketWriter ─────────────────────────────────────────────────────────

/// Write-only handle to the frame channel, returned by
/// [`FrameSocket::start_recv_loop`].
///
/// Not `Clone` — only one writer at a time.
pub struct FrameSocketWriter {
    sink: SplitSink<WsStream, Message>,
    endpoint: String,
    closed: bool,
    frames_sent: u64,
}

impl FrameSocketWriter {
    /// Send one encoded frame, fire-and-forget.
    ///
    /// No acknowledgment, no backpressure, no retry: when the connection is
    /// closed or has failed the frame is silently lost and only a debug log
    /// records it. This never raises to the caller.
    pub async fn send_frame(&mut self, frame: Bytes) {
        if self.closed {
            debug!("send of {} bytes dropped; connection closed", frame.len());
            return;
        }
        match self.sink.send(Message::Binary(frame.to_vec())).await {
            Ok(()) => {
                self.frames_sent += 1;
                debug!("sent frame #{} ({} bytes)", self.frames_sent, frame.len());
            }
            Err(e) => {
                // Terminal for this socket; later sends become no-ops.
                warn!("send to {} failed: {}; dropping connection", self.endpoint, e);
                self.closed = true;
            }
        }
    }

    /// Terminate the session with a close code and reason. Idempotent;
    /// subsequent [`send_frame`](FrameSocketWriter::send_frame) calls are
    /// no-ops.
    pub async fn close(&mut self, code: u16, reason: &str) {
        if self.closed {
            return;
        }
        self.closed = true;
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_owned().into(),
        };
        if let Err(e) = self.sink.send(Message::Close(Some(frame))).await {
            debug!("close handshake with {} failed: {}", self.endpoint, e);
        }
        info!("closed {} ({}: {})", self.endpoint, code, reason);
    }

    /// Whether the writer has been closed or has seen a terminal failure.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Total frames written so far.
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }
}
