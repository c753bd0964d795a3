//! `CameraBridge` — the pipeline controller and host-facing surface.
//!
//! One bridge owns one capture → throttle → transcode → transport pipeline:
//!
//! ```text
//! CameraSource ──► FrameThrottler ──► transcode() ──┬──► FrameSocketWriter (outbound)
//!                                                   └──► FrameSink (local preview)
//! FrameSocket inbound ──────────────────────────────────► FrameSink (remote results)
//! ```
//!
//! # Lifecycle
//!
//! ```text
//! Idle → Starting → Running → Stopping → Idle
//! ```
//!
//! `start()` is only honoured from Idle; `stop()` from Starting or Running
//! (a no-op from Idle). There is no Error state: a half that fails to come
//! up while Starting is logged and left dark — the controller stays
//! partially initialized and `stop()` is the one cleanup path. The session
//! bundle (capture handle, transport writer, pipeline task, stop channel)
//! is created whole on start and destroyed whole on stop; no partial
//! bundle survives a `stop()` call.
//!
//! # Failure visibility
//!
//! `start()`/`stop()` return fixed acknowledgment strings; every failure is
//! reported through logging only. That is a deliberate limitation of the
//! host surface, not an oversight.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use camlink_capture::CameraSource;
use camlink_core::{BridgeConfig, BridgeState, EncodedFrame, FrameOrigin};
use camlink_transport::{FrameSocket, FrameSocketWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::status::{BridgeStats, BridgeStatus, FpsCounter};
use crate::throttle::FrameThrottler;
use crate::transcode::transcode;

/// Acknowledgment returned by [`CameraBridge::start`].
pub const ACK_STARTED: &str = "Camera started";
/// Acknowledgment returned by [`CameraBridge::stop`].
pub const ACK_STOPPED: &str = "Camera stopped";

/// Callback receiving raw encoded frame buffers.
///
/// Invoked from the pipeline task for both locally produced and remotely
/// received frames, concurrently with the host's own threads. No ordering
/// is guaranteed between local and remote frames; thread-affinity
/// marshaling before touching UI state is the host's responsibility.
pub type FrameSink = Arc<dyn Fn(FrameOrigin, Bytes) + Send + Sync>;

// ── Shared state ──────────────────────────────────────────────────────────────

struct Shared {
    state: Mutex<BridgeState>,
    sink: Mutex<Option<FrameSink>>,
    stats: BridgeStats,
}

impl Shared {
    fn state(&self) -> BridgeState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: BridgeState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    fn notify(&self, origin: FrameOrigin, frame: Bytes) {
        let sink = self.sink.lock().unwrap_or_else(|e| e.into_inner()).clone();
        if let Some(sink) = sink {
            sink(origin, frame);
        }
    }
}

// ── CameraBridge ──────────────────────────────────────────────────────────────

/// Owns the pipeline lifecycle and the host's control + streaming surface.
pub struct CameraBridge {
    config: BridgeConfig,
    shared: Arc<Shared>,
    /// Also serializes `start()`/`stop()` against each other.
    session: tokio::sync::Mutex<Option<ActiveSession>>,
}

/// The live session bundle. All members are created together on start and
/// torn down together on stop.
struct ActiveSession {
    stop_tx: mpsc::Sender<()>,
    pipeline: JoinHandle<()>,
}

impl CameraBridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Shared {
                state: Mutex::new(BridgeState::Idle),
                sink: Mutex::new(None),
                stats: BridgeStats::default(),
            }),
            session: tokio::sync::Mutex::new(None),
        }
    }

    /// Register the host's frame callback. Single-assignment by
    /// convention: a later subscribe replaces the earlier sink.
    pub fn subscribe(&self, sink: FrameSink) {
        *self.shared.sink.lock().unwrap_or_else(|e| e.into_inner()) = Some(sink);
        debug!("host frame sink subscribed");
    }

    /// Drop the registered frame callback.
    pub fn unsubscribe(&self) {
        *self.shared.sink.lock().unwrap_or_else(|e| e.into_inner()) = None;
        debug!("host frame sink unsubscribed");
    }

    pub fn state(&self) -> BridgeState {
        self.shared.state()
    }

    pub fn status(&self) -> BridgeStatus {
        self.shared.stats.snapshot(self.shared.state())
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Bring the pipeline up: connect the transport, open the camera, spawn
    /// the pipeline task. Returns `"Camera started"`; failures are logged,
    /// never returned.
    pub async fn start(&self) -> String {
        let mut session = self.session.lock().await;

        {
            let mut state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
            if !state.can_start() {
                warn!("start ignored; bridge is {}", *state);
                return ACK_STARTED.to_owned();
            }
            *state = BridgeState::Starting;
        }
        info!("starting capture pipeline → {}", self.config.endpoint);

        // The two halves come up independently: a dead server must not
        // block local capture, and a missing camera must not tear down the
        // connection carrying remote results.
        let (writer, remote_rx) = match FrameSocket::connect(&self.config.endpoint).await {
            Ok(socket) => {
                let (writer, remote_rx) = socket.start_recv_loop();
                (Some(writer), Some(remote_rx))
            }
            Err(e) => {
                error!("transport connect failed: {e:#}");
                (None, None)
            }
        };

        let capture = match CameraSource::open(&self.config.capture).await {
            Ok(source) => Some(source),
            Err(e) => {
                error!("camera start failed: {e}");
                None
            }
        };

        let fully_up = writer.is_some() && capture.is_some();
        let (stop_tx, stop_rx) = mpsc::channel::<()>(1);
        let pipeline = tokio::spawn(run_pipeline(
            Arc::clone(&self.shared),
            self.config.clone(),
            capture,
            writer,
            remote_rx,
            stop_rx,
        ));
        *session = Some(ActiveSession { stop_tx, pipeline });

        if fully_up {
            self.shared.set_state(BridgeState::Running);
            info!(
                "pipeline running ({:.0} fps ceiling, rotation {})",
                self.config.frame_rate_ceiling(),
                self.config.rotation
            );
        } else {
            warn!("pipeline partially initialized; call stop() to clean up");
        }
        ACK_STARTED.to_owned()
    }

    /// Tear the pipeline down and null the session bundle. Idempotent;
    /// a no-op from Idle. Best-effort cancellation: an in-flight sink
    /// callback may still fire once after this begins.
    pub async fn stop(&self) -> String {
        let mut session = self.session.lock().await;

        {
            let mut state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
            if !state.can_stop() {
                debug!("stop ignored; bridge is {}", *state);
                return ACK_STOPPED.to_owned();
            }
            *state = BridgeState::Stopping;
        }

        if let Some(active) = session.take() {
            let _ = active.stop_tx.send(()).await;
            if let Err(e) = active.pipeline.await {
                warn!("pipeline task did not exit cleanly: {e}");
            }
        }

        self.shared.set_state(BridgeState::Idle);
        info!("capture pipeline stopped");
        ACK_STOPPED.to_owned()
    }
}

// ── Pipeline task ─────────────────────────────────────────────────────────────

async fn run_pipeline(
    shared: Arc<Shared>,
    config: BridgeConfig,
    mut capture: Option<CameraSource>,
    mut writer: Option<FrameSocketWriter>,
    mut remote_rx: Option<mpsc::Receiver<Bytes>>,
    mut stop_rx: mpsc::Receiver<()>,
) {
    // A fresh throttler per session: the first frame after start is always
    // admitted, whatever happened before the restart.
    let mut throttler = FrameThrottler::new(config.min_frame_interval());
    let mut fps = FpsCounter::new();
    let mut status_ticker = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = stop_rx.recv() => {
                info!("pipeline stop requested");
                break;
            }

            maybe_frame = next_local(&mut capture) => {
                match maybe_frame {
                    Some(frame) => handle_local_frame(
                        &shared, &config, &mut throttler, &mut fps, &mut writer, frame,
                    ).await,
                    None => {
                        info!("capture stream ended");
                        capture = None;
                    }
                }
            }

            maybe_remote = next_remote(&mut remote_rx) => {
                match maybe_remote {
                    Some(frame) => {
                        debug!("remote frame received ({} bytes)", frame.len());
                        shared.stats.record_received();
                        shared.notify(FrameOrigin::Remote, frame);
                    }
                    None => {
                        info!("transport inbound ended");
                        remote_rx = None;
                    }
                }
            }

            _ = status_ticker.tick() => {
                shared.stats.set_fps(fps.fps());
            }
        }
    }

    // Teardown in reverse-acquisition order: camera handles first,
    // connection last.
    if let Some(mut capture) = capture.take() {
        capture.stop();
    }
    if let Some(mut writer) = writer.take() {
        writer.close(1000, "camera stopped").await;
    }
    info!("pipeline task exited");
}

async fn handle_local_frame(
    shared: &Shared,
    config: &BridgeConfig,
    throttler: &mut FrameThrottler,
    fps: &mut FpsCounter,
    writer: &mut Option<FrameSocketWriter>,
    frame: EncodedFrame,
) {
    shared.stats.record_captured();

    if !throttler.admit(frame.timestamp_ms) {
        debug!("frame throttled ({} bytes)", frame.len());
        return;
    }
    shared.stats.record_admitted();

    match transcode(&frame.data, config.rotation, config.jpeg_quality) {
        Ok(rotated) => {
            if let Some(writer) = writer.as_mut() {
                writer.send_frame(rotated.clone()).await;
                shared.stats.set_sent(writer.frames_sent());
            }
            fps.tick();
            debug!("forwarded frame ({} bytes, rotated {})", rotated.len(), config.rotation);
            shared.notify(FrameOrigin::Local, rotated);
        }
        Err(e) => {
            // One bad frame never stops the pipeline.
            warn!("transcode failed; skipping frame: {e}");
            shared.stats.record_transcode_failure();
        }
    }
}

async fn next_local(capture: &mut Option<CameraSource>) -> Option<EncodedFrame> {
    match capture {
        Some(source) => source.next_frame().await,
        None => std::future::pending().await,
    }
}

async fn next_remote(remote_rx: &mut Option<mpsc::Receiver<Bytes>>) -> Option<Bytes> {
    match remote_rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camlink_core::CaptureConfig;
    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio::time::timeout;
    use tokio_tungstenite::accept_async;
    use tokio_tungstenite::tungstenite::Message;

    fn test_config(endpoint: String) -> BridgeConfig {
        BridgeConfig {
            endpoint,
            capture: CaptureConfig { width: 64, height: 48, ..CaptureConfig::default() },
            ..BridgeConfig::default()
        }
    }

    /// Loopback server echoing every binary frame back at the sender.
    /// Accepts any number of consecutive connections.
    async fn spawn_echo_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else { return };
                tokio::spawn(async move {
                    let Ok(mut ws) = accept_async(stream).await else { return };
                    while let Some(Ok(message)) = ws.next().await {
                        match message {
                            Message::Binary(payload) => {
                                if ws.send(Message::Binary(payload)).await.is_err() {
                                    break;
                                }
                            }
                            Message::Close(_) => break,
                            _ => {}
                        }
                    }
                });
            }
        });

        format!("ws://{addr}")
    }

    /// An address nothing is listening on.
    async fn dead_endpoint() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn start_and_stop_return_the_fixed_acknowledgments() {
        let bridge = CameraBridge::new(test_config(spawn_echo_server().await));

        assert_eq!(bridge.state(), BridgeState::Idle);
        assert_eq!(bridge.start().await, "Camera started");
        assert_eq!(bridge.state(), BridgeState::Running);
        assert_eq!(bridge.stop().await, "Camera stopped");
        assert_eq!(bridge.state(), BridgeState::Idle);
    }

    #[tokio::test]
    async fn stop_from_idle_is_a_noop() {
        let bridge = CameraBridge::new(test_config(dead_endpoint().await));

        assert_eq!(bridge.stop().await, "Camera stopped");
        assert_eq!(bridge.state(), BridgeState::Idle);
        assert!(bridge.session.lock().await.is_none());
    }

    #[tokio::test]
    async fn start_is_only_honoured_from_idle() {
        let bridge = CameraBridge::new(test_config(spawn_echo_server().await));

        bridge.start().await;
        // Second start is acknowledged but changes nothing.
        assert_eq!(bridge.start().await, "Camera started");
        assert_eq!(bridge.state(), BridgeState::Running);

        bridge.stop().await;
        assert_eq!(bridge.state(), BridgeState::Idle);
    }

    #[tokio::test]
    async fn a_dead_server_leaves_the_bridge_partially_initialized() {
        let bridge = CameraBridge::new(test_config(dead_endpoint().await));

        bridge.start().await;
        // Transport never came up: not Running, not rolled back either.
        assert_eq!(bridge.state(), BridgeState::Starting);
        assert!(bridge.session.lock().await.is_some());

        // stop() is the cleanup path.
        bridge.stop().await;
        assert_eq!(bridge.state(), BridgeState::Idle);
        assert!(bridge.session.lock().await.is_none());
    }

    #[tokio::test]
    async fn restart_cycle_leaks_no_session_state() {
        let bridge = CameraBridge::new(test_config(spawn_echo_server().await));

        bridge.stop().await;
        bridge.start().await;
        bridge.stop().await;
        bridge.stop().await; // double stop must not panic

        assert!(bridge.session.lock().await.is_none());
        assert_eq!(bridge.state(), BridgeState::Idle);

        // And the bridge is reusable afterwards.
        bridge.start().await;
        assert_eq!(bridge.state(), BridgeState::Running);
        bridge.stop().await;
        assert!(bridge.session.lock().await.is_none());
        assert_eq!(bridge.state(), BridgeState::Idle);
    }

    #[tokio::test]
    async fn frames_reach_the_sink_rotated_and_echoed_back() {
        let bridge = CameraBridge::new(test_config(spawn_echo_server().await));

        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink: FrameSink = Arc::new(move |origin, frame| {
            let _ = tx.send((origin, frame));
        });
        bridge.subscribe(sink);

        bridge.start().await;
        assert_eq!(bridge.state(), BridgeState::Running);

        let mut saw_local = false;
        let mut saw_remote = false;
        while !(saw_local && saw_remote) {
            let (origin, frame) = timeout(Duration::from_secs(10), rx.recv())
                .await
                .expect("a frame before the timeout")
                .expect("sink channel open");

            // 64×48 capture, rotated 90° → 48×64 everywhere downstream.
            let decoded = image::load_from_memory(&frame).expect("sink frames are valid JPEG");
            assert_eq!((decoded.width(), decoded.height()), (48, 64));

            match origin {
                FrameOrigin::Local => saw_local = true,
                FrameOrigin::Remote => saw_remote = true,
            }
        }

        bridge.stop().await;

        let status = bridge.status();
        assert!(status.frames_captured >= 1);
        assert!(status.frames_admitted >= 1);
        assert!(status.frames_sent >= 1);
        assert!(status.frames_received >= 1);
        assert_eq!(status.transcode_failures, 0);
    }
}
