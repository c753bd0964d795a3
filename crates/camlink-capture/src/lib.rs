//! camlink-capture — camera frame acquisition for the CamLink bridge.
//!
//! # Capture backends
//!
//! | Backend | Feature | Notes |
//! |---------|---------|-------|
//! | nokhwa (V4L2 / MSMF / AVFoundation) | `camera-nokhwa` | real device capture |
//! | Test pattern | always compiled | synthetic JPEG gradient frames |
//!
//! # Usage
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), camlink_core::CamLinkError> {
//! use camlink_capture::CameraSource;
//! use camlink_core::CaptureConfig;
//!
//! let mut source = CameraSource::open(&CaptureConfig::default()).await?;
//! while let Some(frame) = source.next_frame().await {
//!     // frame.data: one complete JPEG image as produced by the sensor
//!     // frame.timestamp_ms: arrival time, ms since the Unix epoch
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! ```text
//! camera device (or pattern generator)
//!          │  dedicated capture thread — all device
//!          │  callbacks are serialized here
//!          ▼
//!   bounded channel (buffer_frames slots, drops when the consumer lags)
//!          │
//!          ▼
//!     next_frame()
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use camlink_core::{CamLinkError, CaptureConfig, EncodedFrame};
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[cfg(feature = "camera-nokhwa")]
mod device;
mod test_pattern;

/// Frame rate of the synthetic source when it stands in for a real camera.
#[cfg(not(feature = "camera-nokhwa"))]
const TEST_PATTERN_FPS: u32 = 30;

// ── CameraSource ──────────────────────────────────────────────────────────────

/// Handle to an open capture session.
///
/// Owns the device (or pattern generator) exclusively. Frames arrive on a
/// dedicated background thread and are awaited with
/// [`next_frame`](CameraSource::next_frame). [`stop`](CameraSource::stop)
/// releases the stream and device; dropping the handle does the same.
#[derive(Debug)]
pub struct CameraSource {
    frame_rx: mpsc::Receiver<EncodedFrame>,
    stop: Arc<AtomicBool>,
    worker: Option<std::thread::JoinHandle<()>>,
    stopped: bool,
}

impl CameraSource {
    /// Open the configured camera device and start continuous delivery.
    ///
    /// Fails with [`CamLinkError::DeviceOpen`] when the device cannot be
    /// acquired and [`CamLinkError::SessionConfig`] when the stream cannot
    /// be configured. Without the `camera-nokhwa` feature the synthetic
    /// test pattern stands in so the rest of the pipeline stays exercisable.
    pub async fn open(config: &CaptureConfig) -> Result<Self, CamLinkError> {
        #[cfg(feature = "camera-nokhwa")]
        {
            device::open(config).await
        }
        #[cfg(not(feature = "camera-nokhwa"))]
        {
            warn!("built without a camera backend; serving the synthetic test pattern");
            Self::test_pattern(config, TEST_PATTERN_FPS)
        }
    }

    /// Open a synthetic source producing JPEG gradient frames at `fps`.
    ///
    /// Used by tests and by builds without a device backend.
    pub fn test_pattern(config: &CaptureConfig, fps: u32) -> Result<Self, CamLinkError> {
        test_pattern::spawn(config, fps)
    }

    /// Await the next encoded frame. Returns `None` once the source has
    /// stopped.
    pub async fn next_frame(&mut self) -> Option<EncodedFrame> {
        if self.stopped {
            return None;
        }
        self.frame_rx.recv().await
    }

    /// Release the stream and device. Idempotent — safe to call when
    /// already stopped.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.stop.store(true, Ordering::Relaxed);
        // Unblocks a producer waiting on a full channel.
        self.frame_rx.close();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("capture thread panicked during shutdown");
            }
        }
        debug!("capture source stopped");
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── Backend plumbing ──────────────────────────────────────────────────────────

/// Channel + stop-flag bundle handed to a backend's capture thread.
pub(crate) struct Delivery {
    pub(crate) frame_tx: mpsc::Sender<EncodedFrame>,
    pub(crate) stop: Arc<AtomicBool>,
}

impl Delivery {
    /// Hand a frame to the consumer. Returns `false` once the consumer is
    /// gone and the capture loop should wind down. When the channel is full
    /// the frame is dropped so the capture thread never blocks on a lagging
    /// consumer.
    pub(crate) fn deliver(&self, frame: EncodedFrame) -> bool {
        match self.frame_tx.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("frame channel full; dropping frame");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    pub(crate) fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }
}

pub(crate) fn assemble(
    frame_rx: mpsc::Receiver<EncodedFrame>,
    stop: Arc<AtomicBool>,
    worker: std::thread::JoinHandle<()>,
) -> CameraSource {
    CameraSource { frame_rx, stop, worker: Some(worker), stopped: false }
}

/// Milliseconds since the Unix epoch — the arrival-timestamp clock.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use camlink_core::CaptureConfig;

    fn small_config() -> CaptureConfig {
        CaptureConfig { width: 64, height: 48, ..CaptureConfig::default() }
    }

    #[tokio::test]
    async fn test_pattern_produces_decodable_jpeg() {
        let mut source = CameraSource::test_pattern(&small_config(), 60).unwrap();
        let frame = source.next_frame().await.expect("a frame");

        // JPEG SOI marker.
        assert_eq!(&frame.data[..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory(&frame.data).expect("decodable JPEG");
        assert_eq!(decoded.width(), 64);
        assert_eq!(decoded.height(), 48);
    }

    #[tokio::test]
    async fn timestamps_never_run_backwards() {
        let mut source = CameraSource::test_pattern(&small_config(), 120).unwrap();
        let mut last = 0u64;
        for _ in 0..3 {
            let frame = source.next_frame().await.expect("a frame");
            assert!(frame.timestamp_ms >= last);
            last = frame.timestamp_ms;
        }
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_ends_the_stream() {
        let mut source = CameraSource::test_pattern(&small_config(), 60).unwrap();
        let _ = source.next_frame().await.expect("a frame");

        source.stop();
        source.stop();
        assert!(source.next_frame().await.is_none());
    }

    #[test]
    fn zero_resolution_is_a_session_config_error() {
        let config = CaptureConfig { width: 0, height: 48, ..CaptureConfig::default() };
        let err = CameraSource::test_pattern(&config, 30).unwrap_err();
        assert!(matches!(err, CamLinkError::SessionConfig { .. }));
    }

    #[test]
    fn zero_fps_is_a_session_config_error() {
        let err = CameraSource::test_pattern(&small_config(), 0).unwrap_err();
        assert!(matches!(err, CamLinkError::SessionConfig { .. }));
    }
}
