//! Real device capture via nokhwa (V4L2 / MSMF / AVFoundation).
//!
//! The camera is opened and driven entirely on one dedicated thread; the
//! device never outlives it. Requesting MJPEG means the sensor hands us
//! already-encoded JPEG frames, which the pipeline forwards as-is to the
//! transcoder.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use camlink_core::{CamLinkError, CaptureConfig, EncodedFrame};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, ControlValueSetter, FrameFormat, KnownCameraControl,
    RequestedFormat, RequestedFormatType, Resolution,
};
use nokhwa::Camera;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::{assemble, now_ms, CameraSource, Delivery};

/// Frame rate requested from the device. The sensor's native cadence is a
/// request, not a guarantee; the pipeline throttles downstream regardless.
const REQUESTED_FPS: u32 = 30;

/// Back-off after a failed frame read, so a wedged device does not spin.
const READ_RETRY_DELAY: Duration = Duration::from_millis(10);

pub(crate) async fn open(config: &CaptureConfig) -> Result<CameraSource, CamLinkError> {
    let (frame_tx, frame_rx) = mpsc::channel(config.buffer_frames.max(1));
    let (ready_tx, ready_rx) = oneshot::channel();
    let stop = Arc::new(AtomicBool::new(false));
    let delivery = Delivery { frame_tx, stop: Arc::clone(&stop) };

    let thread_config = config.clone();
    let worker = std::thread::Builder::new()
        .name("camlink-capture".to_owned())
        .spawn(move || capture_loop(thread_config, delivery, ready_tx))
        .map_err(CamLinkError::Io)?;

    match ready_rx.await {
        Ok(Ok(())) => Ok(assemble(frame_rx, stop, worker)),
        Ok(Err(e)) => {
            let _ = worker.join();
            Err(e)
        }
        Err(_) => {
            let _ = worker.join();
            Err(CamLinkError::DeviceOpen {
                reason: "capture thread exited before reporting readiness".to_owned(),
            })
        }
    }
}

fn capture_loop(
    config: CaptureConfig,
    delivery: Delivery,
    ready_tx: oneshot::Sender<Result<(), CamLinkError>>,
) {
    let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
        CameraFormat::new(
            Resolution::new(config.width, config.height),
            FrameFormat::MJPEG,
            REQUESTED_FPS,
        ),
    ));

    let mut camera = match Camera::new(CameraIndex::Index(config.device_index), requested) {
        Ok(camera) => camera,
        Err(e) => {
            let _ = ready_tx.send(Err(CamLinkError::DeviceOpen {
                reason: format!("device {}: {e}", config.device_index),
            }));
            return;
        }
    };

    if let Err(e) = camera.open_stream() {
        let _ = ready_tx.send(Err(CamLinkError::SessionConfig { reason: e.to_string() }));
        return;
    }

    if config.continuous_focus {
        // Best effort — plenty of webcams have a fixed-focus lens.
        if let Err(e) =
            camera.set_camera_control(KnownCameraControl::Focus, ControlValueSetter::Boolean(true))
        {
            warn!("continuous autofocus not applied: {e}");
        }
    }

    info!(
        "camera {} streaming: negotiated {}",
        config.device_index,
        camera.camera_format()
    );
    let _ = ready_tx.send(Ok(()));

    while !delivery.should_stop() {
        match camera.frame_raw() {
            Ok(raw) => {
                if !delivery.deliver(EncodedFrame::new(raw.into_owned(), now_ms())) {
                    break;
                }
            }
            Err(e) => {
                // One bad read must not end the session.
                warn!("frame read failed: {e}");
                std::thread::sleep(READ_RETRY_DELAY);
            }
        }
    }

    if let Err(e) = camera.stop_stream() {
        warn!("stopping camera stream: {e}");
    }
    info!("camera {} released", config.device_index);
}
