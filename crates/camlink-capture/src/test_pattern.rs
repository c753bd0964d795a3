//! Synthetic capture backend — JPEG gradient frames at a fixed cadence.
//!
//! Stands in for a real camera in tests, CI, and builds without the
//! `camera-nokhwa` feature.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use camlink_core::{CamLinkError, CaptureConfig, EncodedFrame};
use image::codecs::jpeg::JpegEncoder;
use image::{ImageBuffer, Rgb};
use tokio::sync::mpsc;
use tracing::info;

use crate::{assemble, now_ms, CameraSource, Delivery};

/// Encode quality for generated frames. The pattern is synthetic; there is
/// nothing worth preserving at maximum quality.
const PATTERN_QUALITY: u8 = 80;

pub(crate) fn spawn(config: &CaptureConfig, fps: u32) -> Result<CameraSource, CamLinkError> {
    if config.width == 0 || config.height == 0 {
        return Err(CamLinkError::SessionConfig {
            reason: format!(
                "test pattern needs a non-zero resolution, got {}×{}",
                config.width, config.height
            ),
        });
    }
    if fps == 0 {
        return Err(CamLinkError::SessionConfig {
            reason: "test pattern needs a non-zero frame rate".to_owned(),
        });
    }

    let (frame_tx, frame_rx) = mpsc::channel(config.buffer_frames.max(1));
    let stop = Arc::new(AtomicBool::new(false));
    let delivery = Delivery { frame_tx, stop: Arc::clone(&stop) };

    let width = config.width;
    let height = config.height;
    let interval = Duration::from_secs(1) / fps;

    let worker = std::thread::Builder::new()
        .name("camlink-pattern".to_owned())
        .spawn(move || pattern_loop(delivery, width, height, interval))
        .map_err(CamLinkError::Io)?;

    info!("test pattern source started: {}×{} @{}fps", width, height, fps);
    Ok(assemble(frame_rx, stop, worker))
}

fn pattern_loop(delivery: Delivery, width: u32, height: u32, interval: Duration) {
    let mut tick: u32 = 0;
    while !delivery.should_stop() {
        let jpeg = render_jpeg(width, height, tick);
        if !delivery.deliver(EncodedFrame::new(jpeg, now_ms())) {
            break;
        }
        tick = tick.wrapping_add(1);
        std::thread::sleep(interval);
    }
}

/// A scrolling RGB gradient, encoded as one complete JPEG image — the same
/// shape a sensor's encoded output takes.
fn render_jpeg(width: u32, height: u32, tick: u32) -> Vec<u8> {
    let image: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([
            ((x + tick) % 256) as u8,
            ((y + tick) % 256) as u8,
            (tick % 256) as u8,
        ])
    });

    let mut jpeg = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut jpeg, PATTERN_QUALITY);
    image
        .write_with_encoder(encoder)
        .expect("encoding a freshly built RGB buffer cannot fail");
    jpeg
}
