use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::CamLinkError;
use crate::types::Rotation;

/// Capture session configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Zero-based camera device index.
    #[serde(alias = "deviceIndex")]
    pub device_index: u32,
    pub width: u32,
    pub height: u32,
    /// How many frames the delivery channel holds before the producer
    /// starts dropping.
    #[serde(alias = "bufferFrames")]
    pub buffer_frames: usize,
    /// Request continuous autofocus where the backend supports it.
    #[serde(alias = "continuousFocus")]
    pub continuous_focus: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            width: 640,
            height: 480,
            buffer_frames: 2,
            continuous_focus: true,
        }
    }
}

/// Top-level bridge configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// WebSocket endpoint, `ws://` or `wss://`.
    pub endpoint: String,
    pub capture: CaptureConfig,
    /// Minimum gap between two outbound frames. 50 ms caps the stream at
    /// a 20 fps ceiling.
    #[serde(alias = "minFrameIntervalMs")]
    pub min_frame_interval_ms: u64,
    /// Re-encode quality, 1..=100.
    #[serde(alias = "jpegQuality")]
    pub jpeg_quality: u8,
    pub rotation: Rotation,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://127.0.0.1:8080/ws".to_owned(),
            capture: CaptureConfig::default(),
            min_frame_interval_ms: 50,
            jpeg_quality: 100,
            rotation: Rotation::Cw90,
        }
    }
}

impl BridgeConfig {
    /// Minimum inter-frame interval as a [`Duration`].
    pub fn min_frame_interval(&self) -> Duration {
        Duration::from_millis(self.min_frame_interval_ms)
    }

    /// Outbound frame-rate ceiling implied by the throttle interval
    /// (20 fps at the 50 ms default).
    pub fn frame_rate_ceiling(&self) -> f32 {
        1_000.0 / self.min_frame_interval_ms as f32
    }

    pub fn validate(&self) -> Result<(), CamLinkError> {
        if !self.endpoint.starts_with("ws://") && !self.endpoint.starts_with("wss://") {
            return Err(CamLinkError::InvalidConfig {
                reason: format!("endpoint must be ws:// or wss://, got {:?}", self.endpoint),
            });
        }
        if self.min_frame_interval_ms == 0 {
            return Err(CamLinkError::InvalidConfig {
                reason: "min_frame_interval_ms must be greater than zero".to_owned(),
            });
        }
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(CamLinkError::InvalidConfig {
                reason: format!("jpeg_quality must be 1..=100, got {}", self.jpeg_quality),
            });
        }
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(CamLinkError::InvalidConfig {
                reason: format!(
                    "capture resolution must be non-zero, got {}×{}",
                    self.capture.width, self.capture.height
                ),
            });
        }
        Ok(())
    }
}
