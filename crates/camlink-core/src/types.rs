use bytes::Bytes;
use serde::{Deserialize, Serialize};

// MARK: - Rotation

/// Fixed rotation applied to every frame before it leaves the device,
/// correcting for sensor-vs-display mounting.
///
/// Serialised as degrees clockwise (`0 | 90 | 180 | 270`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum Rotation {
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    pub fn degrees(&self) -> u16 {
        match self {
            Self::None => 0,
            Self::Cw90 => 90,
            Self::Cw180 => 180,
            Self::Cw270 => 270,
        }
    }

    /// Whether the rotated image's width and height are swapped
    /// relative to the input.
    pub fn swaps_dimensions(&self) -> bool {
        matches!(self, Self::Cw90 | Self::Cw270)
    }
}

impl Default for Rotation {
    fn default() -> Self {
        Self::Cw90
    }
}

impl TryFrom<u16> for Rotation {
    type Error = String;

    fn try_from(degrees: u16) -> Result<Self, Self::Error> {
        match degrees {
            0 => Ok(Self::None),
            90 => Ok(Self::Cw90),
            180 => Ok(Self::Cw180),
            270 => Ok(Self::Cw270),
            other => Err(format!("unsupported rotation: {other}°")),
        }
    }
}

impl From<Rotation> for u16 {
    fn from(rotation: Rotation) -> u16 {
        rotation.degrees()
    }
}

impl std::fmt::Display for Rotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

// MARK: - EncodedFrame

/// One opaque encoded (JPEG) image buffer.
///
/// Transient — lives for a single pipeline pass and carries no identity
/// beyond arrival order. Width/height/orientation are implicit in the
/// codec container.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub data: Bytes,
    /// Arrival timestamp, milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
}

impl EncodedFrame {
    pub fn new(data: impl Into<Bytes>, timestamp_ms: u64) -> Self {
        Self { data: data.into(), timestamp_ms }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

// MARK: - FrameOrigin

/// Where a frame handed to the bridge sink came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOrigin {
    /// Captured locally, throttled and transcoded by this pipeline.
    Local,
    /// Returned by the remote endpoint over the transport channel.
    Remote,
}

impl std::fmt::Display for FrameOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

// MARK: - BridgeState

/// Lifecycle state of the pipeline controller.
///
/// ```text
/// Idle → Starting → Running → Stopping → Idle
/// ```
///
/// There is no Error state: failures while Starting are logged and the
/// controller stays partially initialized until `stop()` cleans up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Idle,
    Starting,
    Running,
    Stopping,
}

impl BridgeState {
    /// `start()` is only valid from Idle.
    pub fn can_start(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// `stop()` is valid from Starting or Running (and a no-op from Idle).
    pub fn can_stop(&self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl std::fmt::Display for BridgeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
        }
    }
}
