//! camlink-bridge — the CamLink capture pipeline and its host surface.
//!
//! # Architecture
//!
//! ```text
//! Host UI layer                      Remote endpoint
//! ─────────────                      ───────────────
//! start()/stop()  ─► CameraBridge
//! subscribe()        │
//!                    ▼
//!              CameraSource (camlink-capture)
//!                    │ encoded frames, sensor cadence
//!                    ▼
//!              FrameThrottler (≥ 50 ms gaps, 20 fps ceiling)
//!                    │
//!                    ▼
//!              transcode() — decode, rotate 90°, re-encode
//!                    ├──────────────► FrameSocket ─► WebSocket ─► server
//!                    ▼                     │ inbound results
//!               FrameSink ◄────────────────┘
//! ```
//!
//! The host sees two surfaces: a control surface (`start`/`stop`, each
//! answering with a fixed acknowledgment string) and a streaming surface
//! (`subscribe`/`unsubscribe`, delivering raw encoded frame buffers for
//! both locally captured and server-returned images).

pub mod bridge;
pub mod status;
pub mod throttle;
pub mod transcode;

pub use bridge::{CameraBridge, FrameSink, ACK_STARTED, ACK_STOPPED};
pub use status::BridgeStatus;
pub use throttle::FrameThrottler;
pub use transcode::transcode;
