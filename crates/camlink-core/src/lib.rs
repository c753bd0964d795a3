pub mod config;
pub mod errors;
pub mod types;

pub use config::{BridgeConfig, CaptureConfig};
pub use errors::CamLinkError;
pub use types::*;
