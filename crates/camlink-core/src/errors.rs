use thiserror::Error;

#[derive(Error, Debug)]
pub enum CamLinkError {
    #[error("Failed to open camera device: {reason}")]
    DeviceOpen { reason: String },

    #[error("Capture session configuration failed: {reason}")]
    SessionConfig { reason: String },

    #[error("Frame transcode failed: {reason}")]
    Transcode { reason: String },

    #[error("Connection failed: {reason}")]
    Connection { reason: String },

    #[error("Configuration invalid: {reason}")]
    InvalidConfig { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
