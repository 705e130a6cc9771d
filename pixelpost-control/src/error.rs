use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("Control socket I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed control frame: {0}")]
    ProtocolDeserialization(#[from] bincode::error::DecodeError),

    #[error("Unable to encode control frame: {0}")]
    ProtocolSerialization(#[from] bincode::error::EncodeError),

    /// Oversized frame or a version this build does not speak
    #[error("Control protocol violation: {0}")]
    Protocol(String),

    /// The handler refused or failed the command
    #[error("pixelpost rejected the command: {0}")]
    ServerError(String),

    #[error("pixelpost closed the control connection")]
    ConnectionClosed,

    #[error("Timed out waiting for pixelpost")]
    Timeout,

    #[error("No control socket at {0}")]
    InvalidSocketPath(String),
}

pub type Result<T> = std::result::Result<T, ControlError>;
