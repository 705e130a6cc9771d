use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Failed to bind gateway to {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },

    #[error("Gateway server error: {0}")]
    Server(String),
}

pub type Result<T> = std::result::Result<T, GatewayError>;
