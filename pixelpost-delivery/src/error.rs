//! Typed error handling for delivery operations.
//!
//! Every destination failure resolves to one of three kinds, and every kind
//! is retried under the same policy:
//! - `Transport`: connection errors and timeouts
//! - `Rejected`: the destination answered outside the 2xx range
//! - `Configuration`: a destination is missing an endpoint or credential

use pixelpost_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("{0}")]
    Transport(String),

    /// The status code is kept verbatim; the body is retained for logs only.
    #[error("HTTP {status}")]
    Rejected { status: u16, body: String },

    #[error("{0}")]
    Configuration(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl DeliveryError {
    /// Summary recorded against a failed row and in the dead-letter table.
    #[must_use]
    pub fn failure_message(&self) -> String {
        self.to_string()
    }

    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

impl From<reqwest::Error> for DeliveryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Transport(format!("request timed out: {e}"))
        } else if e.is_builder() {
            Self::Configuration(format!("invalid request: {e}"))
        } else {
            Self::Transport(e.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, DeliveryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_message_carries_status() {
        let err = DeliveryError::Rejected {
            status: 500,
            body: "oops".to_string(),
        };
        assert_eq!(err.failure_message(), "HTTP 500");
    }

    #[test]
    fn configuration_errors_are_flagged() {
        let err = DeliveryError::Configuration("generic endpoint not configured".to_string());
        assert!(err.is_configuration());
        assert_eq!(err.failure_message(), "generic endpoint not configured");
        assert!(!DeliveryError::Transport("refused".to_string()).is_configuration());
    }
}
