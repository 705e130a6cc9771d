//! Error types for store operations.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite rejected a statement.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The connection or its executor thread is unavailable.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Creating the database directory failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A memory store configured with a capacity is full.
    #[error("Store capacity exceeded: {0} items")]
    CapacityExceeded(usize),

    /// Internal error (lock poisoning, etc.).
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::Internal(format!("Lock poisoned: {e}"))
    }
}

impl From<tokio_rusqlite::Error> for StoreError {
    fn from(e: tokio_rusqlite::Error) -> Self {
        match e {
            tokio_rusqlite::Error::Rusqlite(e) => Self::Sqlite(e),
            tokio_rusqlite::Error::Close(_) => Self::Connection("Connection closed".to_string()),
            other => Self::Connection(other.to_string()),
        }
    }
}
