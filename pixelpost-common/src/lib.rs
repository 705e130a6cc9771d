//! Pieces shared by every pixelpost crate: the shutdown signal, logging setup,
//! the bounded activity log and a couple of time helpers.

pub mod activity;
pub mod logging;
pub mod time;

pub use tracing;

/// Lifecycle signal broadcast to long-running tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
    Finalised,
}
