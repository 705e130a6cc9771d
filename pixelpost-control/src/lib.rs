//! Control protocol for managing a running pixelpost instance
//!
//! A Unix domain socket carries length-prefixed bincode frames to:
//! - Inspect, retry and delete queued events
//! - Inspect, requeue and delete dead-lettered events
//! - Force a dispatch pass
//! - Read status and the recent activity log

pub mod auth;
pub mod client;
pub mod error;
pub mod protocol;
pub mod server;

pub use auth::ControlAuthConfig;
pub use client::ControlClient;
pub use error::{ControlError, Result};
pub use protocol::{
    DeadLetterCommand, PROTOCOL_VERSION, QueueCommand, Request, RequestCommand, Response,
    ResponseData, ResponsePayload, SystemCommand,
};
pub use server::{CommandHandler, ControlServer};

/// Default path for the control socket
pub const DEFAULT_CONTROL_SOCKET: &str = "/tmp/pixelpost.sock";

/// Largest frame either side will accept
pub(crate) const MAX_FRAME_SIZE: u32 = 1_000_000;
