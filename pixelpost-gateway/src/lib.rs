//! HTTP surface for pixelpost
//!
//! # Endpoints
//!
//! - **`/health/live`** - Liveness probe: 200 while the process can answer
//! - **`/health/ready`** - Readiness probe: 200 when the event store answers
//! - **`/health`** - Queue depth, active destinations and recent activity as JSON
//! - **`POST /v1/events`** - Queue an event, guarded by a bearer token and a
//!   per-client token bucket

mod config;
mod error;
mod health;
mod ingest;
mod limiter;
mod server;

pub use config::{GatewayConfig, RateLimitConfig};
pub use error::{GatewayError, Result};
pub use limiter::RateLimiter;
pub use server::{GatewayServer, GatewayState};
