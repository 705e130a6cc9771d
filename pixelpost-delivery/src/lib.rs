//! Delivery side of the event queue.
//!
//! The [`Enqueuer`] stores events and asks the [`Scheduler`] for a pass. The
//! [`Dispatcher`] reads ready rows, sends one batch per destination through
//! the [`destination::DestinationRegistry`], and settles every row through
//! the [`RetryPolicy`]. [`QueueService`] exposes the operator actions.

pub mod config;
pub mod destination;
pub mod dispatcher;
pub mod enqueue;
pub mod error;
pub mod policy;
pub mod scheduler;
pub mod service;

pub use config::DeliveryConfig;
pub use destination::{
    DestinationAdapter, DestinationRegistry, DestinationResponse, DestinationsConfig, OutboundEvent,
};
pub use dispatcher::Dispatcher;
pub use enqueue::Enqueuer;
pub use error::{DeliveryError, Result};
pub use policy::{RetryDecision, RetryPolicy};
pub use scheduler::{RunRequests, Scheduler, SchedulerConfig, SchedulerHandle};
pub use service::{DeadLetterEntry, QueueEntry, QueueService, QueueStatus};
