//! Event record store.
//!
//! Two collections back the delivery queue: pending queue items and the
//! dead-letter table for items that exhausted their retry budget. A single
//! scalar, the time of the last dispatch pass, is kept alongside them.
//!
//! Every backend implements [`EventStore`]. `SqliteEventStore` is the durable
//! production backend, `MemoryEventStore` is used for tests and throwaway
//! deployments.

pub mod backends;
pub mod config;
pub mod error;
mod migrations;
pub mod store;
pub mod types;

pub use backends::{MemoryEventStore, SqliteEventStore};
pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use store::EventStore;
pub use types::{DeadLetterId, DeadLetterItem, ItemId, NewEvent, QueueItem};
