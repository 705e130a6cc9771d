use async_trait::async_trait;

use crate::{
    Result,
    types::{DeadLetterId, DeadLetterItem, ItemId, NewEvent, QueueItem},
};

/// Persistence contract for the delivery queue.
///
/// Implementations own every row. Callers never hold a row across dispatch
/// passes; they re-read through this trait each time.
#[async_trait]
pub trait EventStore: Send + Sync + std::fmt::Debug {
    /// Store a new queue row and return its id.
    async fn insert(&self, event: NewEvent) -> Result<ItemId>;

    /// Up to `limit` rows whose `next_attempt_at` is zero or not after `now`,
    /// oldest `created_at` first.
    async fn select_ready(&self, now: u64, limit: usize) -> Result<Vec<QueueItem>>;

    async fn get(&self, id: ItemId) -> Result<Option<QueueItem>>;

    /// Returns `false` when the row does not exist.
    async fn delete(&self, id: ItemId) -> Result<bool>;

    /// Returns `false` when the row does not exist.
    async fn update_retry(&self, id: ItemId, attempts: u32, next_attempt_at: u64) -> Result<bool>;

    /// Atomically insert `item` into the dead-letter table and remove it from
    /// the queue.
    ///
    /// Returns `None` without touching the dead-letter table when the queue
    /// row has already gone, so a concurrently deleted item is never revived.
    async fn move_to_deadletter(
        &self,
        item: &QueueItem,
        failure_message: &str,
        now: u64,
    ) -> Result<Option<DeadLetterId>>;

    async fn count(&self) -> Result<usize>;

    /// Newest first.
    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<QueueItem>>;

    async fn count_deadletter(&self) -> Result<usize>;

    /// Most recently failed first.
    async fn list_deadletter(&self, limit: usize, offset: usize) -> Result<Vec<DeadLetterItem>>;

    async fn get_deadletter(&self, id: DeadLetterId) -> Result<Option<DeadLetterItem>>;

    /// Move a dead-letter row back into the queue as a fresh item with zero
    /// attempts. Returns the new queue id, or `None` if the row does not exist.
    async fn retry_deadletter(&self, id: DeadLetterId, now: u64) -> Result<Option<ItemId>>;

    /// Returns `false` when the row does not exist.
    async fn delete_deadletter(&self, id: DeadLetterId) -> Result<bool>;

    /// Time of the last completed dispatch pass.
    async fn last_processed(&self) -> Result<Option<u64>>;

    async fn set_last_processed(&self, at: u64) -> Result<()>;
}
