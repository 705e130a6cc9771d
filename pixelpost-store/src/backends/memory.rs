use std::{
    collections::BTreeMap,
    sync::{Arc, PoisonError, RwLock},
};

use async_trait::async_trait;

use crate::{
    EventStore, StoreError,
    types::{DeadLetterId, DeadLetterItem, ItemId, NewEvent, QueueItem},
};

#[derive(Debug, Default)]
struct Tables {
    queue: BTreeMap<ItemId, QueueItem>,
    deadletter: BTreeMap<DeadLetterId, DeadLetterItem>,
    last_item_id: ItemId,
    last_deadletter_id: DeadLetterId,
    last_processed: Option<u64>,
}

impl Tables {
    const fn next_item_id(&mut self) -> ItemId {
        self.last_item_id += 1;
        self.last_item_id
    }

    const fn next_deadletter_id(&mut self) -> DeadLetterId {
        self.last_deadletter_id += 1;
        self.last_deadletter_id
    }
}

/// In-memory event store.
///
/// Both tables live behind one `RwLock`, so a dead-letter move is atomic with
/// respect to every other operation. Contents are lost when the process exits.
///
/// An optional capacity bounds the queue table; inserts beyond it fail, which
/// is how tests exercise enqueue failures.
#[derive(Debug, Clone, Default)]
pub struct MemoryEventStore {
    tables: Arc<RwLock<Tables>>,
    capacity: Option<usize>,
}

impl MemoryEventStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tables: Arc::default(),
            capacity: Some(capacity),
        }
    }

    /// Number of queued items. Recovers the data if the lock is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .queue
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub const fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

fn page<T: Clone>(rows: Vec<&T>, limit: usize, offset: usize) -> Vec<T> {
    rows.into_iter().skip(offset).take(limit).cloned().collect()
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn insert(&self, event: NewEvent) -> crate::Result<ItemId> {
        let mut tables = self.tables.write()?;

        if let Some(capacity) = self.capacity
            && tables.queue.len() >= capacity
        {
            return Err(StoreError::CapacityExceeded(capacity));
        }

        let id = tables.next_item_id();
        tables.queue.insert(
            id,
            QueueItem {
                id,
                destination: event.destination,
                event_name: event.event_name,
                payload: event.payload,
                attempts: 0,
                next_attempt_at: 0,
                created_at: event.created_at,
            },
        );

        Ok(id)
    }

    async fn select_ready(&self, now: u64, limit: usize) -> crate::Result<Vec<QueueItem>> {
        let tables = self.tables.read()?;
        let mut ready: Vec<_> = tables
            .queue
            .values()
            .filter(|item| item.is_ready(now))
            .collect();
        ready.sort_by_key(|item| (item.created_at, item.id));

        Ok(page(ready, limit, 0))
    }

    async fn get(&self, id: ItemId) -> crate::Result<Option<QueueItem>> {
        Ok(self.tables.read()?.queue.get(&id).cloned())
    }

    async fn delete(&self, id: ItemId) -> crate::Result<bool> {
        Ok(self.tables.write()?.queue.remove(&id).is_some())
    }

    async fn update_retry(
        &self,
        id: ItemId,
        attempts: u32,
        next_attempt_at: u64,
    ) -> crate::Result<bool> {
        let mut tables = self.tables.write()?;
        let Some(item) = tables.queue.get_mut(&id) else {
            return Ok(false);
        };

        item.attempts = attempts;
        item.next_attempt_at = next_attempt_at;
        Ok(true)
    }

    async fn move_to_deadletter(
        &self,
        item: &QueueItem,
        failure_message: &str,
        now: u64,
    ) -> crate::Result<Option<DeadLetterId>> {
        let mut tables = self.tables.write()?;
        if tables.queue.remove(&item.id).is_none() {
            return Ok(None);
        }

        let id = tables.next_deadletter_id();
        tables.deadletter.insert(
            id,
            DeadLetterItem {
                id,
                destination: item.destination.clone(),
                event_name: item.event_name.clone(),
                payload: item.payload.clone(),
                failure_message: failure_message.to_string(),
                failed_at: now,
            },
        );

        Ok(Some(id))
    }

    async fn count(&self) -> crate::Result<usize> {
        Ok(self.tables.read()?.queue.len())
    }

    async fn list(&self, limit: usize, offset: usize) -> crate::Result<Vec<QueueItem>> {
        let tables = self.tables.read()?;
        let mut rows: Vec<_> = tables.queue.values().collect();
        rows.sort_by_key(|item| std::cmp::Reverse((item.created_at, item.id)));

        Ok(page(rows, limit, offset))
    }

    async fn count_deadletter(&self) -> crate::Result<usize> {
        Ok(self.tables.read()?.deadletter.len())
    }

    async fn list_deadletter(
        &self,
        limit: usize,
        offset: usize,
    ) -> crate::Result<Vec<DeadLetterItem>> {
        let tables = self.tables.read()?;
        let mut rows: Vec<_> = tables.deadletter.values().collect();
        rows.sort_by_key(|item| std::cmp::Reverse((item.failed_at, item.id)));

        Ok(page(rows, limit, offset))
    }

    async fn get_deadletter(&self, id: DeadLetterId) -> crate::Result<Option<DeadLetterItem>> {
        Ok(self.tables.read()?.deadletter.get(&id).cloned())
    }

    async fn retry_deadletter(&self, id: DeadLetterId, now: u64) -> crate::Result<Option<ItemId>> {
        let mut tables = self.tables.write()?;
        let Some(dead) = tables.deadletter.remove(&id) else {
            return Ok(None);
        };

        let item_id = tables.next_item_id();
        tables.queue.insert(
            item_id,
            QueueItem {
                id: item_id,
                destination: dead.destination,
                event_name: dead.event_name,
                payload: dead.payload,
                attempts: 0,
                next_attempt_at: 0,
                created_at: now,
            },
        );

        Ok(Some(item_id))
    }

    async fn delete_deadletter(&self, id: DeadLetterId) -> crate::Result<bool> {
        Ok(self.tables.write()?.deadletter.remove(&id).is_some())
    }

    async fn last_processed(&self) -> crate::Result<Option<u64>> {
        Ok(self.tables.read()?.last_processed)
    }

    async fn set_last_processed(&self, at: u64) -> crate::Result<()> {
        self.tables.write()?.last_processed = Some(at);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn event(destination: &str, created_at: u64) -> NewEvent {
        NewEvent {
            destination: destination.to_string(),
            event_name: "Purchase".to_string(),
            payload: r#"{"value":10}"#.to_string(),
            created_at,
        }
    }

    #[tokio::test]
    async fn ids_are_monotonic() {
        let store = MemoryEventStore::new();
        let a = store.insert(event("meta", 1)).await.expect("insert");
        let b = store.insert(event("meta", 1)).await.expect("insert");
        store.delete(b).await.expect("delete");
        let c = store.insert(event("meta", 1)).await.expect("insert");
        assert!(a < b && b < c);
    }

    #[tokio::test]
    async fn select_ready_is_oldest_first_and_skips_backoff() {
        let store = MemoryEventStore::new();
        let late = store.insert(event("meta", 30)).await.expect("insert");
        let early = store.insert(event("meta", 10)).await.expect("insert");
        let waiting = store.insert(event("meta", 5)).await.expect("insert");
        store.update_retry(waiting, 1, 1_000).await.expect("update");

        let ready: Vec<_> = store
            .select_ready(500, 10)
            .await
            .expect("select")
            .into_iter()
            .map(|item| item.id)
            .collect();
        assert_eq!(ready, vec![early, late]);

        let ready = store.select_ready(1_000, 1).await.expect("select");
        assert_eq!(ready[0].id, waiting);
    }

    #[tokio::test]
    async fn capacity_rejects_inserts() {
        let store = MemoryEventStore::with_capacity(1);
        store.insert(event("meta", 1)).await.expect("insert");
        let err = store.insert(event("meta", 1)).await.expect_err("full");
        assert!(matches!(err, StoreError::CapacityExceeded(1)));
    }

    #[tokio::test]
    async fn deadletter_move_and_retry() {
        let store = MemoryEventStore::new();
        let id = store.insert(event("tiktok", 1)).await.expect("insert");
        let item = store.get(id).await.expect("get").expect("exists");

        let dead = store
            .move_to_deadletter(&item, "HTTP 500", 42)
            .await
            .expect("move")
            .expect("moved");
        assert_eq!(store.count().await.expect("count"), 0);

        let row = store.get_deadletter(dead).await.expect("get").expect("exists");
        assert_eq!(row.payload, item.payload);
        assert_eq!(row.failure_message, "HTTP 500");
        assert_eq!(row.failed_at, 42);

        let requeued = store
            .retry_deadletter(dead, 99)
            .await
            .expect("retry")
            .expect("requeued");
        assert_ne!(requeued, id);
        assert_eq!(store.count_deadletter().await.expect("count"), 0);

        let fresh = store.get(requeued).await.expect("get").expect("exists");
        assert_eq!(fresh.attempts, 0);
        assert_eq!(fresh.created_at, 99);
        assert_eq!(fresh.event_name, "Purchase");
    }

    #[tokio::test]
    async fn moving_a_deleted_item_does_not_revive_it() {
        let store = MemoryEventStore::new();
        let id = store.insert(event("meta", 1)).await.expect("insert");
        let item = store.get(id).await.expect("get").expect("exists");
        assert!(store.delete(id).await.expect("delete"));

        let moved = store.move_to_deadletter(&item, "late", 5).await.expect("move");
        assert_eq!(moved, None);
        assert_eq!(store.count_deadletter().await.expect("count"), 0);
    }

    #[tokio::test]
    async fn missing_rows_report_false() {
        let store = MemoryEventStore::new();
        assert!(!store.delete(7).await.expect("delete"));
        assert!(!store.update_retry(7, 1, 1).await.expect("update"));
        assert!(!store.delete_deadletter(7).await.expect("delete"));
        assert_eq!(store.retry_deadletter(7, 1).await.expect("retry"), None);
    }

    #[tokio::test]
    async fn list_pages_newest_first() {
        let store = MemoryEventStore::new();
        for created_at in 1..=5 {
            store.insert(event("meta", created_at)).await.expect("insert");
        }

        let page: Vec<_> = store
            .list(2, 1)
            .await
            .expect("list")
            .into_iter()
            .map(|item| item.created_at)
            .collect();
        assert_eq!(page, vec![4, 3]);
    }
}
