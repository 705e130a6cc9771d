//! Management operations over the queue.
//!
//! Every write is idempotent at this level: acting on an id that no longer
//! exists returns `false` (or `None`) rather than an error.

use std::{sync::Arc, time::Duration};

use pixelpost_common::activity::{ActivityLog, LogEntry};
use pixelpost_store::{DeadLetterId, DeadLetterItem, EventStore, ItemId, QueueItem};
use serde::{Deserialize, Serialize};

use crate::{Dispatcher, SchedulerHandle};

/// Characters of payload shown in listings.
pub const PREVIEW_CHARS: usize = 200;

const RETRY_RUN_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub queue_length: usize,
    pub deadletter_length: usize,
    /// Epoch seconds of the last dispatch pass
    pub last_processed: Option<u64>,
}

/// A queue row as shown to operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: ItemId,
    pub destination: String,
    pub event_name: String,
    pub attempts: u32,
    pub next_attempt_at: u64,
    pub created_at: u64,
    pub preview: String,
}

impl From<QueueItem> for QueueEntry {
    fn from(item: QueueItem) -> Self {
        Self {
            preview: item.preview(PREVIEW_CHARS),
            id: item.id,
            destination: item.destination,
            event_name: item.event_name,
            attempts: item.attempts,
            next_attempt_at: item.next_attempt_at,
            created_at: item.created_at,
        }
    }
}

/// A dead-letter row as shown to operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub id: DeadLetterId,
    pub destination: String,
    pub event_name: String,
    pub failure_message: String,
    pub failed_at: u64,
    pub preview: String,
}

impl From<DeadLetterItem> for DeadLetterEntry {
    fn from(item: DeadLetterItem) -> Self {
        Self {
            preview: item.preview(PREVIEW_CHARS),
            id: item.id,
            destination: item.destination,
            event_name: item.event_name,
            failure_message: item.failure_message,
            failed_at: item.failed_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueService {
    store: Arc<dyn EventStore>,
    dispatcher: Arc<Dispatcher>,
    activity: Arc<ActivityLog>,
    scheduler: Option<SchedulerHandle>,
}

impl QueueService {
    #[must_use]
    pub const fn new(store: Arc<dyn EventStore>, dispatcher: Arc<Dispatcher>, activity: Arc<ActivityLog>) -> Self {
        Self {
            store,
            dispatcher,
            activity,
            scheduler: None,
        }
    }

    /// Retried rows are picked up by a pass requested through `scheduler`.
    #[must_use]
    pub fn with_scheduler(mut self, scheduler: SchedulerHandle) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    fn request_run(&self) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.request_run(RETRY_RUN_DELAY);
        }
    }

    pub async fn status(&self) -> crate::Result<QueueStatus> {
        Ok(QueueStatus {
            queue_length: self.store.count().await?,
            deadletter_length: self.store.count_deadletter().await?,
            last_processed: self.store.last_processed().await?,
        })
    }

    pub async fn list_queue(&self, limit: usize, offset: usize) -> crate::Result<Vec<QueueEntry>> {
        let items = self.store.list(limit, offset).await?;
        Ok(items.into_iter().map(QueueEntry::from).collect())
    }

    /// Make a queued row eligible immediately with a fresh retry budget.
    pub async fn retry_item(&self, id: ItemId) -> crate::Result<bool> {
        let reset = self.store.update_retry(id, 0, 0).await?;
        if reset {
            self.activity.info(format!("Item {id} reset for immediate retry"));
            self.request_run();
        }
        Ok(reset)
    }

    pub async fn delete_item(&self, id: ItemId) -> crate::Result<bool> {
        let deleted = self.store.delete(id).await?;
        if deleted {
            self.activity.info(format!("Item {id} deleted from queue"));
        }
        Ok(deleted)
    }

    pub async fn list_deadletter(&self, limit: usize, offset: usize) -> crate::Result<Vec<DeadLetterEntry>> {
        let items = self.store.list_deadletter(limit, offset).await?;
        Ok(items.into_iter().map(DeadLetterEntry::from).collect())
    }

    /// Move a dead-letter row back into the queue. Returns the new queue id.
    pub async fn retry_deadletter(&self, id: DeadLetterId) -> crate::Result<Option<ItemId>> {
        let requeued = self
            .store
            .retry_deadletter(id, pixelpost_common::time::unix_now())
            .await?;

        if let Some(item_id) = requeued {
            self.activity
                .info(format!("Dead-letter {id} requeued as item {item_id}"));
            self.request_run();
        }
        Ok(requeued)
    }

    pub async fn delete_deadletter(&self, id: DeadLetterId) -> crate::Result<bool> {
        let deleted = self.store.delete_deadletter(id).await?;
        if deleted {
            self.activity.info(format!("Dead-letter {id} deleted"));
        }
        Ok(deleted)
    }

    /// Newest first.
    #[must_use]
    pub fn logs(&self, limit: usize) -> Vec<LogEntry> {
        self.activity.recent(limit)
    }

    /// Run a dispatch pass now, waiting for any pass already in progress.
    pub async fn process_now(&self, limit: usize) -> crate::Result<usize> {
        let processed = self.dispatcher.process(limit).await?;
        self.activity
            .info(format!("Manual processing handled {processed} events"));
        Ok(processed)
    }
}
