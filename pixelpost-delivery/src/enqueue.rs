use std::{sync::Arc, time::Duration};

use pixelpost_common::{activity::ActivityLog, incoming, time::unix_now};
use pixelpost_store::{EventStore, NewEvent};
use serde_json::{Map, Value};

use crate::SchedulerHandle;

/// Longest destination name kept on a queue row.
pub const MAX_DESTINATION_CHARS: usize = 50;

/// Longest event name kept on a queue row.
pub const MAX_EVENT_NAME_CHARS: usize = 191;

const DEFAULT_RUN_DELAY: Duration = Duration::from_secs(5);

fn truncate(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

/// Accepts events into the queue.
#[derive(Debug, Clone)]
pub struct Enqueuer {
    store: Arc<dyn EventStore>,
    scheduler: Option<SchedulerHandle>,
    activity: Arc<ActivityLog>,
    run_delay: Duration,
}

impl Enqueuer {
    #[must_use]
    pub const fn new(store: Arc<dyn EventStore>, activity: Arc<ActivityLog>) -> Self {
        Self {
            store,
            scheduler: None,
            activity,
            run_delay: DEFAULT_RUN_DELAY,
        }
    }

    /// Request a pass `run_delay` after each successful enqueue.
    #[must_use]
    pub fn with_scheduler(mut self, scheduler: SchedulerHandle, run_delay: Duration) -> Self {
        self.scheduler = Some(scheduler);
        self.run_delay = run_delay;
        self
    }

    /// Queue an event for delivery. `false` means nothing was stored.
    pub async fn enqueue(&self, destination: &str, event_name: &str, payload: &Map<String, Value>) -> bool {
        self.enqueue_at(destination, event_name, payload, unix_now()).await
    }

    pub async fn enqueue_at(
        &self,
        destination: &str,
        event_name: &str,
        payload: &Map<String, Value>,
        now: u64,
    ) -> bool {
        // serde_json keeps object keys sorted, so equal payloads serialize identically
        let payload = match serde_json::to_string(payload) {
            Ok(payload) => payload,
            Err(e) => {
                self.activity
                    .error(format!("Failed to serialize payload for {destination}: {e}"));
                return false;
            }
        };

        let event = NewEvent {
            destination: truncate(destination, MAX_DESTINATION_CHARS),
            event_name: truncate(event_name, MAX_EVENT_NAME_CHARS),
            payload,
            created_at: now,
        };

        match self.store.insert(event).await {
            Ok(id) => {
                incoming!(level = DEBUG, item_id = id, destination, event_name, "Event queued");
                if let Some(scheduler) = &self.scheduler {
                    scheduler.request_run(self.run_delay);
                }
                true
            }
            Err(e) => {
                self.activity
                    .error(format!("Failed to queue {event_name} for {destination}: {e}"));
                false
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use pixelpost_store::MemoryEventStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn payload() -> Map<String, Value> {
        json!({"value": 10, "currency": "USD"})
            .as_object()
            .cloned()
            .expect("object")
    }

    #[tokio::test]
    async fn inserts_pending_row_and_requests_run() {
        let store = Arc::new(MemoryEventStore::new());
        let (handle, _requests) = SchedulerHandle::channel();
        let enqueuer = Enqueuer::new(store.clone(), Arc::new(ActivityLog::new()))
            .with_scheduler(handle, Duration::from_secs(5));

        assert!(enqueuer.enqueue_at("meta", "Purchase", &payload(), 1_000).await);

        let rows = store.select_ready(1_000, 10).await.expect("select");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].attempts, 0);
        assert_eq!(rows[0].next_attempt_at, 0);
        assert_eq!(rows[0].created_at, 1_000);
        assert_eq!(rows[0].payload, r#"{"currency":"USD","value":10}"#);
    }

    #[tokio::test]
    async fn long_names_are_truncated() {
        let store = Arc::new(MemoryEventStore::new());
        let enqueuer = Enqueuer::new(store.clone(), Arc::new(ActivityLog::new()));

        let destination = "d".repeat(80);
        let event_name = "é".repeat(300);
        assert!(enqueuer.enqueue_at(&destination, &event_name, &Map::new(), 1).await);

        let row = &store.list(1, 0).await.expect("list")[0];
        assert_eq!(row.destination.chars().count(), MAX_DESTINATION_CHARS);
        assert_eq!(row.event_name.chars().count(), MAX_EVENT_NAME_CHARS);
    }

    #[tokio::test]
    async fn store_failure_returns_false() {
        let store = Arc::new(MemoryEventStore::with_capacity(1));
        let activity = Arc::new(ActivityLog::new());
        let enqueuer = Enqueuer::new(store.clone(), activity.clone());

        assert!(enqueuer.enqueue_at("meta", "A", &payload(), 1).await);
        assert!(!enqueuer.enqueue_at("meta", "B", &payload(), 2).await);
        assert_eq!(store.count().await.expect("count"), 1);
        assert_eq!(activity.len(), 1);
    }
}
