//! Batch dispatcher.
//!
//! One pass reads up to `limit` ready rows, groups them by destination and
//! sends one batch per group. Groups are sent concurrently and settled
//! independently: a failing destination never affects another group.

use std::{sync::Arc, time::Duration};

use pixelpost_common::{activity::ActivityLog, internal, time::unix_now};
use pixelpost_store::{EventStore, QueueItem};
use tokio::{sync::Mutex, task::JoinHandle};

use crate::{
    DeliveryError, RetryDecision, RetryPolicy, SchedulerHandle,
    destination::{DestinationRegistry, DestinationResponse, GENERIC, OutboundEvent},
};

const DEFAULT_BACKLOG_DELAY: Duration = Duration::from_secs(30);

/// Rows sharing one destination, in creation order.
#[derive(Debug)]
struct Group {
    destination: String,
    items: Vec<QueueItem>,
}

/// Stable grouping: groups appear in the order their first row was created
/// and rows keep their relative order within a group.
fn group_by_destination(items: Vec<QueueItem>) -> Vec<Group> {
    let mut groups: Vec<Group> = Vec::new();

    for item in items {
        let destination = if item.destination.is_empty() {
            GENERIC.to_string()
        } else {
            item.destination.clone()
        };

        match groups.iter_mut().find(|g| g.destination == destination) {
            Some(group) => group.items.push(item),
            None => groups.push(Group {
                destination,
                items: vec![item],
            }),
        }
    }

    groups
}

#[derive(Debug)]
pub struct Dispatcher {
    store: Arc<dyn EventStore>,
    registry: Arc<DestinationRegistry>,
    policy: RetryPolicy,
    activity: Arc<ActivityLog>,
    scheduler: Option<SchedulerHandle>,
    backlog_delay: Duration,
    /// Held for a whole pass so a forced run cannot overlap a scheduled one.
    running: Mutex<()>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(store: Arc<dyn EventStore>, registry: Arc<DestinationRegistry>, activity: Arc<ActivityLog>) -> Self {
        Self {
            store,
            registry,
            policy: RetryPolicy::default(),
            activity,
            scheduler: None,
            backlog_delay: DEFAULT_BACKLOG_DELAY,
            running: Mutex::new(()),
        }
    }

    #[must_use]
    pub const fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Ask `scheduler` for another pass `backlog_delay` after any pass that
    /// leaves rows behind.
    #[must_use]
    pub fn with_scheduler(mut self, scheduler: SchedulerHandle, backlog_delay: Duration) -> Self {
        self.scheduler = Some(scheduler);
        self.backlog_delay = backlog_delay;
        self
    }

    /// Run one pass at the current time.
    pub async fn process(&self, limit: usize) -> crate::Result<usize> {
        self.process_at(limit, unix_now()).await
    }

    /// Run one pass as if the clock read `now`.
    ///
    /// Returns the number of rows handled, delivered or not. Only a failure
    /// to read the queue is an error; everything that goes wrong for a row
    /// ends in a reschedule or a dead-letter move.
    pub async fn process_at(&self, limit: usize, now: u64) -> crate::Result<usize> {
        let _running = self.running.lock().await;

        let ready = self.store.select_ready(now, limit).await?;
        if ready.is_empty() {
            return Ok(0);
        }

        let groups = group_by_destination(ready);
        internal!(
            level = DEBUG,
            "Dispatching {} events across {} destinations",
            groups.iter().map(|g| g.items.len()).sum::<usize>(),
            groups.len()
        );

        let sends: Vec<JoinHandle<crate::Result<DestinationResponse>>> = groups
            .iter()
            .map(|group| {
                let adapter = self.registry.resolve(&group.destination);
                let events: Vec<OutboundEvent> = group.items.iter().map(OutboundEvent::from_item).collect();
                tokio::spawn(async move { adapter.send_batch(&events).await })
            })
            .collect();

        let mut processed = 0;
        for (group, send) in groups.iter().zip(sends) {
            let outcome = match send.await {
                Ok(result) => result.and_then(DestinationResponse::into_result),
                Err(e) => Err(DeliveryError::Transport(format!("send task failed: {e}"))),
            };

            processed += match outcome {
                Ok(_) => self.settle_success(group).await,
                Err(e) => self.settle_failure(group, &e, now).await,
            };
        }

        if let Err(e) = self.store.set_last_processed(now).await {
            tracing::error!(error = %e, "Failed to record last processed time");
        }

        match self.store.count().await {
            Ok(0) => {}
            Ok(remaining) => {
                if let Some(scheduler) = &self.scheduler {
                    tracing::debug!(remaining, delay = ?self.backlog_delay, "Backlog remains, requesting another pass");
                    scheduler.request_run(self.backlog_delay);
                }
            }
            Err(e) => tracing::error!(error = %e, "Failed to count remaining queue rows"),
        }

        Ok(processed)
    }

    async fn settle_success(&self, group: &Group) -> usize {
        let mut deleted = 0;
        for item in &group.items {
            match self.store.delete(item.id).await {
                Ok(_) => deleted += 1,
                Err(e) => {
                    self.activity
                        .error(format!("Failed to remove delivered item {}: {e}", item.id));
                }
            }
        }

        self.activity.info(format!(
            "Delivered {} events to {}",
            group.items.len(),
            group.destination
        ));
        deleted
    }

    async fn settle_failure(&self, group: &Group, error: &DeliveryError, now: u64) -> usize {
        let message = error.failure_message();

        if error.is_configuration() {
            self.activity.error(format!(
                "Configuration error for {}: {message} ({} events will be retried)",
                group.destination,
                group.items.len()
            ));
        } else {
            self.activity.error(format!(
                "Delivery to {} failed for {} events: {message}",
                group.destination,
                group.items.len()
            ));
        }

        if let DeliveryError::Rejected { body, .. } = error {
            tracing::debug!(destination = %group.destination, body = %body, "Destination rejected batch");
        }

        let mut settled = 0;
        for item in &group.items {
            match self.apply_policy(item, &message, now).await {
                Ok(()) => settled += 1,
                Err(e) => {
                    self.activity
                        .error(format!("Failed to update item {} after delivery failure: {e}", item.id));
                }
            }
        }
        settled
    }

    async fn apply_policy(&self, item: &QueueItem, message: &str, now: u64) -> crate::Result<()> {
        match self.policy.on_failure(item.attempts, now) {
            RetryDecision::Reschedule {
                attempts,
                next_attempt_at,
            } => {
                self.store.update_retry(item.id, attempts, next_attempt_at).await?;
                self.activity.warn(format!(
                    "Retry scheduled for item {} ({}): attempt {attempts}, next in {}s",
                    item.id,
                    item.destination,
                    self.policy.delay_secs(attempts)
                ));
            }
            RetryDecision::DeadLetter { attempts } => {
                if self.store.move_to_deadletter(item, message, now).await?.is_some() {
                    self.activity.error(format!(
                        "Moved item {} ({}) to dead-letter after {attempts} attempts: {message}",
                        item.id, item.destination
                    ));
                }
            }
        }

        Ok(())
    }
}
