//! Scheduler timing, run on tokio's paused clock.
#![allow(clippy::expect_used)]

mod support;

use std::{sync::Arc, time::Duration};

use pixelpost_common::{Signal, activity::ActivityLog};
use pixelpost_delivery::{
    DestinationRegistry, Dispatcher, Enqueuer, Scheduler, SchedulerConfig, SchedulerHandle,
};
use pixelpost_store::{EventStore, MemoryEventStore};
use pretty_assertions::assert_eq;
use support::{Outcome, RecordingAdapter, object, purchase};
use tokio::{sync::broadcast, task::JoinHandle};

struct Running {
    handle: SchedulerHandle,
    enqueuer: Enqueuer,
    store: Arc<MemoryEventStore>,
    shutdown: broadcast::Sender<Signal>,
    task: JoinHandle<pixelpost_delivery::Result<()>>,
}

fn start(adapter: Arc<RecordingAdapter>) -> Running {
    let config = SchedulerConfig::default();
    let store = Arc::new(MemoryEventStore::new());
    let shared: Arc<dyn EventStore> = store.clone();
    let activity = Arc::new(ActivityLog::new());
    let (handle, requests) = SchedulerHandle::channel();

    let dispatcher = Arc::new(
        Dispatcher::new(
            Arc::clone(&shared),
            Arc::new(DestinationRegistry::new(adapter)),
            Arc::clone(&activity),
        )
        .with_scheduler(handle.clone(), config.backlog_delay()),
    );
    let enqueuer = Enqueuer::new(shared, activity).with_scheduler(handle.clone(), config.enqueue_delay());

    let (shutdown, rx) = broadcast::channel(1);
    let task = tokio::spawn(Scheduler::new(dispatcher, requests, config, 10).serve(rx));

    Running {
        handle,
        enqueuer,
        store,
        shutdown,
        task,
    }
}

async fn sleep(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

#[tokio::test(start_paused = true)]
async fn enqueue_is_dispatched_shortly_after() {
    let adapter = RecordingAdapter::new("generic");
    let running = start(adapter.clone());

    assert!(running.enqueuer.enqueue("meta", "Purchase", &object(purchase())).await);

    sleep(4).await;
    assert_eq!(adapter.requests(), 0);

    sleep(2).await;
    assert_eq!(adapter.requests(), 1);
    assert_eq!(running.store.count().await.expect("count"), 0);
    assert_eq!(running.handle.runs(), 1);
}

#[tokio::test(start_paused = true)]
async fn bursts_collapse_into_one_pass() {
    let adapter = RecordingAdapter::new("generic");
    let running = start(adapter.clone());

    for name in ["A", "B", "C"] {
        assert!(running.enqueuer.enqueue("meta", name, &object(purchase())).await);
    }
    running.handle.request_run(Duration::from_secs(20));

    sleep(6).await;
    assert_eq!(running.handle.runs(), 1);
    assert_eq!(adapter.requests(), 1);
    assert_eq!(adapter.batches()[0].len(), 3);

    sleep(30).await;
    assert_eq!(running.handle.runs(), 1);
}

#[tokio::test(start_paused = true)]
async fn backlog_requests_another_pass() {
    let adapter = RecordingAdapter::scripted("generic", [Outcome::Status(500)]);
    let running = start(adapter.clone());

    assert!(running.enqueuer.enqueue("meta", "Purchase", &object(purchase())).await);

    sleep(6).await;
    assert_eq!(running.handle.runs(), 1);

    // The failed row is backing off, so the follow-up pass finds nothing
    // ready and does not ask again.
    sleep(30).await;
    assert_eq!(running.handle.runs(), 2);
    assert_eq!(adapter.requests(), 1);

    sleep(60).await;
    assert_eq!(running.handle.runs(), 2);
}

#[tokio::test(start_paused = true)]
async fn safety_pass_runs_without_requests() {
    let running = start(RecordingAdapter::new("generic"));

    sleep(299).await;
    assert_eq!(running.handle.runs(), 0);

    sleep(2).await;
    assert_eq!(running.handle.runs(), 1);

    sleep(3600).await;
    assert_eq!(running.handle.runs(), 2);
}

#[tokio::test(start_paused = true)]
async fn stops_on_shutdown() {
    let running = start(RecordingAdapter::new("generic"));

    running.shutdown.send(Signal::Shutdown).expect("send shutdown");
    running
        .task
        .await
        .expect("scheduler task")
        .expect("clean shutdown");

    running.handle.request_run(Duration::ZERO);
    assert_eq!(running.handle.runs(), 0);
}
