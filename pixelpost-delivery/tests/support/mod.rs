#![allow(dead_code, clippy::expect_used, clippy::panic)]

use std::{
    collections::VecDeque,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    Router,
    extract::State,
    http::{HeaderMap, StatusCode, Uri},
    routing::post,
};
use pixelpost_common::activity::ActivityLog;
use pixelpost_delivery::{
    DeliveryError, DestinationAdapter, DestinationRegistry, DestinationResponse, Dispatcher,
    Enqueuer, OutboundEvent,
};
use pixelpost_store::{EventStore, MemoryEventStore};
use serde_json::{Map, Value, json};

/// What a [`RecordingAdapter`] does with its next batch.
#[derive(Debug, Clone)]
pub enum Outcome {
    Status(u16),
    Transport(&'static str),
    Misconfigured(&'static str),
}

/// Records every batch it is handed and answers from a script, falling
/// back to `200` once the script runs out.
#[derive(Debug)]
pub struct RecordingAdapter {
    name: &'static str,
    batches: Mutex<Vec<Vec<OutboundEvent>>>,
    script: Mutex<VecDeque<Outcome>>,
    latency: Duration,
}

impl RecordingAdapter {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            batches: Mutex::new(Vec::new()),
            script: Mutex::new(VecDeque::new()),
            latency: Duration::ZERO,
        })
    }

    /// Answers `200` after holding every request for `latency`.
    pub fn slow(name: &'static str, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            name,
            batches: Mutex::new(Vec::new()),
            script: Mutex::new(VecDeque::new()),
            latency,
        })
    }

    pub fn scripted(name: &'static str, outcomes: impl IntoIterator<Item = Outcome>) -> Arc<Self> {
        let adapter = Self::new(name);
        adapter.script.lock().expect("script lock").extend(outcomes);
        adapter
    }

    pub fn batches(&self) -> Vec<Vec<OutboundEvent>> {
        self.batches.lock().expect("batches lock").clone()
    }

    pub fn requests(&self) -> usize {
        self.batches.lock().expect("batches lock").len()
    }
}

#[async_trait]
impl DestinationAdapter for RecordingAdapter {
    fn name(&self) -> &str {
        self.name
    }

    async fn send_batch(&self, events: &[OutboundEvent]) -> pixelpost_delivery::Result<DestinationResponse> {
        self.batches.lock().expect("batches lock").push(events.to_vec());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let outcome = self
            .script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or(Outcome::Status(200));

        match outcome {
            Outcome::Status(status) => Ok(DestinationResponse {
                status,
                body: String::new(),
            }),
            Outcome::Transport(message) => Err(DeliveryError::Transport(message.to_string())),
            Outcome::Misconfigured(message) => Err(DeliveryError::Configuration(message.to_string())),
        }
    }
}

/// A memory store, a dispatcher over `registry` and an enqueuer sharing them.
pub struct Harness {
    pub store: Arc<MemoryEventStore>,
    pub activity: Arc<ActivityLog>,
    pub dispatcher: Arc<Dispatcher>,
    pub enqueuer: Enqueuer,
}

impl Harness {
    pub fn new(registry: DestinationRegistry) -> Self {
        let store = Arc::new(MemoryEventStore::new());
        let activity = Arc::new(ActivityLog::new());
        let shared: Arc<dyn EventStore> = store.clone();

        Self {
            dispatcher: Arc::new(Dispatcher::new(
                Arc::clone(&shared),
                Arc::new(registry),
                Arc::clone(&activity),
            )),
            enqueuer: Enqueuer::new(shared, Arc::clone(&activity)),
            store,
            activity,
        }
    }

    pub async fn enqueue(&self, destination: &str, event_name: &str, payload: Value, now: u64) {
        let Value::Object(payload) = payload else {
            panic!("payload must be an object");
        };
        assert!(
            self.enqueuer
                .enqueue_at(destination, event_name, &payload, now)
                .await
        );
    }

    pub async fn queue_len(&self) -> usize {
        self.store.count().await.expect("count")
    }

    pub async fn deadletter_len(&self) -> usize {
        self.store.count_deadletter().await.expect("count")
    }
}

pub fn purchase() -> Value {
    json!({"value": 10, "currency": "USD"})
}

pub fn object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().expect("object")
}

/// A request seen by [`MockEndpoint`].
#[derive(Debug, Clone)]
pub struct Captured {
    pub path: String,
    pub headers: HeaderMap,
    pub body: Value,
}

#[derive(Debug, Clone)]
struct MockState {
    status: StatusCode,
    captured: Arc<Mutex<Vec<Captured>>>,
}

/// An HTTP endpoint that accepts any POST, records it and replies with a fixed status.
pub struct MockEndpoint {
    pub addr: SocketAddr,
    captured: Arc<Mutex<Vec<Captured>>>,
}

impl MockEndpoint {
    pub async fn start(status: u16) -> Self {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let state = MockState {
            status: StatusCode::from_u16(status).expect("valid status"),
            captured: Arc::clone(&captured),
        };

        let app = Router::new()
            .route("/{*path}", post(capture))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock endpoint");
        let addr = listener.local_addr().expect("local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock endpoint");
        });

        Self { addr, captured }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn requests(&self) -> Vec<Captured> {
        self.captured.lock().expect("captured lock").clone()
    }
}

async fn capture(State(state): State<MockState>, uri: Uri, headers: HeaderMap, body: String) -> (StatusCode, &'static str) {
    state.captured.lock().expect("captured lock").push(Captured {
        path: uri.path().to_string(),
        headers,
        body: serde_json::from_str(&body).unwrap_or(Value::Null),
    });
    (state.status, "{}")
}
