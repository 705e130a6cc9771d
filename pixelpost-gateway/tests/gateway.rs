//! Routes driven in-process through the router
#![allow(clippy::expect_used)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Router,
    body::{Body, to_bytes},
    extract::connect_info::MockConnectInfo,
    http::{Request, StatusCode, header},
    response::Response,
};
use pixelpost_common::activity::ActivityLog;
use pixelpost_delivery::{
    Dispatcher, DestinationsConfig, Enqueuer, QueueService,
    destination::config::EnabledDestinations,
};
use pixelpost_gateway::{GatewayConfig, GatewayServer, GatewayState, RateLimitConfig};
use pixelpost_store::{EventStore, MemoryEventStore};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tower::ServiceExt;

struct Fixture {
    store: Arc<MemoryEventStore>,
    activity: Arc<ActivityLog>,
    router: Router,
}

impl Fixture {
    fn new(config: &GatewayConfig) -> Self {
        Self::with_store(config, MemoryEventStore::new())
    }

    fn with_store(config: &GatewayConfig, store: MemoryEventStore) -> Self {
        let store = Arc::new(store);
        let activity = Arc::new(ActivityLog::new());
        let registry = DestinationsConfig::default()
            .build_registry(Duration::from_secs(1))
            .expect("registry");
        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            Arc::new(registry),
            activity.clone(),
        ));
        let service = Arc::new(QueueService::new(store.clone(), dispatcher, activity.clone()));
        let enqueuer = Enqueuer::new(store.clone(), activity.clone());

        let destinations = EnabledDestinations {
            meta: true,
            ..EnabledDestinations::default()
        };
        let state = GatewayState::new(enqueuer, service, destinations, config);
        let router = GatewayServer::router(state)
            .layer(MockConnectInfo(SocketAddr::from(([192, 0, 2, 10], 40_000))));

        Self {
            store,
            activity,
            router,
        }
    }

    async fn call(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.expect("infallible")
    }
}

fn post(body: &Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::post("/v1/events").header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn get(path: &str) -> Request<Body> {
    Request::get(path).body(Body::empty()).expect("request")
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

fn purchase() -> Value {
    json!({
        "destination": "meta",
        "event_name": "Purchase",
        "event_id": "order-1",
        "custom_data": {"value": 10, "currency": "USD"},
        "user_data": {"email_hash": "abc"},
    })
}

#[tokio::test]
async fn accepted_events_are_queued() {
    let fixture = Fixture::new(&GatewayConfig::default());

    let response = fixture.call(post(&purchase(), None)).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(
        json_body(response).await,
        json!({"queued": true, "event_id": "order-1"})
    );

    let rows = fixture.store.list(10, 0).await.expect("list");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].destination, "meta");
    assert_eq!(rows[0].event_name, "Purchase");

    let payload: Value = serde_json::from_str(&rows[0].payload).expect("payload");
    assert_eq!(payload["user_data"]["email_hash"], "abc");
    assert_eq!(payload["client_ip_address"], "192.0.2.10");
}

#[tokio::test]
async fn raw_identifiers_never_reach_the_queue() {
    let fixture = Fixture::new(&GatewayConfig::default());

    let body = json!({
        "destination": "meta",
        "event_name": "Lead",
        "event_id": "lead-1",
        "custom_data": {},
        "email": "Alice@Example.com",
        "phone": "+1 555 0100",
        "user_data": {"email": "bob@example.com"},
    });
    assert_eq!(fixture.call(post(&body, None)).await.status(), StatusCode::ACCEPTED);

    let rows = fixture.store.list(10, 0).await.expect("list");
    assert_eq!(rows.len(), 1);
    for raw in ["Alice@Example.com", "bob@example.com", "+1 555 0100"] {
        assert!(!rows[0].payload.contains(raw), "{raw} was stored");
    }

    let payload: Value = serde_json::from_str(&rows[0].payload).expect("payload");
    assert_eq!(
        payload["email_hash"],
        "ff8d9819fc0e12bf0d24892e45987e249a28dce836a85cad60e28eaaa8c6d976"
    );
    assert_eq!(
        payload["phone_hash"],
        "602cd7fbbe41688e2d90224bcac362db2f1ff2e2ba7487d8585c9ce226cb6d00"
    );
    assert_eq!(
        payload["user_data"],
        json!({"email_hash": "5ff860bf1190596c7188ab851db691f0f3169c453936e9e1eba2f9a47f7a0018"})
    );
}

#[tokio::test]
async fn missing_fields_are_rejected() {
    let fixture = Fixture::new(&GatewayConfig::default());

    let response = fixture
        .call(post(&json!({"event_name": "Lead", "custom_data": {}}), None))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "missing_event_id");
    assert_eq!(fixture.store.count().await.expect("count"), 0);
}

#[tokio::test]
async fn token_is_required_when_configured() {
    let config = GatewayConfig {
        ingest_token: Some("secret".to_string()),
        ..GatewayConfig::default()
    };
    let fixture = Fixture::new(&config);

    let response = fixture.call(post(&purchase(), None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = fixture.call(post(&purchase(), Some("wrong"))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = fixture.call(post(&purchase(), Some("secret"))).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn clients_are_rate_limited() {
    let config = GatewayConfig {
        rate_limit: RateLimitConfig {
            burst: 2,
            per_second: 0.01,
        },
        ..GatewayConfig::default()
    };
    let fixture = Fixture::new(&config);

    for _ in 0..2 {
        let response = fixture.call(post(&purchase(), None)).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    let response = fixture.call(post(&purchase(), None)).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));
    assert_eq!(fixture.store.count().await.expect("count"), 2);
}

#[tokio::test]
async fn store_failure_is_unavailable() {
    let fixture = Fixture::with_store(&GatewayConfig::default(), MemoryEventStore::with_capacity(0));

    let response = fixture.call(post(&purchase(), None)).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(response).await, json!({"queued": false}));
    assert!(!fixture.activity.is_empty());
}

#[tokio::test]
async fn probes_answer() {
    let fixture = Fixture::new(&GatewayConfig::default());

    assert_eq!(fixture.call(get("/health/live")).await.status(), StatusCode::OK);
    assert_eq!(fixture.call(get("/health/ready")).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn health_reports_queue_and_activity() {
    let fixture = Fixture::new(&GatewayConfig::default());
    fixture.call(post(&purchase(), None)).await;
    fixture.activity.info("Sent 1 event(s) to meta");

    let response = fixture.call(get("/health")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let report = json_body(response).await;
    assert_eq!(report["queue_length"], 1);
    assert_eq!(report["deadletter_length"], 0);
    assert_eq!(report["last_processed"], Value::Null);
    assert_eq!(report["destinations"]["meta"], true);
    assert_eq!(report["destinations"]["tiktok"], false);
    assert_eq!(report["recent_logs"][0]["message"], "Sent 1 event(s) to meta");
    assert!(report["timestamp"].as_str().is_some_and(|t| t.ends_with('Z')));
}
