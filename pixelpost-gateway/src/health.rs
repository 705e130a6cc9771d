use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use pixelpost_common::{
    activity::LogEntry,
    time::{rfc3339, unix_now},
};
use pixelpost_delivery::destination::config::EnabledDestinations;
use serde::Serialize;

use crate::GatewayState;

/// Activity entries included in the status report
const RECENT_LOGS: usize = 10;

#[derive(Debug, Serialize)]
pub(crate) struct HealthReport {
    pub queue_length: usize,
    pub deadletter_length: usize,
    /// RFC 3339, `null` before the first dispatch pass
    pub last_processed: Option<String>,
    pub destinations: EnabledDestinations,
    pub recent_logs: Vec<LogEntry>,
    pub timestamp: String,
}

/// Answers as long as the process can serve HTTP.
pub(crate) async fn live() -> Response {
    (StatusCode::OK, "OK").into_response()
}

/// Ready once the event store answers queries.
pub(crate) async fn ready(State(state): State<GatewayState>) -> Response {
    match state.service.status().await {
        Ok(_) => (StatusCode::OK, "OK").into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness probe failed");
            (StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable").into_response()
        }
    }
}

pub(crate) async fn report(State(state): State<GatewayState>) -> Response {
    let status = match state.service.status().await {
        Ok(status) => status,
        Err(e) => {
            tracing::warn!(error = %e, "Health report unavailable");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response();
        }
    };

    Json(HealthReport {
        queue_length: status.queue_length,
        deadletter_length: status.deadletter_length,
        last_processed: status.last_processed.and_then(rfc3339),
        destinations: state.destinations,
        recent_logs: state.service.logs(RECENT_LOGS),
        timestamp: rfc3339(unix_now()).unwrap_or_default(),
    })
    .into_response()
}
