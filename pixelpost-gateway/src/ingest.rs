//! `POST /v1/events`
//!
//! Accepts an already-hashed event from a browser tag or server integration
//! and queues it for delivery. The body must carry an event name (`event_name`
//! or `event`), an `event_id` and `custom_data`; `destination` defaults to the
//! generic integration.
//!
//! Raw `email` and `phone` values, at the top level or inside `user_data`,
//! are replaced by their SHA-256 hex digests before anything is stored.

use std::net::SocketAddr;

use axum::{
    Json,
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use pixelpost_common::{incoming, time::unix_now};
use pixelpost_delivery::destination::GENERIC;
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};

use crate::GatewayState;

/// Why a request was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Rejection {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
}

impl Rejection {
    const fn new(status: StatusCode, code: &'static str, message: &'static str) -> Self {
        Self {
            status,
            code,
            message,
        }
    }

    const fn bad_request(code: &'static str, message: &'static str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "error": self.code, "message": self.message })),
        )
            .into_response()
    }
}

/// A validated request, ready for the queue.
#[derive(Debug, PartialEq)]
pub(crate) struct Accepted {
    pub destination: String,
    pub event_name: String,
    pub event_id: String,
    pub payload: Map<String, Value>,
}

/// Where the request came from, recorded on the payload.
#[derive(Debug, Clone, Default)]
pub(crate) struct Origin {
    pub client_ip: String,
    pub user_agent: String,
}

impl Origin {
    /// The first `X-Forwarded-For` hop wins over the socket peer. It is used
    /// only to enrich the payload, never for rate limiting.
    fn from_request(headers: &HeaderMap, peer: SocketAddr) -> Self {
        let client_ip = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map_or_else(|| peer.ip().to_string(), ToString::to_string);

        let user_agent = headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        Self {
            client_ip,
            user_agent,
        }
    }
}

fn non_empty(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn sha256_hex(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Swap raw identifiers for `email_hash` / `phone_hash`. Emails are trimmed
/// and lowercased, phones reduced to digits and `+`; a value that normalises
/// to nothing is dropped without a hash.
fn hash_identifiers(fields: &mut Map<String, Value>) {
    if let Some(email) = fields.remove("email") {
        let email = scalar_text(&email).unwrap_or_default().trim().to_lowercase();
        if !email.is_empty() {
            fields.insert("email_hash".to_string(), Value::from(sha256_hex(&email)));
        }
    }

    if let Some(phone) = fields.remove("phone") {
        let phone: String = scalar_text(&phone)
            .unwrap_or_default()
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '+')
            .collect();
        if !phone.is_empty() {
            fields.insert("phone_hash".to_string(), Value::from(sha256_hex(&phone)));
        }
    }
}

pub(crate) fn validate(body: &[u8], origin: &Origin, now: u64) -> Result<Accepted, Rejection> {
    let Ok(Value::Object(mut fields)) = serde_json::from_slice::<Value>(body) else {
        return Err(Rejection::bad_request("invalid_payload", "Invalid JSON payload."));
    };

    let event_name = non_empty(fields.get("event_name"))
        .or_else(|| non_empty(fields.get("event")))
        .ok_or(Rejection::bad_request(
            "missing_event_name",
            "event or event_name is required.",
        ))?;

    let event_id = non_empty(fields.get("event_id")).ok_or(Rejection::bad_request(
        "missing_event_id",
        "event_id is required.",
    ))?;

    if fields.get("custom_data").is_none_or(Value::is_null) {
        return Err(Rejection::bad_request(
            "missing_custom_data",
            "custom_data is required (can be an empty object).",
        ));
    }

    let destination = fields
        .remove("destination")
        .as_ref()
        .and_then(|v| non_empty(Some(v)))
        .unwrap_or_else(|| GENERIC.to_string());

    hash_identifiers(&mut fields);
    if let Some(Value::Object(user_data)) = fields.get_mut("user_data") {
        hash_identifiers(user_data);
    }

    fields.insert("event_name".to_string(), Value::from(event_name.clone()));
    fields.insert("event_id".to_string(), Value::from(event_id.clone()));
    fields
        .entry("event_time")
        .or_insert_with(|| Value::from(now));
    fields.insert("client_ip_address".to_string(), Value::from(origin.client_ip.clone()));
    fields.insert("client_user_agent".to_string(), Value::from(origin.user_agent.clone()));
    fields.insert("received_via".to_string(), Value::from("gateway"));

    Ok(Accepted {
        destination,
        event_name,
        event_id,
        payload: fields,
    })
}

fn authorised(headers: &HeaderMap, expected: Option<&str>) -> bool {
    let Some(expected) = expected else {
        return true;
    };

    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token.trim() == expected)
}

pub(crate) async fn enqueue(
    State(state): State<GatewayState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(wait) = state.limiter.check(peer.ip()) {
        let retry_after = wait.as_secs().max(1).to_string();
        return (
            [(header::RETRY_AFTER, retry_after)],
            Rejection::new(
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                "Too many requests.",
            ),
        )
            .into_response();
    }

    if !authorised(&headers, state.ingest_token.as_deref()) {
        incoming!(level = WARN, client = %peer.ip(), "Rejected ingest request without a valid token");
        return Rejection::new(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "A valid bearer token is required.",
        )
        .into_response();
    }

    let origin = Origin::from_request(&headers, peer);
    let accepted = match validate(&body, &origin, unix_now()) {
        Ok(accepted) => accepted,
        Err(rejection) => {
            incoming!(level = DEBUG, client = %peer.ip(), code = rejection.code, "Rejected ingest request");
            return rejection.into_response();
        }
    };

    let queued = state
        .enqueuer
        .enqueue(&accepted.destination, &accepted.event_name, &accepted.payload)
        .await;

    if queued {
        (
            StatusCode::ACCEPTED,
            Json(json!({ "queued": true, "event_id": accepted.event_id })),
        )
            .into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "queued": false })),
        )
            .into_response()
    }
}
