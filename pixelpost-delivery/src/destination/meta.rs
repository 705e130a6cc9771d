//! Meta Conversions API.

use async_trait::async_trait;
use pixelpost_common::time::unix_now;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::destination::{
    DestinationAdapter, DestinationResponse, OutboundEvent,
    event::hashed_user_data,
    http::{Auth, HttpSender},
};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MetaConfig {
    #[serde(default = "super::config::enabled")]
    pub enabled: bool,
    pub pixel_id: String,
    #[serde(default)]
    pub access_token: Option<String>,
    /// Graph API base, without the pixel path
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

fn default_endpoint() -> String {
    "https://graph.facebook.com/v17.0".to_string()
}

#[derive(Debug, Serialize)]
struct MetaBatch {
    data: Vec<MetaEvent>,
}

#[derive(Debug, Serialize)]
struct MetaEvent {
    event_name: String,
    event_time: u64,
    event_id: String,
    action_source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    event_source_url: Option<String>,
    user_data: Map<String, Value>,
    custom_data: Map<String, Value>,
}

impl MetaEvent {
    fn from_event(event: &OutboundEvent, now: u64) -> Self {
        Self {
            event_name: event.name().to_string(),
            event_time: event.event_time(now),
            event_id: event.event_id("ev_"),
            action_source: event
                .payload
                .get("action_source")
                .and_then(Value::as_str)
                .unwrap_or("website")
                .to_string(),
            event_source_url: event.source_url(),
            user_data: hashed_user_data(event.user_data()),
            custom_data: event.custom_data(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetaAdapter {
    config: MetaConfig,
    http: HttpSender,
}

impl MetaAdapter {
    #[must_use]
    pub const fn new(config: MetaConfig, http: HttpSender) -> Self {
        Self { config, http }
    }

    fn url(&self) -> String {
        format!(
            "{}/{}/events",
            self.config.endpoint.trim_end_matches('/'),
            self.config.pixel_id
        )
    }

    fn body(events: &[OutboundEvent], now: u64) -> Value {
        let batch = MetaBatch {
            data: events.iter().map(|e| MetaEvent::from_event(e, now)).collect(),
        };
        serde_json::to_value(batch).unwrap_or_default()
    }
}

#[async_trait]
impl DestinationAdapter for MetaAdapter {
    fn name(&self) -> &str {
        "meta"
    }

    async fn send_batch(&self, events: &[OutboundEvent]) -> crate::Result<DestinationResponse> {
        let body = Self::body(events, unix_now());
        self.http
            .post_json(
                &self.url(),
                Auth::bearer(self.config.access_token.as_deref()),
                &body,
                None,
            )
            .await
    }
}
