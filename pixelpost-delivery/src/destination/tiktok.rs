//! TikTok Events API.

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
pub struct TikTokConfig {
    #[serde(default = "super::config::enabled")]
    pub enabled: bool,
    pub pixel_id: String,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

fn default_endpoint() -> String {
    "https://business-api.tiktok.com/open_api/v1.2/pixel/track/".to_string()
}

#[derive(Debug, Serialize)]
struct TikTokBatch<'a> {
    pixel_code: &'a str,
    event_list: Vec<TikTokEvent>,
}

#[derive(Debug, Serialize)]
struct TikTokEvent {
    event: String,
    event_time: u64,
    event_id: String,
    properties: Map<String, Value>,
    user: Map<String, Value>,
}

impl TikTokEvent {
    fn from_event(event: &OutboundEvent, now: u64) -> Self {
        let mut properties = event.custom_data();
        if !properties.contains_key("url")
            && let Some(url) = event.source_url()
        {
            properties.insert("url".to_string(), Value::String(url));
        }

        Self {
            event: event.name().to_string(),
            event_time: event.event_time(now),
            event_id: event.event_id("ev_"),
            properties,
            user: hashed_user_data(event.user_data()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TikTokAdapter {
    config: TikTokConfig,
    http: HttpSender,
}

impl TikTokAdapter {
    #[must_use]
    pub const fn new(config: TikTokConfig, http: HttpSender) -> Self {
        Self { config, http }
    }

    fn body(&self, events: &[OutboundEvent], now: u64) -> Value {
        let batch = TikTokBatch {
            pixel_code: &self.config.pixel_id,
            event_list: events.iter().map(|e| TikTokEvent::from_event(e, now)).collect(),
        };
        serde_json::to_value(batch).unwrap_or_default()
    }
}

#[async_trait]
impl DestinationAdapter for TikTokAdapter {
    fn name(&self) -> &str {
        "tiktok"
    }

    async fn send_batch(&self, events: &[OutboundEvent]) -> crate::Result<DestinationResponse> {
        let body = self.body(events, unix_now());
        let auth = self
            .config
            .access_token
            .as_deref()
            .filter(|token| !token.is_empty())
            .map_or(Auth::None, |token| Auth::Header("Access-Token", token));

        self.http
            .post_json(&self.config.endpoint, auth, &body, None)
            .await
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn builds_event_list_with_pixel_code() {
        let adapter = TikTokAdapter::new(
            TikTokConfig {
                enabled: true,
                pixel_id: "TT123".to_string(),
                access_token: Some("secret".to_string()),
                endpoint: default_endpoint(),
            },
            HttpSender::new(Duration::from_secs(1)).expect("client"),
        );

        let event = OutboundEvent::new(
            3,
            "tiktok",
            "CompletePayment",
            json!({
                "event_id": "e-3",
                "source_url": "https://shop.test/thanks",
                "user_data": {"phone_hash": "p", "phone": "+1555"},
                "custom_data": {"value": 5, "currency": "EUR"},
            })
            .as_object()
            .cloned()
            .expect("object"),
        );

        let body = adapter.body(&[event], 100);
        assert_eq!(
            body,
            json!({
                "pixel_code": "TT123",
                "event_list": [{
                    "event": "CompletePayment",
                    "event_time": 100,
                    "event_id": "e-3",
                    "properties": {"value": 5, "currency": "EUR", "url": "https://shop.test/thanks"},
                    "user": {"ph": "p"},
                }],
            })
        );
    }
}
