//! Pinterest Conversions API.

use async_trait::async_trait;
use pixelpost_common::time::unix_now;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::destination::{
    DestinationAdapter, DestinationResponse, OutboundEvent,
    http::{Auth, HttpSender},
};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PinterestConfig {
    #[serde(default = "super::config::enabled")]
    pub enabled: bool,
    pub tag_id: String,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

fn default_endpoint() -> String {
    "https://api.pinterest.com/v5/events".to_string()
}

#[derive(Debug, Serialize)]
struct PinBatch {
    data: Vec<PinEvent>,
}

#[derive(Debug, Serialize)]
struct PinEvent {
    event_name: String,
    event_time: u64,
    event_id: String,
    action_source: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    event_source_url: Option<String>,
    user_data: PinUser,
    custom_data: PinCustom,
}

#[derive(Debug, Serialize)]
struct PinUser {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    em: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    ph: Vec<String>,
}

#[derive(Debug, Serialize)]
struct PinCustom {
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    currency: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PinterestAdapter {
    config: PinterestConfig,
    http: HttpSender,
}

impl PinterestAdapter {
    #[must_use]
    pub const fn new(config: PinterestConfig, http: HttpSender) -> Self {
        Self { config, http }
    }

    fn body(events: &[OutboundEvent], now: u64) -> Value {
        let data = events
            .iter()
            .map(|event| {
                let name = event.name();
                PinEvent {
                    event_name: if name.is_empty() { "custom" } else { name }.to_string(),
                    event_time: event.event_time(now),
                    event_id: event.event_id("pin_"),
                    action_source: "web",
                    event_source_url: event.source_url(),
                    user_data: PinUser {
                        em: event.email_hash().into_iter().collect(),
                        ph: event.phone_hash().into_iter().collect(),
                    },
                    custom_data: PinCustom {
                        value: event.value(),
                        currency: event.currency(),
                    },
                }
            })
            .collect();

        serde_json::to_value(PinBatch { data }).unwrap_or_default()
    }
}

#[async_trait]
impl DestinationAdapter for PinterestAdapter {
    fn name(&self) -> &str {
        "pinterest"
    }

    async fn send_batch(&self, events: &[OutboundEvent]) -> crate::Result<DestinationResponse> {
        let body = Self::body(events, unix_now());
        self.http
            .post_json(
                &self.config.endpoint,
                Auth::bearer(self.config.access_token.as_deref()),
                &body,
                None,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn wraps_hashes_in_arrays() {
        let event = OutboundEvent::new(
            1,
            "pinterest",
            "",
            json!({
                "event_id": "p-1",
                "event_source_url": "https://shop.test/p",
                "user_data": {"email_hash": "e"},
                "custom_data": {"value": 3, "currency": "AUD"},
            })
            .as_object()
            .cloned()
            .unwrap_or_default(),
        );

        let body = PinterestAdapter::body(&[event], 11);
        assert_eq!(
            body,
            json!({"data": [{
                "event_name": "custom",
                "event_time": 11,
                "event_id": "p-1",
                "action_source": "web",
                "event_source_url": "https://shop.test/p",
                "user_data": {"em": ["e"]},
                "custom_data": {"value": 3, "currency": "AUD"},
            }]})
        );
    }
}
