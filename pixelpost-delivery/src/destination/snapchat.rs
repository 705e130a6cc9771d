//! Snapchat Conversions API.

use async_trait::async_trait;
use pixelpost_common::time::unix_now;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::destination::{
    DestinationAdapter, DestinationResponse, OutboundEvent,
    http::{Auth, HttpSender},
};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SnapchatConfig {
    #[serde(default = "super::config::enabled")]
    pub enabled: bool,
    pub pixel_id: String,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

fn default_endpoint() -> String {
    "https://tr.snapchat.com/v2/conversion".to_string()
}

#[derive(Debug, Serialize)]
struct SnapBatch<'a> {
    batch: Vec<SnapEvent<'a>>,
}

#[derive(Debug, Serialize)]
struct SnapEvent<'a> {
    pixel_id: &'a str,
    event_name: String,
    event_time: u64,
    event_id: String,
    action_source: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    event_source_url: Option<String>,
    user: SnapUser,
    #[serde(skip_serializing_if = "Option::is_none")]
    price: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    item_ids: Option<Value>,
}

#[derive(Debug, Serialize)]
struct SnapUser {
    #[serde(skip_serializing_if = "Option::is_none")]
    em: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ph: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SnapchatAdapter {
    config: SnapchatConfig,
    http: HttpSender,
}

impl SnapchatAdapter {
    #[must_use]
    pub const fn new(config: SnapchatConfig, http: HttpSender) -> Self {
        Self { config, http }
    }

    fn body(&self, events: &[OutboundEvent], now: u64) -> Value {
        let batch = events
            .iter()
            .map(|event| {
                let custom = event.custom_data();
                let name = event.name().to_uppercase();
                SnapEvent {
                    pixel_id: &self.config.pixel_id,
                    event_name: if name.is_empty() {
                        "CUSTOM_EVENT_1".to_string()
                    } else {
                        name
                    },
                    event_time: event.event_time(now),
                    event_id: event.event_id("snap_"),
                    action_source: "website",
                    event_source_url: event.source_url(),
                    user: SnapUser {
                        em: event.email_hash(),
                        ph: event.phone_hash(),
                    },
                    price: event.value(),
                    currency: event.currency(),
                    item_ids: custom
                        .get("item_ids")
                        .or_else(|| custom.get("content_ids"))
                        .cloned(),
                }
            })
            .collect();

        serde_json::to_value(SnapBatch { batch }).unwrap_or_default()
    }
}

#[async_trait]
impl DestinationAdapter for SnapchatAdapter {
    fn name(&self) -> &str {
        "snapchat"
    }

    async fn send_batch(&self, events: &[OutboundEvent]) -> crate::Result<DestinationResponse> {
        let body = self.body(events, unix_now());
        self.http
            .post_json(
                &self.config.endpoint,
                Auth::bearer(self.config.api_token.as_deref()),
                &body,
                None,
            )
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
    fn uppercases_names_and_maps_price() {
        let adapter = SnapchatAdapter::new(
            SnapchatConfig {
                enabled: true,
                pixel_id: "snap-px".to_string(),
                api_token: None,
                endpoint: default_endpoint(),
            },
            HttpSender::new(Duration::from_secs(1)).expect("client"),
        );

        let purchase = OutboundEvent::new(
            1,
            "snapchat",
            "purchase",
            json!({
                "event_id": "s-1",
                "user_data": {"email_hash": "e"},
                "custom_data": {"value": 12.5, "currency": " GBP", "content_ids": ["sku-1"]},
            })
            .as_object()
            .cloned()
            .expect("object"),
        );
        let unnamed = OutboundEvent::new(2, "snapchat", "", serde_json::Map::new());

        let body = adapter.body(&[purchase, unnamed], 9);
        assert_eq!(
            body["batch"][0],
            json!({
                "pixel_id": "snap-px",
                "event_name": "PURCHASE",
                "event_time": 9,
                "event_id": "s-1",
                "action_source": "website",
                "user": {"em": "e"},
                "price": 12.5,
                "currency": "GBP",
                "item_ids": ["sku-1"],
            })
        );
        assert_eq!(body["batch"][1]["event_name"], "CUSTOM_EVENT_1");
        assert!(
            body["batch"][1]["event_id"]
                .as_str()
                .is_some_and(|id| id.starts_with("snap_"))
        );
    }
}
