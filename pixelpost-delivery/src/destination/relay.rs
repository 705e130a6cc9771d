//! Forward whole batches to a server-side tagging container.
//!
//! The relay receives the platform identifiers it needs to fan events out,
//! but never any platform access token.

use async_trait::async_trait;
use pixelpost_common::time::unix_now;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    DeliveryError,
    destination::{
        DestinationAdapter, DestinationResponse, OutboundEvent,
        http::{Auth, HttpSender},
    },
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub url: Option<String>,
}

/// Public identifiers shared with the relay.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PixelIds {
    pub meta_pixel_id: String,
    pub tiktok_pixel_id: String,
    pub google_ads_id: String,
    pub google_ads_label: String,
    pub snapchat_pixel_id: String,
    pub pinterest_tag_id: String,
}

#[derive(Debug, Serialize)]
struct RelayBatch<'a> {
    platform: &'a str,
    events: Vec<Map<String, Value>>,
    pixel_ids: &'a PixelIds,
    source: &'static str,
    site_url: &'a str,
    timestamp: u64,
}

#[derive(Debug, Clone)]
pub struct RelayAdapter {
    url: Option<String>,
    pixel_ids: PixelIds,
    site_url: String,
    http: HttpSender,
}

impl RelayAdapter {
    #[must_use]
    pub const fn new(url: Option<String>, pixel_ids: PixelIds, site_url: String, http: HttpSender) -> Self {
        Self {
            url,
            pixel_ids,
            site_url,
            http,
        }
    }

    fn url(&self) -> crate::Result<String> {
        self.url
            .as_deref()
            .filter(|url| !url.is_empty())
            .map(|url| format!("{}/event", url.trim_end_matches('/')))
            .ok_or_else(|| DeliveryError::Configuration("relay URL not configured".to_string()))
    }

    fn body(&self, events: &[OutboundEvent], now: u64) -> Value {
        let platform = events.first().map_or(super::GENERIC, |e| e.destination.as_str());
        let events = events
            .iter()
            .map(|event| {
                let mut document = event.payload.clone();
                document
                    .entry("event_name")
                    .or_insert_with(|| Value::String(event.name().to_string()));
                document
            })
            .collect();

        serde_json::to_value(RelayBatch {
            platform,
            events,
            pixel_ids: &self.pixel_ids,
            source: "pixelpost",
            site_url: &self.site_url,
            timestamp: now,
        })
        .unwrap_or_default()
    }
}

#[async_trait]
impl DestinationAdapter for RelayAdapter {
    fn name(&self) -> &str {
        "relay"
    }

    async fn send_batch(&self, events: &[OutboundEvent]) -> crate::Result<DestinationResponse> {
        let url = self.url()?;
        let body = self.body(events, unix_now());
        self.http.post_json(&url, Auth::None, &body, None).await
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
    fn carries_identifiers_but_no_tokens() {
        let adapter = RelayAdapter::new(
            Some("https://relay.shop.test/".to_string()),
            PixelIds {
                meta_pixel_id: "m1".to_string(),
                ..PixelIds::default()
            },
            "https://shop.test".to_string(),
            HttpSender::new(Duration::from_secs(1)).expect("client"),
        );
        assert_eq!(adapter.url().expect("url"), "https://relay.shop.test/event");

        let event = OutboundEvent::new(
            4,
            "meta",
            "Purchase",
            json!({"user_data": {"email": "raw@example.com", "email_hash": "e"}})
                .as_object()
                .cloned()
                .expect("object"),
        );

        let body = adapter.body(&[event], 5);
        assert_eq!(body["platform"], "meta");
        assert_eq!(body["source"], "pixelpost");
        assert_eq!(body["pixel_ids"]["meta_pixel_id"], "m1");
        assert_eq!(
            body["events"],
            json!([{"event_name": "Purchase", "user_data": {"email_hash": "e"}}])
        );
        assert!(!body.to_string().contains("token"));
    }
}
