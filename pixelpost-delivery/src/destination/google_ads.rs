//! Google Ads offline conversions, posted through a server-side tag endpoint.
//!
//! Google Ads has no simple token-based batch API, so conversions go to the
//! `/up-google-ads` route of a configured tagging server which holds the
//! account credentials.

use std::time::Duration;

use async_trait::async_trait;
use pixelpost_common::time::unix_now;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    DeliveryError,
    destination::{
        DestinationAdapter, DestinationResponse, OutboundEvent,
        http::{Auth, HttpSender},
    },
};

const TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GoogleAdsConfig {
    #[serde(default = "super::config::enabled")]
    pub enabled: bool,
    pub conversion_id: String,
    #[serde(default)]
    pub conversion_label: String,
    /// Base URL of the tagging server
    #[serde(default)]
    pub server_url: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
struct GoogleAdsBatch<'a> {
    google_ads_conversions: Vec<Conversion<'a>>,
}

#[derive(Debug, Serialize)]
struct Conversion<'a> {
    conversion_id: &'a str,
    conversion_label: &'a str,
    event_time: u64,
    event_id: String,
    event_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_url: Option<String>,
    user_data: ConversionUser,
}

#[derive(Debug, Serialize)]
struct ConversionUser {
    #[serde(skip_serializing_if = "Option::is_none")]
    email_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone_hash: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GoogleAdsAdapter {
    config: GoogleAdsConfig,
    http: HttpSender,
}

impl GoogleAdsAdapter {
    #[must_use]
    pub const fn new(config: GoogleAdsConfig, http: HttpSender) -> Self {
        Self { config, http }
    }

    fn url(&self) -> crate::Result<String> {
        self.config
            .server_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .map(|url| format!("{}/up-google-ads", url.trim_end_matches('/')))
            .ok_or_else(|| {
                DeliveryError::Configuration("Google Ads server URL not configured".to_string())
            })
    }

    fn body(&self, events: &[OutboundEvent], now: u64) -> Value {
        let conversions = events
            .iter()
            .map(|event| {
                let name = event.name();
                Conversion {
                    conversion_id: &self.config.conversion_id,
                    conversion_label: &self.config.conversion_label,
                    event_time: event.event_time(now),
                    event_id: event.event_id("gad_"),
                    event_name: if name.is_empty() { "conversion" } else { name }.to_string(),
                    value: event.value(),
                    currency: event.currency(),
                    source_url: event.source_url(),
                    user_data: ConversionUser {
                        email_hash: event.email_hash(),
                        phone_hash: event.phone_hash(),
                    },
                }
            })
            .collect();

        serde_json::to_value(GoogleAdsBatch {
            google_ads_conversions: conversions,
        })
        .unwrap_or_default()
    }
}

#[async_trait]
impl DestinationAdapter for GoogleAdsAdapter {
    fn name(&self) -> &str {
        "google_ads"
    }

    async fn send_batch(&self, events: &[OutboundEvent]) -> crate::Result<DestinationResponse> {
        let url = self.url()?;
        let body = self.body(events, unix_now());

        self.http
            .post_json(
                &url,
                Auth::bearer(self.config.token.as_deref()),
                &body,
                Some(TIMEOUT),
            )
            .await
    }
}
