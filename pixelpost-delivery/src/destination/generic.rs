//! Fallback for destinations without a dedicated integration.
//!
//! Events are forwarded one request at a time to a single configured
//! endpoint, so a generic group is not batched on the wire.

use std::time::Duration;

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

const TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GenericConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
struct Forwarded<'a> {
    platform: &'a str,
    event: &'a str,
    payload: &'a Map<String, Value>,
    site: &'a str,
    timestamp: u64,
}

#[derive(Debug, Clone)]
pub struct GenericAdapter {
    config: GenericConfig,
    site_url: String,
    http: HttpSender,
}

impl GenericAdapter {
    #[must_use]
    pub const fn new(config: GenericConfig, site_url: String, http: HttpSender) -> Self {
        Self {
            config,
            site_url,
            http,
        }
    }

    fn endpoint(&self) -> crate::Result<&str> {
        self.config
            .endpoint
            .as_deref()
            .filter(|endpoint| !endpoint.is_empty())
            .ok_or_else(|| DeliveryError::Configuration("generic endpoint not configured".to_string()))
    }
}

#[async_trait]
impl DestinationAdapter for GenericAdapter {
    fn name(&self) -> &str {
        super::GENERIC
    }

    /// The group fails on the first event that is not accepted; the last
    /// response is returned when every event succeeds.
    async fn send_batch(&self, events: &[OutboundEvent]) -> crate::Result<DestinationResponse> {
        let endpoint = self.endpoint()?;
        let auth = Auth::bearer(self.config.token.as_deref());

        let mut last = DestinationResponse {
            status: 204,
            body: String::new(),
        };

        for event in events {
            let body = Forwarded {
                platform: &event.destination,
                event: event.name(),
                payload: &event.payload,
                site: &self.site_url,
                timestamp: unix_now(),
            };

            let response = self.http.post_json(endpoint, auth, &body, Some(TIMEOUT)).await?;
            if !response.is_success() {
                return Ok(response);
            }
            last = response;
        }

        Ok(last)
    }
}
