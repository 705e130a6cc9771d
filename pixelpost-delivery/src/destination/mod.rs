//! Destination adapters.
//!
//! An adapter turns a batch of [`OutboundEvent`]s into one request in its
//! platform's wire format. The dispatcher only ever talks to the
//! [`DestinationAdapter`] trait through a [`DestinationRegistry`]; adding a
//! platform means registering another implementation.

use std::{collections::HashMap, fmt::Debug, sync::Arc};

use async_trait::async_trait;

use crate::DeliveryError;

pub mod config;
pub mod event;
pub mod generic;
pub mod google_ads;
pub mod http;
pub mod meta;
pub mod pinterest;
pub mod relay;
pub mod snapchat;
pub mod tiktok;

pub use config::DestinationsConfig;
pub use event::OutboundEvent;
pub use generic::GenericAdapter;
pub use google_ads::GoogleAdsAdapter;
pub use http::HttpSender;
pub use meta::MetaAdapter;
pub use pinterest::PinterestAdapter;
pub use relay::RelayAdapter;
pub use snapchat::SnapchatAdapter;
pub use tiktok::TikTokAdapter;

/// Name used for events without a dedicated integration.
pub const GENERIC: &str = "generic";

/// Status and body returned by a destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationResponse {
    pub status: u16,
    pub body: String,
}

impl DestinationResponse {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Classify the response: anything outside `[200, 300)` is a rejection.
    pub fn into_result(self) -> crate::Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(DeliveryError::Rejected {
                status: self.status,
                body: self.body,
            })
        }
    }
}

#[async_trait]
pub trait DestinationAdapter: Send + Sync + Debug {
    /// Destination name, used in logs.
    fn name(&self) -> &str;

    /// Send every event in one request (or, for the generic endpoint, one
    /// request per event).
    ///
    /// Transport and configuration problems are errors; any HTTP reply,
    /// whatever its status, is returned as a response.
    async fn send_batch(&self, events: &[OutboundEvent]) -> crate::Result<DestinationResponse>;
}

/// Maps destination names to adapters.
///
/// Unknown destinations resolve to the fallback adapter. When a relay is
/// installed it takes every destination.
#[derive(Debug, Clone)]
pub struct DestinationRegistry {
    adapters: HashMap<String, Arc<dyn DestinationAdapter>>,
    fallback: Arc<dyn DestinationAdapter>,
    relay: Option<Arc<dyn DestinationAdapter>>,
}

impl DestinationRegistry {
    #[must_use]
    pub fn new(fallback: Arc<dyn DestinationAdapter>) -> Self {
        Self {
            adapters: HashMap::new(),
            fallback,
            relay: None,
        }
    }

    #[must_use]
    pub fn with_adapter(mut self, destination: impl Into<String>, adapter: Arc<dyn DestinationAdapter>) -> Self {
        self.register(destination, adapter);
        self
    }

    #[must_use]
    pub fn with_relay(mut self, relay: Arc<dyn DestinationAdapter>) -> Self {
        self.relay = Some(relay);
        self
    }

    pub fn register(&mut self, destination: impl Into<String>, adapter: Arc<dyn DestinationAdapter>) {
        self.adapters.insert(destination.into(), adapter);
    }

    #[must_use]
    pub fn resolve(&self, destination: &str) -> Arc<dyn DestinationAdapter> {
        if let Some(relay) = &self.relay {
            return Arc::clone(relay);
        }

        self.adapters
            .get(destination)
            .map_or_else(|| Arc::clone(&self.fallback), Arc::clone)
    }

    /// Whether `destination` has a dedicated adapter.
    #[must_use]
    pub fn is_registered(&self, destination: &str) -> bool {
        self.adapters.contains_key(destination)
    }

    #[must_use]
    pub const fn is_relaying(&self) -> bool {
        self.relay.is_some()
    }
}
