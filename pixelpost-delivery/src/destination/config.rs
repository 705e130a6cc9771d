use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};

use crate::destination::{
    DestinationAdapter, DestinationRegistry, GenericAdapter, GoogleAdsAdapter, HttpSender,
    MetaAdapter, PinterestAdapter, RelayAdapter, SnapchatAdapter, TikTokAdapter,
    generic::GenericConfig,
    google_ads::GoogleAdsConfig,
    meta::MetaConfig,
    pinterest::PinterestConfig,
    relay::{PixelIds, RelayConfig},
    snapchat::SnapchatConfig,
    tiktok::TikTokConfig,
};

pub(crate) const fn enabled() -> bool {
    true
}

/// Per-destination credentials and endpoints.
///
/// ```ron
/// destinations: (
///     site_url: "https://shop.example",
///     meta: Some((pixel_id: "123", access_token: Some("..."))),
///     generic: (endpoint: Some("https://collector.example/capi")),
/// ),
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DestinationsConfig {
    /// Sent to the generic endpoint and the relay as the originating site
    #[serde(default)]
    pub site_url: String,
    #[serde(default)]
    pub meta: Option<MetaConfig>,
    #[serde(default)]
    pub tiktok: Option<TikTokConfig>,
    #[serde(default)]
    pub google_ads: Option<GoogleAdsConfig>,
    #[serde(default)]
    pub snapchat: Option<SnapchatConfig>,
    #[serde(default)]
    pub pinterest: Option<PinterestConfig>,
    #[serde(default)]
    pub generic: GenericConfig,
    #[serde(default)]
    pub relay: RelayConfig,
}

/// Which dedicated integrations are active, as reported by the health endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnabledDestinations {
    pub meta: bool,
    pub tiktok: bool,
    pub google_ads: bool,
    pub snapchat: bool,
    pub pinterest: bool,
}

impl DestinationsConfig {
    fn meta(&self) -> Option<&MetaConfig> {
        self.meta.as_ref().filter(|c| c.enabled && !c.pixel_id.is_empty())
    }

    fn tiktok(&self) -> Option<&TikTokConfig> {
        self.tiktok.as_ref().filter(|c| c.enabled && !c.pixel_id.is_empty())
    }

    fn google_ads(&self) -> Option<&GoogleAdsConfig> {
        self.google_ads
            .as_ref()
            .filter(|c| c.enabled && !c.conversion_id.is_empty())
    }

    fn snapchat(&self) -> Option<&SnapchatConfig> {
        self.snapchat.as_ref().filter(|c| c.enabled && !c.pixel_id.is_empty())
    }

    fn pinterest(&self) -> Option<&PinterestConfig> {
        self.pinterest.as_ref().filter(|c| c.enabled && !c.tag_id.is_empty())
    }

    #[must_use]
    pub fn enabled_destinations(&self) -> EnabledDestinations {
        EnabledDestinations {
            meta: self.meta().is_some(),
            tiktok: self.tiktok().is_some(),
            google_ads: self.google_ads().is_some(),
            snapchat: self.snapchat().is_some(),
            pinterest: self.pinterest().is_some(),
        }
    }

    fn pixel_ids(&self) -> PixelIds {
        PixelIds {
            meta_pixel_id: self.meta().map(|c| c.pixel_id.clone()).unwrap_or_default(),
            tiktok_pixel_id: self.tiktok().map(|c| c.pixel_id.clone()).unwrap_or_default(),
            google_ads_id: self
                .google_ads()
                .map(|c| c.conversion_id.clone())
                .unwrap_or_default(),
            google_ads_label: self
                .google_ads()
                .map(|c| c.conversion_label.clone())
                .unwrap_or_default(),
            snapchat_pixel_id: self.snapchat().map(|c| c.pixel_id.clone()).unwrap_or_default(),
            pinterest_tag_id: self.pinterest().map(|c| c.tag_id.clone()).unwrap_or_default(),
        }
    }

    /// Build the adapter registry. Destinations that are disabled or lack an
    /// identifier fall through to the generic adapter.
    pub fn build_registry(&self, timeout: Duration) -> crate::Result<DestinationRegistry> {
        let http = HttpSender::new(timeout)?;

        let fallback: Arc<dyn DestinationAdapter> = Arc::new(GenericAdapter::new(
            self.generic.clone(),
            self.site_url.clone(),
            http.clone(),
        ));
        let mut registry = DestinationRegistry::new(fallback);

        if let Some(config) = self.meta() {
            registry.register("meta", Arc::new(MetaAdapter::new(config.clone(), http.clone())));
        }
        if let Some(config) = self.tiktok() {
            registry.register("tiktok", Arc::new(TikTokAdapter::new(config.clone(), http.clone())));
        }
        if let Some(config) = self.google_ads() {
            registry.register(
                "google_ads",
                Arc::new(GoogleAdsAdapter::new(config.clone(), http.clone())),
            );
        }
        if let Some(config) = self.snapchat() {
            registry.register(
                "snapchat",
                Arc::new(SnapchatAdapter::new(config.clone(), http.clone())),
            );
        }
        if let Some(config) = self.pinterest() {
            registry.register(
                "pinterest",
                Arc::new(PinterestAdapter::new(config.clone(), http.clone())),
            );
        }

        if self.relay.enabled {
            tracing::info!(url = ?self.relay.url, "Relaying every destination");
            registry = registry.with_relay(Arc::new(RelayAdapter::new(
                self.relay.url.clone(),
                self.pixel_ids(),
                self.site_url.clone(),
                http,
            )));
        }

        Ok(registry)
    }
}
