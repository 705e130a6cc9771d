use std::time::Duration;

use serde::Deserialize;

use crate::RetryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct DeliveryConfig {
    /// Rows read per scheduled pass.
    ///
    /// Default: 10
    #[serde(default = "defaults::batch_limit")]
    pub batch_limit: usize,

    /// Rows read by an operator-triggered pass.
    ///
    /// Default: 50
    #[serde(default = "defaults::manual_limit")]
    pub manual_limit: usize,

    /// Per-request timeout for destinations without their own.
    ///
    /// Default: 20
    #[serde(default = "defaults::timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            batch_limit: defaults::batch_limit(),
            manual_limit: defaults::manual_limit(),
            timeout_secs: defaults::timeout_secs(),
            retry: RetryPolicy::default(),
        }
    }
}

impl DeliveryConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

mod defaults {
    pub const fn batch_limit() -> usize {
        10
    }

    pub const fn manual_limit() -> usize {
        50
    }

    pub const fn timeout_secs() -> u64 {
        20
    }
}
