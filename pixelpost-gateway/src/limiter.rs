//! Per-client rate limiting using the token bucket algorithm
//!
//! Each client address owns a bucket holding up to `burst` tokens that
//! refills at `per_second`. A request spends one token; an empty bucket
//! rejects the request and reports how long until the next token.

use std::{
    net::IpAddr,
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::RateLimitConfig;

/// Buckets kept before idle ones are pruned
const MAX_TRACKED_CLIENTS: usize = 10_000;

/// A bucket untouched for this long is full again and can be dropped
const IDLE_EVICTION: Duration = Duration::from_secs(600);

/// Minimum gap between two sweeps of the bucket map
const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(config: RateLimitConfig, now: Instant) -> Self {
        let capacity = f64::from(config.burst.max(1));
        Self {
            tokens: capacity,
            capacity,
            refill_rate: config.per_second.max(f64::MIN_POSITIVE),
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = elapsed.mul_add(self.refill_rate, self.tokens).min(self.capacity);
        self.last_refill = now;
    }

    fn try_consume(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let seconds = (1.0 - self.tokens) / self.refill_rate;
            Err(Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX))
        }
    }
}

#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: DashMap<IpAddr, Arc<Mutex<TokenBucket>>>,
    last_prune: Mutex<Option<Instant>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: DashMap::new(),
            last_prune: Mutex::new(None),
        }
    }

    /// Spend one token for `client`.
    ///
    /// # Errors
    ///
    /// Returns the wait until a token is available when the bucket is empty.
    pub fn check(&self, client: IpAddr) -> Result<(), Duration> {
        self.check_at(client, Instant::now())
    }

    /// # Errors
    ///
    /// See [`Self::check`].
    pub fn check_at(&self, client: IpAddr, now: Instant) -> Result<(), Duration> {
        if self.buckets.len() >= MAX_TRACKED_CLIENTS && !self.buckets.contains_key(&client) {
            self.maybe_prune(now);
        }

        let bucket = self
            .buckets
            .entry(client)
            .or_insert_with(|| Arc::new(Mutex::new(TokenBucket::new(self.config, now))))
            .clone();

        let result = bucket.lock().try_consume(now);
        if let Err(wait) = result {
            tracing::debug!(
                client = %client,
                wait_seconds = wait.as_secs_f64(),
                "Ingest rate limit exceeded"
            );
        }
        result
    }

    /// Sweep idle buckets, at most once per [`PRUNE_INTERVAL`].
    fn maybe_prune(&self, now: Instant) {
        {
            let mut last_prune = self.last_prune.lock();
            if last_prune.is_some_and(|last| now.saturating_duration_since(last) < PRUNE_INTERVAL) {
                return;
            }
            *last_prune = Some(now);
        }

        self.prune(now);
    }

    fn prune(&self, now: Instant) {
        self.buckets.retain(|_, bucket| {
            now.saturating_duration_since(bucket.lock().last_refill) < IDLE_EVICTION
        });
    }

    #[must_use]
    pub fn tracked_clients(&self) -> usize {
        self.buckets.len()
    }
}
