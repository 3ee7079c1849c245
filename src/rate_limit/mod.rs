//! Per-client admission control.
//!
//! Every distinct client identity gets its own [`TokenBucket`], created on
//! first sight. The check is synchronous and happens before any cache or
//! upstream work.

pub mod token_bucket;

pub use token_bucket::TokenBucket;

use dashmap::DashMap;
use std::{sync::Arc, time::Duration};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::maintenance::PeriodicTask;

/// Registry of token buckets keyed by client identity (usually the peer IP).
#[derive(Debug)]
pub struct ClientRateLimiter {
    buckets: DashMap<String, Arc<TokenBucket>>,
    rate_per_second: f64,
    burst: u32,
}

impl ClientRateLimiter {
    pub fn new(rate_per_second: f64, burst: u32) -> Self {
        Self {
            buckets: DashMap::new(),
            rate_per_second,
            burst,
        }
    }

    /// Returns the bucket for `identity`, registering a full one the first
    /// time the identity is seen. Concurrent first calls for the same
    /// identity all receive the same bucket: creation happens under the
    /// shard lock of the entry.
    pub fn limiter_for(&self, identity: &str) -> Arc<TokenBucket> {
        if let Some(bucket) = self.buckets.get(identity) {
            return bucket.clone();
        }

        self.buckets
            .entry(identity.to_string())
            .or_insert_with(|| {
                debug!("🆕 New rate limiter for {}", identity);
                Arc::new(TokenBucket::new(self.rate_per_second, self.burst))
            })
            .clone()
    }

    /// Admission check for one request from `identity`.
    pub fn admit(&self, identity: &str) -> bool {
        let allowed = self.limiter_for(identity).allow();
        if !allowed {
            debug!("🚫 Rate limited: {}", identity);
        }
        allowed
    }

    /// Forgets identities that have been quiet for at least `max_idle` and
    /// whose bucket has refilled completely. A returning client gets a fresh
    /// full bucket, which is exactly what it would have had.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| !bucket.is_idle(now, max_idle));
        before.saturating_sub(self.buckets.len())
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn rate_per_second(&self) -> f64 {
        self.rate_per_second
    }

    pub fn burst(&self) -> u32 {
        self.burst
    }

    /// Periodically runs [`ClientRateLimiter::evict_idle`] so the registry
    /// stays bounded by the number of recently active clients.
    pub fn spawn_janitor(
        self: &Arc<Self>,
        max_idle: Duration,
        cancel: CancellationToken,
    ) -> PeriodicTask {
        let limiter = Arc::clone(self);
        PeriodicTask::spawn("rate limiter janitor", max_idle, cancel, move || {
            let evicted = limiter.evict_idle(max_idle);
            if evicted > 0 {
                info!("🧹 Dropped {} idle rate limiters ({} active)", evicted, limiter.len());
            }
        })
    }
}
