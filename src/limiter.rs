// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Fixed-window rate limiter backed by a TTL cache.
//!
//! Each key holds a `(count, window_start)` pair. A request reads the pair,
//! starts a fresh window when the stored one has elapsed, increments the
//! count and writes the pair back with a TTL equal to the remaining window.
//!
//! Known limitations: bursts of up to twice the limit are possible across a
//! window boundary, and the read-then-write sequence can under-count racing
//! requests for the same key. The limiter is abuse mitigation, not a
//! security boundary.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

/// Stored state for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCounter {
    pub count: u32,
    /// Unix seconds
    pub window_start: i64,
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Requests left in the current window
    pub remaining: u32,
    /// Unix seconds at which the window resets
    pub reset_at: i64,
}

impl RateDecision {
    /// Seconds until the window resets, at least one.
    pub fn retry_after(&self, now: i64) -> u64 {
        u64::try_from(self.reset_at - now).unwrap_or(0).max(1)
    }
}

/// Shared key-value cache holding window counters.
///
/// Implement this for an external cache; the limiter only needs get and put
/// with a time-to-live.
#[async_trait]
pub trait CounterCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<WindowCounter>;

    async fn put(&self, key: &str, counter: WindowCounter, ttl: Duration);
}

/// In-process cache. Entries expire lazily on read and in `cleanup`.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, (WindowCounter, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired entries (should be called periodically).
    pub async fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, (_, expires)| *expires > now);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CounterCache for MemoryCache {
    async fn get(&self, key: &str) -> Option<WindowCounter> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|(_, expires)| *expires > Instant::now())
            .map(|(counter, _)| *counter)
    }

    async fn put(&self, key: &str, counter: WindowCounter, ttl: Duration) {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), (counter, Instant::now() + ttl));
    }
}

/// Fixed-window limiter over any [`CounterCache`].
#[derive(Clone)]
pub struct RateLimiter {
    cache: Arc<dyn CounterCache>,
}

impl RateLimiter {
    /// Create a new rate limiter over the given cache.
    pub fn new(cache: Arc<dyn CounterCache>) -> Self {
        Self { cache }
    }

    /// Count a request for `key` against `limit` per `window_secs`.
    pub async fn check(&self, key: &str, limit: u32, window_secs: u64) -> RateDecision {
        self.check_at(key, limit, window_secs, Utc::now().timestamp())
            .await
    }

    /// Same as [`check`](Self::check) with an explicit clock (unix seconds).
    pub async fn check_at(&self, key: &str, limit: u32, window_secs: u64, now: i64) -> RateDecision {
        let window = i64::try_from(window_secs.max(1)).unwrap_or(i64::MAX);

        let mut counter = match self.cache.get(key).await {
            Some(stored) if now - stored.window_start < window && now >= stored.window_start => {
                stored
            }
            _ => WindowCounter {
                count: 0,
                window_start: now,
            },
        };
        counter.count = counter.count.saturating_add(1);

        let reset_at = counter.window_start.saturating_add(window);
        let ttl = u64::try_from(reset_at - now).unwrap_or(0).max(1);
        self.cache
            .put(key, counter, Duration::from_secs(ttl))
            .await;

        let allowed = counter.count <= limit;
        if !allowed {
            debug!(key, count = counter.count, limit, "rate limit exceeded");
        }

        RateDecision {
            allowed,
            remaining: limit.saturating_sub(counter.count),
            reset_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> (RateLimiter, Arc<MemoryCache>) {
        let cache = Arc::new(MemoryCache::new());
        (RateLimiter::new(cache.clone()), cache)
    }

    #[tokio::test]
    async fn test_limit_then_block() {
        let (limiter, _) = limiter();
        let now = 1_000;

        for i in 0..5 {
            let decision = limiter.check_at("ip:1", 5, 60, now).await;
            assert!(decision.allowed, "request {} should be allowed", i + 1);
            assert_eq!(decision.remaining, 4 - i);
            assert_eq!(decision.reset_at, now + 60);
        }

        let decision = limiter.check_at("ip:1", 5, 60, now + 30).await;
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.retry_after(now + 30), 30);
    }

    #[tokio::test]
    async fn test_window_resets() {
        let (limiter, _) = limiter();
        for _ in 0..3 {
            limiter.check_at("k", 2, 10, 100).await;
        }
        assert!(!limiter.check_at("k", 2, 10, 109).await.allowed);

        let decision = limiter.check_at("k", 2, 10, 110).await;
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 1);
        assert_eq!(decision.reset_at, 120);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let (limiter, _) = limiter();
        assert!(limiter.check_at("a", 1, 60, 0).await.allowed);
        assert!(!limiter.check_at("a", 1, 60, 0).await.allowed);
        assert!(limiter.check_at("b", 1, 60, 0).await.allowed);
    }

    #[tokio::test]
    async fn test_clock_going_backwards_starts_fresh_window() {
        let (limiter, _) = limiter();
        limiter.check_at("k", 1, 60, 500).await;
        assert!(limiter.check_at("k", 1, 60, 400).await.allowed);
    }

    #[tokio::test]
    async fn test_ttl_tracks_remaining_window() {
        let (limiter, cache) = limiter();
        limiter.check_at("k", 10, 60, 0).await;
        assert_eq!(
            cache.get("k").await,
            Some(WindowCounter {
                count: 1,
                window_start: 0
            })
        );

        cache
            .put("gone", WindowCounter { count: 1, window_start: 0 }, Duration::ZERO)
            .await;
        assert_eq!(cache.get("gone").await, None);
        assert_eq!(cache.cleanup().await, 1);
        assert_eq!(cache.len().await, 1);
    }
}
