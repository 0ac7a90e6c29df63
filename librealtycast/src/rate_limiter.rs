//! Fixed-window request limiting for the mutating endpoints
//!
//! Buckets live in process memory. Every instance of the server counts on
//! its own, so a horizontally scaled deployment admits `limit` requests per
//! window *per instance*. That gap is known and deliberately left open.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Limit and window for one class of requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    pub limit: u32,
    pub window: Duration,
}

impl RateLimitRule {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self { limit, window }
    }

    fn window_ms(&self) -> i64 {
        i64::try_from(self.window.as_millis()).unwrap_or(i64::MAX)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    /// Unix time in milliseconds when the current window ends
    pub reset_at: i64,
}

impl RateLimitDecision {
    /// Whole seconds until the window resets, at least 1
    pub fn retry_after_secs(&self, now_ms: i64) -> u64 {
        let ms = (self.reset_at - now_ms).max(0) as u64;
        ms.div_ceil(1000).max(1)
    }
}

#[derive(Debug)]
struct Bucket {
    window_start: i64,
    window_ms: i64,
    count: u32,
}

impl Bucket {
    fn expired(&self, now_ms: i64) -> bool {
        now_ms >= self.window_start.saturating_add(self.window_ms)
    }
}

#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a request against `key` and decide whether it may proceed
    ///
    /// Denied requests do not consume capacity, so the count stays at
    /// `rule.limit` for the rest of the window.
    pub fn allow(&self, key: &str, rule: RateLimitRule, now_ms: i64) -> RateLimitDecision {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        let window_ms = rule.window_ms();

        let bucket = buckets.entry(key.to_string()).or_insert(Bucket {
            window_start: now_ms,
            window_ms,
            count: 0,
        });

        if bucket.expired(now_ms) {
            bucket.window_start = now_ms;
            bucket.window_ms = window_ms;
            bucket.count = 0;
        }

        let allowed = bucket.count < rule.limit;
        if allowed {
            bucket.count += 1;
        }

        RateLimitDecision {
            allowed,
            remaining: rule.limit.saturating_sub(bucket.count),
            reset_at: bucket.window_start.saturating_add(bucket.window_ms),
        }
    }

    /// Drop buckets whose window has fully elapsed
    ///
    /// Returns how many were removed.
    pub fn purge_expired(&self, now_ms: i64) -> usize {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        let before = buckets.len();
        buckets.retain(|_, bucket| !bucket.expired(now_ms));
        before - buckets.len()
    }

    pub fn tracked_keys(&self) -> usize {
        self.buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
