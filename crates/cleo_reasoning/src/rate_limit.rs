//! Process-wide admission control for completion requests.
//!
//! A token bucket shared by every conversation. Each request attempt takes
//! one unit; callers suspend until a unit refills or their admission
//! timeout passes. Refill and take happen under one mutex, so concurrent
//! callers can never be admitted past capacity.

use crate::error::ApiError;
use cleo_core::config::RateLimitConfig;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Longest single sleep when neither a refill nor the deadline is representable.
const MAX_SLEEP: Duration = Duration::from_secs(3600);

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Counters exposed for health reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BudgetSnapshot {
    pub admitted: u64,
    pub rejected: u64,
    pub transient_retries: u64,
    pub rate_limit_retries: u64,
}

pub struct RateBudget {
    capacity: f64,
    refill_per_sec: f64,
    bucket: Mutex<Bucket>,
    admitted: AtomicU64,
    rejected: AtomicU64,
    transient_retries: AtomicU64,
    rate_limit_retries: AtomicU64,
}

impl RateBudget {
    /// A full bucket. Capacity is at least one unit; a non-positive refill
    /// rate is treated as one unit per second.
    pub fn new(capacity: u32, refill_per_sec: f64) -> Self {
        let capacity = f64::from(capacity.max(1));
        let refill_per_sec = if refill_per_sec.is_finite() && refill_per_sec > 0.0 {
            refill_per_sec
        } else {
            tracing::warn!("Invalid refill rate {}, using 1.0/s", refill_per_sec);
            1.0
        };
        Self {
            capacity,
            refill_per_sec,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            admitted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            transient_retries: AtomicU64::new(0),
            rate_limit_retries: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.capacity, config.refill_per_sec)
    }

    fn refill(&self, bucket: &mut Bucket, now: Instant) {
        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        bucket.last_refill = now;
    }

    /// Take one unit without waiting.
    pub async fn try_acquire(&self) -> bool {
        let mut bucket = self.bucket.lock().await;
        self.refill(&mut bucket, Instant::now());
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            self.admitted.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Take one unit, waiting at most `timeout` for it to refill. A timeout
    /// too large to represent as an instant waits without a deadline.
    pub async fn acquire(&self, timeout: Duration) -> Result<(), ApiError> {
        let start = Instant::now();
        let deadline = start.checked_add(timeout);
        loop {
            let wake_at = {
                let mut bucket = self.bucket.lock().await;
                let now = Instant::now();
                self.refill(&mut bucket, now);
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    self.admitted.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }
                if deadline.is_some_and(|deadline| now >= deadline) {
                    self.rejected.fetch_add(1, Ordering::Relaxed);
                    let waited = now.saturating_duration_since(start);
                    tracing::warn!("Rate budget exhausted after waiting {:?}", waited);
                    return Err(ApiError::RateLimitExceeded { waited });
                }
                let missing = 1.0 - bucket.tokens;
                let refill_at = Duration::try_from_secs_f64(missing / self.refill_per_sec)
                    .ok()
                    .and_then(|wait| now.checked_add(wait));
                match (refill_at, deadline) {
                    (Some(refill_at), Some(deadline)) => refill_at.min(deadline),
                    (Some(at), None) | (None, Some(at)) => at,
                    // neither fits in an Instant; check back periodically
                    (None, None) => now + MAX_SLEEP,
                }
            };
            tokio::time::sleep_until(wake_at).await;
        }
    }

    pub fn record_transient_retry(&self) {
        self.transient_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limit_retry(&self) {
        self.rate_limit_retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Units currently available, after refill.
    pub async fn available(&self) -> f64 {
        let mut bucket = self.bucket.lock().await;
        self.refill(&mut bucket, Instant::now());
        bucket.tokens
    }

    pub fn snapshot(&self) -> BudgetSnapshot {
        BudgetSnapshot {
            admitted: self.admitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            transient_retries: self.transient_retries.load(Ordering::Relaxed),
            rate_limit_retries: self.rate_limit_retries.load(Ordering::Relaxed),
        }
    }
}
