//! Retry logic with exponential backoff for completion calls.
//!
//! Retries on transient errors (5xx, network failures, timeouts, empty
//! completions) and on provider 429s, which get their own budget and honor
//! `Retry-After`. Does NOT retry on client errors (400, 401, 403, 404, 422)
//! or unparseable bodies.

use crate::error::{LlmError, LlmErrorKind};
use cleo_core::config::RetryPolicyConfig;
use rand::Rng;
use std::time::Duration;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts for transient failures (including the first).
    pub max_attempts: u32,
    /// Maximum number of retries after provider 429s.
    pub max_rate_limit_retries: u32,
    /// Initial delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for each subsequent delay.
    pub backoff_factor: f64,
    /// Upper bound of the random jitter added to each backoff delay.
    pub max_jitter: Duration,
    /// Longest `Retry-After` honored; longer hints are capped.
    pub max_retry_after: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from(&RetryPolicyConfig::default())
    }
}

impl From<&RetryPolicyConfig> for RetryConfig {
    fn from(policy: &RetryPolicyConfig) -> Self {
        Self {
            max_attempts: policy.max_attempts.max(1),
            max_rate_limit_retries: policy.max_rate_limit_retries,
            initial_delay: Duration::from_millis(policy.initial_delay_ms),
            max_delay: Duration::from_millis(policy.max_delay_ms),
            backoff_factor: policy.backoff_factor.max(1.0),
            max_jitter: Duration::from_millis(policy.max_jitter_ms),
            max_retry_after: Duration::from_secs(policy.max_retry_after_secs),
        }
    }
}

impl RetryConfig {
    /// Backoff without jitter before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let exp = self
            .backoff_factor
            .powi(retry.saturating_sub(1).min(63) as i32);
        let nanos = (self.initial_delay.as_nanos() as f64 * exp).min(self.max_delay.as_nanos() as f64);
        Duration::from_nanos(nanos.max(0.0).round() as u64)
    }
}

/// Bookkeeping for one logical request: how many transient failures and
/// 429s it has absorbed so far.
#[derive(Debug, Clone)]
pub struct RetryBudget {
    config: RetryConfig,
    transient_failures: u32,
    rate_limit_retries: u32,
}

impl RetryBudget {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            transient_failures: 0,
            rate_limit_retries: 0,
        }
    }

    /// Record a failed attempt. Returns how long to wait before the next
    /// attempt, or `None` when the error is not retryable or the matching
    /// budget is spent.
    pub fn next_delay(&mut self, error: &LlmError) -> Option<Duration> {
        match error.kind {
            LlmErrorKind::RateLimit => {
                if self.rate_limit_retries >= self.config.max_rate_limit_retries {
                    return None;
                }
                self.rate_limit_retries += 1;
                let delay = match error.retry_after {
                    Some(hint) => hint.min(self.config.max_retry_after),
                    None => self.config.backoff(self.rate_limit_retries) + self.jitter(),
                };
                Some(delay)
            }
            kind if kind.is_transient() => {
                self.transient_failures += 1;
                if self.transient_failures >= self.config.max_attempts {
                    return None;
                }
                Some(self.config.backoff(self.transient_failures) + self.jitter())
            }
            _ => None,
        }
    }

    pub fn transient_failures(&self) -> u32 {
        self.transient_failures
    }

    pub fn rate_limit_retries(&self) -> u32 {
        self.rate_limit_retries
    }

    fn jitter(&self) -> Duration {
        let max = self.config.max_jitter.as_millis() as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max))
    }
}
