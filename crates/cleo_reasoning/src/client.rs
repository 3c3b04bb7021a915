//! Rate-limited, retrying completion client.
//!
//! Wraps one [`LlmClient`] with admission control (a shared [`RateBudget`]),
//! a per-attempt timeout and the retry policy. Callers see either a
//! completion or a single terminal [`ApiError`].

use crate::api_types::{ChatRequest, SamplingParams};
use crate::error::{ApiError, LlmError};
use crate::llm::LlmClient;
use crate::prompts::PromptContext;
use crate::rate_limit::RateBudget;
use crate::retry::{RetryBudget, RetryConfig};
use cleo_core::{CleoConfig, TokenUsage};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResult {
    pub text: String,
    pub usage: Option<TokenUsage>,
    pub finish_reason: Option<String>,
    /// Attempts it took, including the successful one.
    pub attempts: u32,
}

pub struct RateLimitedClient {
    llm: Arc<dyn LlmClient>,
    budget: Arc<RateBudget>,
    retry: RetryConfig,
    request_timeout: Duration,
    admission_timeout: Duration,
}

impl RateLimitedClient {
    pub fn new(llm: Arc<dyn LlmClient>, budget: Arc<RateBudget>) -> Self {
        Self {
            llm,
            budget,
            retry: RetryConfig::default(),
            request_timeout: Duration::from_secs(60),
            admission_timeout: Duration::from_secs(30),
        }
    }

    pub fn from_config(llm: Arc<dyn LlmClient>, budget: Arc<RateBudget>, config: &CleoConfig) -> Self {
        Self::new(llm, budget)
            .with_retry(RetryConfig::from(&config.retry))
            .with_request_timeout(config.llm.request_timeout())
            .with_admission_timeout(config.rate_limit.admission_timeout())
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_admission_timeout(mut self, timeout: Duration) -> Self {
        self.admission_timeout = timeout;
        self
    }

    pub fn budget(&self) -> &Arc<RateBudget> {
        &self.budget
    }

    pub async fn complete(
        &self,
        prompt: &PromptContext,
        params: &SamplingParams,
    ) -> Result<CompletionResult, ApiError> {
        self.complete_with_timeout(prompt, params, self.admission_timeout)
            .await
    }

    /// Like [`complete`](Self::complete) with an explicit admission timeout.
    /// Every attempt, retries included, takes a unit from the rate budget.
    #[tracing::instrument(skip_all, fields(provider = %self.llm.name(), turns = prompt.len()))]
    pub async fn complete_with_timeout(
        &self,
        prompt: &PromptContext,
        params: &SamplingParams,
        admission_timeout: Duration,
    ) -> Result<CompletionResult, ApiError> {
        let request = ChatRequest {
            messages: prompt.to_messages(),
            params: params.clamped(),
        };
        let mut retry = RetryBudget::new(self.retry.clone());
        let mut attempts = 0u32;

        loop {
            self.budget.acquire(admission_timeout).await?;
            attempts += 1;

            let outcome = match tokio::time::timeout(self.request_timeout, self.llm.complete(&request)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(LlmError::timeout(format!(
                    "{} did not answer within {:?}",
                    self.llm.name(),
                    self.request_timeout
                ))),
            };

            let error = match outcome {
                Ok(response) => {
                    if attempts > 1 {
                        tracing::info!("{} succeeded on attempt {}", self.llm.name(), attempts);
                    }
                    return Ok(CompletionResult {
                        text: response.text,
                        usage: response.usage,
                        finish_reason: response.finish_reason,
                        attempts,
                    });
                }
                Err(e) => e,
            };

            if !error.kind.is_retryable() {
                tracing::warn!("{} rejected the request: {}", self.llm.name(), error);
                return Err(ApiError::ApiRejected {
                    kind: error.kind,
                    message: error.message,
                });
            }

            let Some(delay) = retry.next_delay(&error) else {
                tracing::warn!(
                    "{} unavailable after {} attempts: {}",
                    self.llm.name(),
                    attempts,
                    error
                );
                return Err(ApiError::ApiUnavailable {
                    attempts,
                    last_error: error.message,
                });
            };

            if error.kind.is_transient() {
                self.budget.record_transient_retry();
            } else {
                self.budget.record_rate_limit_retry();
            }
            tracing::warn!(
                "{} attempt {} failed ({:?}), retrying in {:.1}s: {}",
                self.llm.name(),
                attempts,
                error.kind,
                delay.as_secs_f64(),
                error.message.chars().take(200).collect::<String>()
            );
            tokio::time::sleep(delay).await;
        }
    }
}
