use crate::api_types::{ChatRequest, ChatResponse};
use crate::error::LlmError;
use async_trait::async_trait;

/// One attempt against a completion provider. Retries, admission control and
/// timeouts live in [`crate::client::RateLimitedClient`], not here.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a chat completion request. Failures come back classified so the
    /// caller can decide whether to retry.
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError>;

    /// Provider name for logs.
    fn name(&self) -> &str;
}
