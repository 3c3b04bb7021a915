//! Mock LLM provider with scripted, deterministic responses for tests.
//!
//! Scripted outcomes are served in order; once the script runs out every
//! call gets the default reply.

use crate::api_types::{ChatRequest, ChatResponse};
use crate::error::LlmError;
use crate::llm::LlmClient;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug)]
pub struct MockProvider {
    model: String,
    script: Mutex<VecDeque<Result<ChatResponse, LlmError>>>,
    requests: Mutex<Vec<ChatRequest>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl MockProvider {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            delay: None,
        }
    }

    /// Serve these outcomes first, in order.
    pub fn with_script(self, outcomes: impl IntoIterator<Item = Result<ChatResponse, LlmError>>) -> Self {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(outcomes);
        self
    }

    /// Sleep this long before answering. Uses tokio time, so paused test
    /// clocks apply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push(&self, outcome: Result<ChatResponse, LlmError>) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(outcome);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn last_request(&self) -> Option<ChatRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }
}

#[async_trait::async_trait]
impl LlmClient for MockProvider {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        scripted.unwrap_or_else(|| {
            Ok(ChatResponse::text(format!(
                "(Mock {} Response) I received your prompt.",
                self.model
            )))
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_types::{ChatMessage, SamplingParams};
    use crate::error::LlmErrorKind;

    fn request() -> ChatRequest {
        ChatRequest {
            messages: vec![ChatMessage::user("hi")],
            params: SamplingParams::default(),
        }
    }

    #[tokio::test]
    async fn test_mock_complete() {
        let provider = MockProvider::new("test-model");
        let resp = provider.complete(&request()).await.unwrap();
        assert!(resp.text.contains("Mock"));
        assert!(resp.text.contains("test-model"));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_script_then_default() {
        let provider = MockProvider::new("m").with_script([
            Err(LlmError::server_error("503")),
            Ok(ChatResponse::text("second")),
        ]);
        let first = provider.complete(&request()).await.unwrap_err();
        assert_eq!(first.kind, LlmErrorKind::ServerError);
        assert_eq!(provider.complete(&request()).await.unwrap().text, "second");
        assert!(provider.complete(&request()).await.unwrap().text.contains("Mock"));
        assert_eq!(provider.requests().len(), 3);
    }
}
