use crate::api_types::{ChatCompletionRequest, ChatCompletionResponse, ChatRequest, ChatResponse};
use crate::error::LlmError;
use crate::llm::LlmClient;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use cleo_core::config::LlmConfig;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// Client for any OpenAI-compatible chat completions endpoint
/// (OpenAI, OpenRouter, vLLM, llama.cpp server).
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(base_url: &str, model: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        if api_key.is_none() {
            tracing::warn!("No API key configured for {}; sending unauthenticated requests", base_url);
        }
        Ok(Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .context("Failed to build HTTP client")?,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        Self::new(
            &config.base_url,
            &config.model,
            config.api_key.clone(),
            config.request_timeout(),
        )
    }
}

#[async_trait::async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let params = request.params.clamped();
        let payload = ChatCompletionRequest {
            model: &self.model,
            messages: &request.messages,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
            presence_penalty: params.presence_penalty,
            frequency_penalty: params.frequency_penalty,
            repetition_penalty: params.repetition_penalty,
            stop: &params.stop,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let mut builder = self.client.post(&url).json(&payload);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::timeout(format!("OpenAI request timed out: {}", e))
            } else {
                LlmError::network(format!("Failed to send request to OpenAI: {}", e))
            }
        })?;

        let status = response.status();
        let retry_after = parse_retry_after(response.headers(), Utc::now());
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::timeout(format!("Timed out reading OpenAI response: {}", e))
            } else {
                LlmError::network(format!("Failed to read OpenAI response: {}", e))
            }
        })?;

        if !status.is_success() {
            let mut err = classify_error(status, &body);
            if let Some(wait) = retry_after {
                err = err.with_retry_after(wait);
            }
            return Err(err);
        }

        parse_response(&body)
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// Map an HTTP failure onto an error kind.
pub fn classify_error(status: StatusCode, body: &str) -> LlmError {
    let snippet: String = body.chars().take(300).collect();
    let message = format!("OpenAI API Error ({}): {}", status, snippet);
    match status.as_u16() {
        401 | 403 => LlmError::auth(message),
        408 => LlmError::timeout(message),
        429 => LlmError::rate_limit(message),
        400..=499 => LlmError::invalid_request(message),
        500..=599 => LlmError::server_error(message),
        _ => LlmError::unknown(message),
    }
}

fn parse_response(body: &str) -> Result<ChatResponse, LlmError> {
    let parsed: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|e| LlmError::unparseable(format!("Invalid completion body: {}", e)))?;

    let usage = parsed.usage.map(Into::into);
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::incomplete("Completion returned no choices"))?;

    let text = choice
        .message
        .and_then(|m| m.content)
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| LlmError::incomplete("Completion returned empty content"))?;

    Ok(ChatResponse {
        text,
        usage,
        finish_reason: choice.finish_reason,
    })
}

/// Retry-After is either delta-seconds or an HTTP date.
fn parse_retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let when = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
    Some((when - now).to_std().unwrap_or(Duration::ZERO))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_types::{ChatMessage, SamplingParams};
    use crate::error::LlmErrorKind;
    use reqwest::header::HeaderValue;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> ChatRequest {
        ChatRequest {
            messages: vec![ChatMessage::system("you are cleo"), ChatMessage::user("hi")],
            params: SamplingParams::default(),
        }
    }

    fn client(server: &MockServer) -> OpenAiClient {
        OpenAiClient::new(
            &server.uri(),
            "test-model",
            Some("sk-test".into()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_successful_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{
                    "message": {"role": "assistant", "content": "hey you"},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 12, "completion_tokens": 3}
            })))
            .mount(&server)
            .await;

        let resp = client(&server).complete(&request()).await.unwrap();
        assert_eq!(resp.text, "hey you");
        assert_eq!(resp.finish_reason.as_deref(), Some("stop"));
        assert_eq!(resp.usage.unwrap().total(), 15);
    }

    #[tokio::test]
    async fn test_rate_limit_carries_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("retry-after", "7")
                    .set_body_string("slow down"),
            )
            .mount(&server)
            .await;

        let err = client(&server).complete(&request()).await.unwrap_err();
        assert_eq!(err.kind, LlmErrorKind::RateLimit);
        assert_eq!(err.retry_after, Some(Duration::from_secs(7)));
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = client(&server).complete(&request()).await.unwrap_err();
        assert_eq!(err.kind, LlmErrorKind::ServerError);
        assert!(err.kind.is_transient());
    }

    #[tokio::test]
    async fn test_empty_content_is_incomplete() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "   "}, "finish_reason": "length"}]
            })))
            .mount(&server)
            .await;

        let err = client(&server).complete(&request()).await.unwrap_err();
        assert_eq!(err.kind, LlmErrorKind::Incomplete);
    }

    #[tokio::test]
    async fn test_garbage_body_is_unparseable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = client(&server).complete(&request()).await.unwrap_err();
        assert_eq!(err.kind, LlmErrorKind::Unparseable);
        assert!(!err.kind.is_retryable());
    }

    #[test]
    fn test_classify_error() {
        assert_eq!(classify_error(StatusCode::UNAUTHORIZED, "").kind, LlmErrorKind::Auth);
        assert_eq!(classify_error(StatusCode::FORBIDDEN, "").kind, LlmErrorKind::Auth);
        assert_eq!(classify_error(StatusCode::REQUEST_TIMEOUT, "").kind, LlmErrorKind::Timeout);
        assert_eq!(classify_error(StatusCode::BAD_REQUEST, "").kind, LlmErrorKind::InvalidRequest);
        assert_eq!(classify_error(StatusCode::NOT_FOUND, "").kind, LlmErrorKind::InvalidRequest);
        assert_eq!(classify_error(StatusCode::BAD_GATEWAY, "").kind, LlmErrorKind::ServerError);
        assert_eq!(classify_error(StatusCode::TOO_MANY_REQUESTS, "").kind, LlmErrorKind::RateLimit);
    }

    #[test]
    fn test_retry_after_http_date() {
        let now = DateTime::parse_from_rfc2822("Wed, 21 Oct 2026 07:28:00 GMT")
            .unwrap()
            .with_timezone(&Utc);
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2026 07:28:30 GMT"));
        assert_eq!(parse_retry_after(&headers, now), Some(Duration::from_secs(30)));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("soon"));
        assert_eq!(parse_retry_after(&headers, now), None);
    }
}
