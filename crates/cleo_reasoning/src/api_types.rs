use cleo_core::TokenUsage;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Sampling parameters for one completion.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
    pub repetition_penalty: Option<f32>,
    pub stop: Vec<String>,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            max_tokens: 300,
            temperature: 0.8,
            top_p: 0.85,
            presence_penalty: 0.25,
            frequency_penalty: 0.25,
            repetition_penalty: None,
            stop: Vec::new(),
        }
    }
}

impl SamplingParams {
    /// Clamp every value into the range the chat completions API accepts.
    /// Non-finite values fall back to the defaults.
    pub fn clamped(&self) -> Self {
        let defaults = Self::default();
        let fix = |v: f32, d: f32, lo: f32, hi: f32| if v.is_finite() { v.clamp(lo, hi) } else { d };
        Self {
            max_tokens: self.max_tokens.clamp(1, 32_768),
            temperature: fix(self.temperature, defaults.temperature, 0.0, 2.0),
            top_p: fix(self.top_p, defaults.top_p, 0.01, 1.0),
            presence_penalty: fix(self.presence_penalty, 0.0, -2.0, 2.0),
            frequency_penalty: fix(self.frequency_penalty, 0.0, -2.0, 2.0),
            repetition_penalty: self
                .repetition_penalty
                .filter(|v| v.is_finite())
                .map(|v| v.clamp(0.01, 2.0)),
            stop: self.stop.iter().take(4).cloned().collect(),
        }
    }
}

/// Provider-neutral completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub params: SamplingParams,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatResponse {
    pub text: String,
    pub usage: Option<TokenUsage>,
    pub finish_reason: Option<String>,
}

impl ChatResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: None,
            finish_reason: Some("stop".to_string()),
        }
    }
}

// Request payload (OpenAI-compatible chat completions)
#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repetition_penalty: Option<f32>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    pub stop: &'a [String],
}

// Response payload
#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
    pub usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: Option<ChoiceMessage>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WireUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
}

impl From<WireUsage> for TokenUsage {
    fn from(u: WireUsage) -> Self {
        TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamped_pulls_values_into_range() {
        let params = SamplingParams {
            max_tokens: 0,
            temperature: 3.5,
            top_p: -1.0,
            presence_penalty: f32::NAN,
            frequency_penalty: -9.0,
            repetition_penalty: Some(5.0),
            stop: vec!["a".into(), "b".into(), "c".into(), "d".into(), "e".into()],
        }
        .clamped();
        assert_eq!(params.max_tokens, 1);
        assert_eq!(params.temperature, 2.0);
        assert_eq!(params.top_p, 0.01);
        assert_eq!(params.presence_penalty, 0.0);
        assert_eq!(params.frequency_penalty, -2.0);
        assert_eq!(params.repetition_penalty, Some(2.0));
        assert_eq!(params.stop.len(), 4);
    }

    #[test]
    fn test_request_serialization_skips_empty() {
        let messages = vec![ChatMessage::system("be nice"), ChatMessage::user("hi")];
        let params = SamplingParams::default();
        let req = ChatCompletionRequest {
            model: "m",
            messages: &messages,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
            presence_penalty: params.presence_penalty,
            frequency_penalty: params.frequency_penalty,
            repetition_penalty: None,
            stop: &params.stop,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert!(json.get("stop").is_none());
        assert!(json.get("repetition_penalty").is_none());
    }

    #[test]
    fn test_response_tolerates_missing_fields() {
        let resp: ChatCompletionResponse = serde_json::from_str(r#"{"id": "x"}"#).unwrap();
        assert!(resp.choices.is_empty());
        assert!(resp.usage.is_none());
    }
}
