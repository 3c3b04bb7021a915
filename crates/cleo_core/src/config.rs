use crate::persona::Persona;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CleoConfig {
    pub llm: LlmConfig,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryPolicyConfig,
    pub emotion: EmotionConfig,
    pub chain: ChainConfig,
    pub context: ContextConfig,
    pub persona: Persona,
}

impl CleoConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    /// After loading, env var overrides are applied and the result is validated.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: CleoConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Try to load from path; if file doesn't exist, return defaults with env overrides.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config file not found or invalid ({}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }

    /// Apply environment variable overrides on top of file-based config.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("CLEO_LLM_PROVIDER") {
            self.llm.provider = v;
        }
        if let Ok(v) = std::env::var("CLEO_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("CLEO_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        let key = std::env::var("CLEO_LLM_API_KEY")
            .or_else(|_| std::env::var("OPENROUTER_API_KEY"))
            .or_else(|_| std::env::var("OPENAI_API_KEY"));
        if let Ok(v) = key {
            self.llm.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("CLEO_LLM_MAX_TOKENS") {
            if let Ok(n) = v.parse() {
                self.llm.max_tokens = n;
            }
        }
        if let Ok(v) = std::env::var("CLEO_RATE_CAPACITY") {
            if let Ok(n) = v.parse() {
                self.rate_limit.capacity = n;
            }
        }
        if let Ok(v) = std::env::var("CLEO_RATE_REFILL_PER_SEC") {
            if let Ok(n) = v.parse() {
                self.rate_limit.refill_per_sec = n;
            }
        }
        if let Ok(v) = std::env::var("CLEO_REQUIRE_ADDRESS") {
            if let Ok(b) = v.parse() {
                self.chain.require_address = b;
            }
        }
    }

    /// Reject settings that would make the core misbehave rather than
    /// silently clamping them.
    pub fn validate(&self) -> Result<()> {
        if self.rate_limit.capacity == 0 {
            anyhow::bail!("rate_limit.capacity must be at least 1");
        }
        if !(self.rate_limit.refill_per_sec.is_finite() && self.rate_limit.refill_per_sec > 0.0) {
            anyhow::bail!("rate_limit.refill_per_sec must be a positive number");
        }
        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }
        if !(self.retry.backoff_factor.is_finite() && self.retry.backoff_factor >= 1.0) {
            anyhow::bail!("retry.backoff_factor must be >= 1.0");
        }
        if !(0.0..=1.0).contains(&self.emotion.max_delta_per_update) {
            anyhow::bail!("emotion.max_delta_per_update must be within [0, 1]");
        }
        if self.context.max_turns == 0 {
            anyhow::bail!("context.max_turns must be at least 1");
        }
        if self.persona.max_chunk_chars == 0 {
            anyhow::bail!("persona.max_chunk_chars must be at least 1");
        }
        Ok(())
    }
}

// ============================================================================
// Sub-configs
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// "openai" (any OpenAI-compatible endpoint) or "mock".
    pub provider: String,
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
    /// Upper bound on completion length; length classes scale within it.
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
    pub stop: Vec<String>,
    pub repetition_penalty: Option<f32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "nousresearch/hermes-3-llama-3.1-405b".to_string(),
            base_url: "https://openrouter.ai/api/v1".to_string(),
            api_key: None,
            max_tokens: 600,
            request_timeout_secs: 60,
            stop: vec!["<end>".to_string()],
            repetition_penalty: Some(1.15),
        }
    }
}

impl LlmConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Bucket size: the burst of requests admitted without waiting.
    pub capacity: u32,
    /// Tokens restored per second.
    pub refill_per_sec: f64,
    /// How long a request may wait for admission before failing.
    pub admission_timeout_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 60,
            refill_per_sec: 1.0,
            admission_timeout_secs: 30,
        }
    }
}

impl RateLimitConfig {
    pub fn admission_timeout(&self) -> Duration {
        Duration::from_secs(self.admission_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryPolicyConfig {
    /// Total attempts for transient failures, including the first.
    pub max_attempts: u32,
    /// Provider 429 retries, counted separately from transient failures.
    pub max_rate_limit_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
    pub max_jitter_ms: u64,
    /// Longest `Retry-After` the client will honor.
    pub max_retry_after_secs: u64,
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            max_rate_limit_retries: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_factor: 2.0,
            max_jitter_ms: 500,
            max_retry_after_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmotionConfig {
    pub max_delta_per_update: f32,
    /// Time for a mood axis to decay halfway to neutral. 0 disables decay.
    pub half_life_secs: f64,
}

impl Default for EmotionConfig {
    fn default() -> Self {
        Self {
            max_delta_per_update: 0.3,
            half_life_secs: 1800.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Only reply when addressed. When false every message engages.
    pub require_address: bool,
    pub max_interruption_depth: u32,
    /// How long an interrupted topic stays resumable.
    pub staleness_window_secs: u64,
    pub inactivity_timeout_secs: u64,
    pub max_consecutive_failures: u32,
    /// A user message within this long after a bot question continues it.
    pub question_recency_secs: u64,
    pub follow_up_cooldown_secs: u64,
    pub max_follow_ups: u32,
    /// Record a message without replying when a newer one is already queued
    /// for the same conversation.
    pub collapse_queued_messages: bool,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            require_address: true,
            max_interruption_depth: 3,
            staleness_window_secs: 600,
            inactivity_timeout_secs: 3600,
            max_consecutive_failures: 3,
            question_recency_secs: 300,
            follow_up_cooldown_secs: 300,
            max_follow_ups: 1,
            collapse_queued_messages: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub max_turns: usize,
    /// Turns older than this are left out of prompts.
    pub relevance_window_hours: u64,
    /// Prompt size budget in characters (~4 chars per token).
    pub prompt_budget_chars: usize,
    /// Most recent turns that truncation never drops.
    pub pinned_recent_turns: usize,
    /// Most history turns a prompt carries before truncation.
    pub max_prompt_turns: usize,
    /// Most recent user notes included in the system prompt.
    pub prompt_notes: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_turns: 50,
            relevance_window_hours: 4,
            prompt_budget_chars: 24_000,
            pinned_recent_turns: 4,
            max_prompt_turns: 12,
            prompt_notes: 5,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
