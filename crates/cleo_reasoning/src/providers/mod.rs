pub mod mock;
pub mod openai;

pub use mock::MockProvider;
pub use openai::OpenAiClient;

use crate::llm::LlmClient;
use anyhow::Result;
use cleo_core::config::LlmConfig;
use std::sync::Arc;

/// Build the provider named in the config.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    match config.provider.as_str() {
        "openai" | "openrouter" => Ok(Arc::new(OpenAiClient::from_config(config)?)),
        "mock" => Ok(Arc::new(MockProvider::new(&config.model))),
        other => anyhow::bail!("Unknown LLM provider: {}", other),
    }
}
