//! Conversation orchestration for Cleo: thought chains, prompt assembly and
//! rate-limited completions.

pub mod api_types;
pub mod client;
pub mod decision;
pub mod error;
pub mod llm;
pub mod locks;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod rate_limit;
pub mod retry;
pub mod sanitize;
pub mod thought_chain;

pub use client::{CompletionResult, RateLimitedClient};
pub use decision::{EngageReason, Engagement};
pub use error::{ApiError, LlmError, LlmErrorKind, OrchestratorError};
pub use orchestrator::{ConversationOrchestrator, HandleOutcome};
pub use rate_limit::{BudgetSnapshot, RateBudget};
pub use thought_chain::ThoughtChain;
