//! Error taxonomy for completions and orchestration.
//!
//! Providers report a classified [`LlmError`] per attempt. The rate-limited
//! client folds attempts into one [`ApiError`], and the orchestrator reports
//! [`OrchestratorError`] to the transport. Every terminal error can produce
//! a fallback reply so the user never gets silence.

use cleo_core::{ChainStatus, ConversationKey, EventError, OutboundReply, Persona};
use std::time::Duration;
use thiserror::Error;

/// One failed provider attempt, with classification.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct LlmError {
    pub kind: LlmErrorKind,
    pub message: String,
    pub retry_after: Option<Duration>,
}

impl LlmError {
    pub fn new(kind: LlmErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, duration: Duration) -> Self {
        self.retry_after = Some(duration);
        self
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Timeout, message)
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::RateLimit, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::ServerError, message)
    }

    pub fn incomplete(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Incomplete, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Auth, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::InvalidRequest, message)
    }

    pub fn unparseable(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Unparseable, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Unknown, message)
    }
}

/// Error classification for retry logic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    /// Connection refused, reset, DNS - retryable
    Network,
    /// Attempt exceeded the request timeout - retryable
    Timeout,
    /// Provider said 429 - retryable on its own budget
    RateLimit,
    /// 5xx - retryable
    ServerError,
    /// 200 with no usable content - retryable
    Incomplete,
    /// 401, 403 - not retryable
    Auth,
    /// 400, 404, 422 and other client errors - not retryable
    InvalidRequest,
    /// Body could not be decoded - not retryable
    Unparseable,
    /// Anything else - not retryable
    Unknown,
}

impl LlmErrorKind {
    /// Transient failures retried on the attempt budget.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network | Self::Timeout | Self::ServerError | Self::Incomplete
        )
    }

    pub fn is_retryable(&self) -> bool {
        self.is_transient() || *self == Self::RateLimit
    }
}

/// Terminal outcome of a rate-limited completion.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// No admission token became available in time. Never sent upstream.
    #[error("rate budget exhausted after waiting {waited:?}")]
    RateLimitExceeded { waited: Duration },

    /// Retries exhausted on transient failures or provider 429s.
    #[error("completion API unavailable after {attempts} attempts: {last_error}")]
    ApiUnavailable { attempts: u32, last_error: String },

    /// The provider refused the request; retrying would not help.
    #[error("completion request rejected ({kind:?}): {message}")]
    ApiRejected { kind: LlmErrorKind, message: String },

    #[error("completion cancelled")]
    Cancelled,
}

impl ApiError {
    pub fn fallback_reply(&self, persona: &Persona) -> OutboundReply {
        match self {
            ApiError::RateLimitExceeded { .. } => OutboundReply::fallback(&persona.busy_reply),
            ApiError::ApiUnavailable { .. } => OutboundReply::fallback(&persona.unavailable_reply),
            ApiError::ApiRejected { .. } | ApiError::Cancelled => {
                OutboundReply::fallback(&persona.error_reply)
            }
        }
    }

    /// Whether the failure counts toward closing the thought chain.
    pub fn counts_as_chain_failure(&self) -> bool {
        matches!(
            self,
            ApiError::ApiUnavailable { .. } | ApiError::ApiRejected { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The event is structurally unusable. Nothing was recorded.
    #[error("invalid event: {0}")]
    InvalidEvent(#[from] EventError),

    /// The chain was in a state that forbids the requested transition.
    /// The conversation has been force-closed.
    #[error("thought chain for {key} was {status} when a new model call was requested")]
    StateConflict {
        key: ConversationKey,
        status: ChainStatus,
    },

    /// The repository failed after one retry. `reply` holds a reply that
    /// was already generated and can still be delivered.
    #[error("conversation storage failed: {source}")]
    StorageFailure {
        #[source]
        source: anyhow::Error,
        reply: Option<OutboundReply>,
    },

    /// The caller cancelled the request. Nothing was persisted.
    #[error("message handling cancelled")]
    Cancelled,
}

impl OrchestratorError {
    pub fn storage(source: anyhow::Error) -> Self {
        OrchestratorError::StorageFailure {
            source,
            reply: None,
        }
    }

    /// Reply to deliver instead of silence.
    pub fn fallback_reply(&self, persona: &Persona) -> OutboundReply {
        match self {
            OrchestratorError::StorageFailure {
                reply: Some(reply), ..
            } => reply.clone(),
            _ => OutboundReply::fallback(&persona.error_reply),
        }
    }
}
