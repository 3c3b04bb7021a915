//! Persistent thought-chain state.
//!
//! The transition logic lives in `cleo_reasoning::thought_chain`; this module
//! only defines the data that survives between messages.

use crate::conversation::ConversationKey;
use crate::topic::TopicId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainStatus {
    Idle,
    Active,
    AwaitingResponse,
    Interrupted,
    Closed,
}

impl ChainStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChainStatus::Closed)
    }
}

impl std::fmt::Display for ChainStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChainStatus::Idle => "idle",
            ChainStatus::Active => "active",
            ChainStatus::AwaitingResponse => "awaiting_response",
            ChainStatus::Interrupted => "interrupted",
            ChainStatus::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// A topic set aside by an interruption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTopic {
    pub topic: TopicId,
    pub saved_at: DateTime<Utc>,
}

/// Bookkeeping for unprompted follow-up thoughts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FollowUpState {
    /// A follow-up may be issued for the last engaged reply.
    pub available: bool,
    /// Follow-ups issued since the last user message.
    pub count: u32,
    pub last_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThoughtChainState {
    pub chain_id: Uuid,
    pub key: ConversationKey,
    pub status: ChainStatus,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub current_topic: Option<TopicId>,
    /// Interrupted topics, most recent last.
    #[serde(default)]
    pub pending_topics: Vec<PendingTopic>,
    pub interruption_depth: u32,
    pub consecutive_failures: u32,
    #[serde(default)]
    pub follow_up: FollowUpState,
}

impl ThoughtChainState {
    pub fn new(key: ConversationKey, now: DateTime<Utc>) -> Self {
        Self {
            chain_id: Uuid::new_v4(),
            key,
            status: ChainStatus::Idle,
            created_at: now,
            last_activity_at: now,
            current_topic: None,
            pending_topics: Vec::new(),
            interruption_depth: 0,
            consecutive_failures: 0,
            follow_up: FollowUpState::default(),
        }
    }

    /// The topic that would be resumed next, if any.
    pub fn pending_topic(&self) -> Option<&PendingTopic> {
        self.pending_topics.last()
    }

    pub fn is_closed(&self) -> bool {
        self.status.is_terminal()
    }
}
