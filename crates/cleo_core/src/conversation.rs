//! Conversation history: keys, turns and the bounded per-conversation context.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Stable identifier for one logical conversation: a channel plus an
/// optional thread inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationKey {
    pub channel: String,
    pub thread: Option<String>,
}

impl ConversationKey {
    pub fn new(channel: &str) -> Self {
        Self {
            channel: channel.to_string(),
            thread: None,
        }
    }

    pub fn with_thread(channel: &str, thread: &str) -> Self {
        Self {
            channel: channel.to_string(),
            thread: Some(thread.to_string()),
        }
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.thread {
            Some(thread) => write!(f, "{}:{}", self.channel, thread),
            None => write!(f, "{}", self.channel),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

/// Token accounting reported by the completion API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// One message in a conversation, inbound or outbound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub id: Uuid,
    pub speaker: String,
    pub role: TurnRole,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl Turn {
    pub fn user(id: Uuid, speaker: &str, text: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            id,
            speaker: speaker.to_string(),
            role: TurnRole::User,
            text: text.to_string(),
            timestamp,
            usage: None,
        }
    }

    pub fn assistant(speaker: &str, text: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            speaker: speaker.to_string(),
            role: TurnRole::Assistant,
            text: text.to_string(),
            timestamp,
            usage: None,
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn is_assistant(&self) -> bool {
        self.role == TurnRole::Assistant
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("turn {0} is already recorded in this conversation")]
    DuplicateTurn(Uuid),
}

/// Ordered, bounded turn history for one conversation.
///
/// Invariants: timestamps strictly increase and turn ids are unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub key: ConversationKey,
    turns: VecDeque<Turn>,
}

impl ConversationContext {
    pub fn new(key: ConversationKey) -> Self {
        Self {
            key,
            turns: VecDeque::new(),
        }
    }

    pub fn turns(&self) -> impl DoubleEndedIterator<Item = &Turn> + ExactSizeIterator {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last_turn(&self) -> Option<&Turn> {
        self.turns.back()
    }

    pub fn last_assistant_turn(&self) -> Option<&Turn> {
        self.turns.iter().rev().find(|t| t.is_assistant())
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.turns.iter().any(|t| t.id == id)
    }

    pub fn find(&self, id: &str) -> Option<&Turn> {
        let id = Uuid::parse_str(id).ok()?;
        self.turns.iter().find(|t| t.id == id)
    }

    /// Append a turn, evicting the oldest turns beyond `max_turns`.
    ///
    /// A turn stamped at or before the previous turn is re-stamped one
    /// millisecond after it so the history stays strictly ordered.
    pub fn append(&mut self, mut turn: Turn, max_turns: usize) -> Result<&Turn, ContextError> {
        if self.contains(turn.id) {
            return Err(ContextError::DuplicateTurn(turn.id));
        }
        if let Some(last) = self.turns.back() {
            if turn.timestamp <= last.timestamp {
                tracing::debug!(
                    "Re-stamping turn {} in {} to keep history ordered",
                    turn.id,
                    self.key
                );
                turn.timestamp = last.timestamp + Duration::milliseconds(1);
            }
        }
        self.turns.push_back(turn);
        while self.turns.len() > max_turns.max(1) {
            self.turns.pop_front();
        }
        // push_back above guarantees a last element
        Ok(&self.turns[self.turns.len() - 1])
    }

    /// Turns still relevant at `now`: newer than `window`, at most `limit`
    /// of them, oldest first.
    pub fn relevant_turns(&self, now: DateTime<Utc>, window: Duration, limit: usize) -> Vec<&Turn> {
        let cutoff = now - window;
        let mut recent: Vec<&Turn> = self
            .turns
            .iter()
            .rev()
            .filter(|t| t.timestamp >= cutoff)
            .take(limit)
            .collect();
        recent.reverse();
        recent
    }
}
