pub mod affect;
pub mod config;
pub mod conversation;
pub mod persona;
pub mod profile;
pub mod repository;
pub mod sentiment;
pub mod state;
pub mod topic;

pub use affect::{EmotionalState, MoodDelta, MoodVector};
pub use config::CleoConfig;
pub use conversation::{
    ContextError, ConversationContext, ConversationKey, TokenUsage, Turn, TurnRole,
};
pub use persona::Persona;
pub use profile::{UserNote, UserProfile};
pub use repository::{ConversationRepository, InMemoryRepository};
pub use sentiment::{KeywordSentiment, SentimentAnalyzer};
pub use state::{ChainStatus, FollowUpState, PendingTopic, ThoughtChainState};
pub use topic::{KeywordTopics, TopicClassifier, TopicId};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A chat message delivered by the transport layer.
///
/// The transport decides how addressing is detected on its platform
/// (`mentions_bot`, `is_direct`); the core only consumes the flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessageEvent {
    pub conversation_key: ConversationKey,
    pub user_id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Platform id (or turn id) of the message this one replies to.
    pub reply_to_id: Option<String>,
    /// Platform message id, used to de-duplicate redelivered events.
    pub message_id: Option<String>,
    pub mentions_bot: bool,
    pub is_direct: bool,
    /// The author is a bot account (including this one).
    #[serde(default)]
    pub from_bot: bool,
}

impl InboundMessageEvent {
    pub fn new(conversation_key: ConversationKey, user_id: &str, text: &str) -> Self {
        Self {
            conversation_key,
            user_id: user_id.to_string(),
            text: text.to_string(),
            timestamp: Utc::now(),
            reply_to_id: None,
            message_id: None,
            mentions_bot: false,
            is_direct: false,
            from_bot: false,
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn mentioning_bot(mut self) -> Self {
        self.mentions_bot = true;
        self
    }

    pub fn direct(mut self) -> Self {
        self.is_direct = true;
        self
    }

    pub fn from_bot(mut self) -> Self {
        self.from_bot = true;
        self
    }

    pub fn replying_to(mut self, id: impl Into<String>) -> Self {
        self.reply_to_id = Some(id.into());
        self
    }

    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    /// Reject events the core cannot attribute to a conversation or speaker.
    pub fn validate(&self) -> Result<(), EventError> {
        if self.conversation_key.channel.trim().is_empty() {
            return Err(EventError::MissingConversationKey);
        }
        if self.user_id.trim().is_empty() {
            return Err(EventError::MissingUser);
        }
        if self.text.trim().is_empty() {
            return Err(EventError::EmptyText);
        }
        Ok(())
    }

    /// Stable turn id for this event. Redelivered events with the same
    /// platform id map to the same turn id.
    pub fn turn_id(&self) -> Uuid {
        match &self.message_id {
            Some(id) => Uuid::new_v5(
                &Uuid::NAMESPACE_OID,
                format!("{}/{}", self.conversation_key, id).as_bytes(),
            ),
            None => Uuid::new_v4(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    #[error("event has no conversation key")]
    MissingConversationKey,
    #[error("event has no user id")]
    MissingUser,
    #[error("event text is empty")]
    EmptyText,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyKind {
    /// Produced by a model completion.
    Generated,
    /// Canned reply surfaced instead of silence after a failure.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub url: String,
}

/// A reply handed back to the transport for delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundReply {
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub kind: ReplyKind,
    /// Id of the assistant turn recorded for this reply. Transports pass it
    /// back as `reply_to_id` when a user replies to the bot.
    pub turn_id: Option<Uuid>,
}

impl OutboundReply {
    pub fn generated(text: String, turn_id: Uuid) -> Self {
        Self {
            text,
            attachments: Vec::new(),
            kind: ReplyKind::Generated,
            turn_id: Some(turn_id),
        }
    }

    pub fn fallback(text: &str) -> Self {
        Self {
            text: text.to_string(),
            attachments: Vec::new(),
            kind: ReplyKind::Fallback,
            turn_id: None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.kind == ReplyKind::Fallback
    }

    /// Split the reply into platform-sized messages.
    ///
    /// Paragraphs are kept together where they fit; longer paragraphs are
    /// split on sentence ends, and a single overlong sentence is hard-split
    /// on character boundaries.
    pub fn chunks(&self, max_chars: usize) -> Vec<String> {
        let max_chars = max_chars.max(1);
        let mut chunks = Vec::new();
        let mut current = String::new();

        for piece in self
            .text
            .split("\n\n")
            .flat_map(split_sentences)
            .filter(|p| !p.trim().is_empty())
        {
            let piece = piece.trim();
            let needed = if current.is_empty() {
                piece.chars().count()
            } else {
                current.chars().count() + 1 + piece.chars().count()
            };
            if needed <= max_chars {
                if !current.is_empty() {
                    current.push(' ');
                }
                current.push_str(piece);
                continue;
            }
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            if piece.chars().count() <= max_chars {
                current.push_str(piece);
            } else {
                let chars: Vec<char> = piece.chars().collect();
                for part in chars.chunks(max_chars) {
                    chunks.push(part.iter().collect());
                }
            }
        }
        if !current.is_empty() {
            chunks.push(current);
        }
        chunks
    }
}

/// Split a paragraph after `.`, `!` or `?` followed by whitespace.
fn split_sentences(paragraph: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut prev_terminal = false;
    for (idx, ch) in paragraph.char_indices() {
        if prev_terminal && ch.is_whitespace() {
            out.push(&paragraph[start..idx]);
            start = idx;
        }
        prev_terminal = matches!(ch, '.' | '!' | '?');
    }
    out.push(&paragraph[start..]);
    out
}
