//! What the bot remembers about each user across conversations: interests
//! picked up from their messages and notes the model chose to keep.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const INTEREST_KEYWORDS: &[&str] = &[
    "ai", "music", "science", "art", "technology", "sports", "movies", "gaming",
];

/// Oldest notes are dropped past this many.
pub const MAX_NOTES: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserNote {
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub interests: BTreeSet<String>,
    pub notes: Vec<UserNote>,
    pub last_updated_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(user_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            interests: BTreeSet::new(),
            notes: Vec::new(),
            last_updated_at: now,
        }
    }

    /// Merge interests mentioned in `text`. Returns whether anything new
    /// was learned.
    pub fn observe_interests(&mut self, text: &str, now: DateTime<Utc>) -> bool {
        let before = self.interests.len();
        self.interests.extend(extract_interests(text));
        let changed = self.interests.len() != before;
        if changed {
            self.last_updated_at = now;
        }
        changed
    }

    /// Keep a note. Blank notes and exact repeats of an existing note are
    /// skipped.
    pub fn add_note(&mut self, content: &str, now: DateTime<Utc>) -> bool {
        let content = content.trim();
        if content.is_empty() || self.notes.iter().any(|n| n.content == content) {
            return false;
        }
        self.notes.push(UserNote {
            content: content.to_string(),
            created_at: now,
        });
        if self.notes.len() > MAX_NOTES {
            let excess = self.notes.len() - MAX_NOTES;
            self.notes.drain(..excess);
        }
        self.last_updated_at = now;
        true
    }

    /// The `limit` most recent notes, oldest first.
    pub fn recent_notes(&self, limit: usize) -> &[UserNote] {
        &self.notes[self.notes.len().saturating_sub(limit)..]
    }

    pub fn is_empty(&self) -> bool {
        self.interests.is_empty() && self.notes.is_empty()
    }
}

/// Interest keywords that appear as whole words in `text`.
pub fn extract_interests(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| INTEREST_KEYWORDS.contains(w))
        .map(str::to_string)
        .collect()
}
