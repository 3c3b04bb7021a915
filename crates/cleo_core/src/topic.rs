//! Pluggable topic classification.
//!
//! The thought chain only compares topic ids for equality, so any classifier
//! producing stable ids works. [`KeywordTopics`] is the built-in default.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicId(pub String);

impl TopicId {
    pub fn new(id: &str) -> Self {
        Self(id.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub trait TopicClassifier: Send + Sync {
    /// Topic of `text`, or `None` when nothing recognisable is discussed.
    fn classify(&self, text: &str) -> Option<TopicId>;
}

/// Keyword lookup: the topic with the most keyword hits wins; ties go to the
/// topic listed first.
#[derive(Debug, Clone)]
pub struct KeywordTopics {
    topics: Vec<(TopicId, Vec<String>)>,
}

impl KeywordTopics {
    pub fn new(topics: Vec<(TopicId, Vec<String>)>) -> Self {
        Self { topics }
    }
}

impl Default for KeywordTopics {
    fn default() -> Self {
        let table: &[(&str, &[&str])] = &[
            (
                "ai",
                &["ai", "llm", "gpt", "neural", "model", "machine learning", "chatbot"],
            ),
            (
                "music",
                &["music", "song", "album", "band", "guitar", "piano", "concert", "playlist"],
            ),
            (
                "science",
                &["science", "physics", "chemistry", "biology", "space", "quantum", "planet", "experiment"],
            ),
            (
                "art",
                &["art", "painting", "drawing", "museum", "artist", "sketch"],
            ),
            (
                "technology",
                &["code", "programming", "rust", "python", "computer", "linux", "software", "app"],
            ),
            (
                "sports",
                &["football", "soccer", "basketball", "tennis", "match", "team", "score"],
            ),
            (
                "movies",
                &["movie", "film", "cinema", "actor", "director", "series", "netflix"],
            ),
            (
                "gaming",
                &["game", "gaming", "minecraft", "steam", "console", "nintendo", "playstation"],
            ),
        ];

        Self::new(
            table
                .iter()
                .map(|(id, words)| {
                    (
                        TopicId::new(id),
                        words.iter().map(|w| w.to_string()).collect(),
                    )
                })
                .collect(),
        )
    }
}

impl TopicClassifier for KeywordTopics {
    fn classify(&self, text: &str) -> Option<TopicId> {
        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        let mut best: Option<(&TopicId, usize)> = None;
        for (id, keywords) in &self.topics {
            let hits = keywords
                .iter()
                .filter(|k| {
                    if k.contains(' ') {
                        lowered.contains(k.as_str())
                    } else {
                        // allow simple plurals ("songs", "games")
                        words
                            .iter()
                            .any(|w| *w == k.as_str() || w.strip_suffix('s') == Some(k.as_str()))
                    }
                })
                .count();
            if hits > 0 && best.map_or(true, |(_, b)| hits > b) {
                best = Some((id, hits));
            }
        }
        best.map(|(id, _)| id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifies_by_keywords() {
        let topics = KeywordTopics::default();
        assert_eq!(
            topics.classify("what's your favorite song on that album?"),
            Some(TopicId::new("music"))
        );
        assert_eq!(
            topics.classify("quantum physics is wild"),
            Some(TopicId::new("science"))
        );
        assert_eq!(
            topics.classify("I've been playing games all day"),
            Some(TopicId::new("gaming"))
        );
    }

    #[test]
    fn test_no_topic_for_small_talk() {
        let topics = KeywordTopics::default();
        assert_eq!(topics.classify("hey"), None);
        assert_eq!(topics.classify("how are you doing today"), None);
    }

    #[test]
    fn test_whole_word_only() {
        let topics = KeywordTopics::default();
        // "said" contains "ai" but is not about AI
        assert_eq!(topics.classify("she said hi"), None);
    }

    #[test]
    fn test_custom_topics() {
        let topics = KeywordTopics::new(vec![(
            TopicId::new("cats"),
            vec!["cat".to_string(), "kitten".to_string()],
        )]);
        assert_eq!(topics.classify("my kitten is asleep"), Some(TopicId::new("cats")));
        assert_eq!(topics.classify("my dog is asleep"), None);
    }
}
