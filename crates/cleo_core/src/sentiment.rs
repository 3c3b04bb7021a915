//! Simple keyword-based English sentiment analysis.
//!
//! The orchestrator depends only on the [`SentimentAnalyzer`] trait; the
//! keyword implementation is the default and can be swapped for a model.

use crate::affect::MoodDelta;

const POSITIVE: &[&str] = &[
    "good", "great", "fantastic", "amazing", "love", "happy", "wonderful", "best", "awesome",
    "nice", "cool", "fun", "glad", "haha", "lol", "😊", "❤️", "👍", "😄",
];

const NEGATIVE: &[&str] = &[
    "bad", "terrible", "sad", "angry", "hate", "worst", "awful", "horrible", "disappointed",
    "disappointing", "upset", "annoyed", "ugh", ":(", "😢", "😡", "💔",
];

const WARM: &[&str] = &[
    "thanks", "thank you", "thx", "appreciate", "friend", "miss you", "love you", "<3", "🥰",
    "❤️",
];

const COLD: &[&str] = &[
    "shut up", "stupid", "go away", "whatever", "annoying", "useless", "boring",
];

const INTENSE: &[&str] = &["very", "so", "really", "super", "extremely", "!", "?!"];

fn count_matches(lowered: &str, words: &[&str], list: &[&str]) -> f32 {
    list.iter()
        .filter(|entry| {
            if entry.chars().all(|c| c.is_alphabetic()) {
                words.iter().any(|w| w == *entry)
            } else {
                lowered.contains(*entry)
            }
        })
        .count() as f32
}

fn tokenize(lowered: &str) -> Vec<&str> {
    lowered
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|w| !w.is_empty())
        .collect()
}

/// Analyze text for emotional valence and intensity.
///
/// Returns `(valence, intensity)` where:
/// - `valence` is in `[-1.0, 1.0]` (negative to positive)
/// - `intensity` is in `[0.1, 1.0]`
pub fn analyze_sentiment(text: &str) -> (f32, f32) {
    let lowered = text.to_lowercase();
    let words = tokenize(&lowered);

    let pos = count_matches(&lowered, &words, POSITIVE);
    let neg = count_matches(&lowered, &words, NEGATIVE);
    let int = count_matches(&lowered, &words, INTENSE);

    let valence = (pos - neg) / (pos + neg + 1.0);
    let intensity = ((pos + neg + int) / 5.0).clamp(0.1, 1.0);

    (valence, intensity)
}

/// How the user is treating the bot, in `[-1.0, 1.0]`.
pub fn analyze_warmth(text: &str) -> f32 {
    let lowered = text.to_lowercase();
    let words = tokenize(&lowered);

    let warm = count_matches(&lowered, &words, WARM);
    let cold = count_matches(&lowered, &words, COLD);
    (warm - cold) / (warm + cold + 1.0)
}

/// Turns a message into a mood delta.
pub trait SentimentAnalyzer: Send + Sync {
    fn analyze(&self, text: &str) -> MoodDelta;
}

/// Default analyzer built on the keyword lists above.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordSentiment;

impl SentimentAnalyzer for KeywordSentiment {
    fn analyze(&self, text: &str) -> MoodDelta {
        let (valence, intensity) = analyze_sentiment(text);
        let warmth = analyze_warmth(text);
        MoodDelta::new(
            valence * 0.2 * (0.5 + intensity),
            (intensity - 0.3) * 0.3,
            warmth * 0.2,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neutral_text() {
        let (v, i) = analyze_sentiment("see you tomorrow at the station");
        assert!((v - 0.0).abs() < 0.01);
        assert!((i - 0.1).abs() < 0.01);
    }

    #[test]
    fn test_positive_text() {
        let (v, _) = analyze_sentiment("this is great, I love it");
        assert!(v > 0.0);
    }

    #[test]
    fn test_negative_text() {
        let (v, _) = analyze_sentiment("that was awful and I hate it");
        assert!(v < 0.0);
    }

    #[test]
    fn test_whole_word_matching() {
        // "goodbye" is not "good", "whatever" is not "hate"
        let (v, _) = analyze_sentiment("goodbye");
        assert!((v - 0.0).abs() < 0.01);
        let (v, _) = analyze_sentiment("whatever");
        assert!((v - 0.0).abs() < 0.01);
    }

    #[test]
    fn test_intense_text() {
        let (_, i1) = analyze_sentiment("good");
        let (_, i2) = analyze_sentiment("really really good!");
        assert!(i2 > i1);
    }

    #[test]
    fn test_emoji_sentiment() {
        let (v, _) = analyze_sentiment("😊👍");
        assert!(v > 0.0);
    }

    #[test]
    fn test_empty_text() {
        let (v, i) = analyze_sentiment("");
        assert!((v - 0.0).abs() < 0.01);
        assert!((i - 0.1).abs() < 0.01);
    }

    #[test]
    fn test_warmth() {
        assert!(analyze_warmth("thank you so much, friend") > 0.0);
        assert!(analyze_warmth("shut up, you're useless") < 0.0);
        assert_eq!(analyze_warmth("what time is it"), 0.0);
    }

    #[test]
    fn test_keyword_sentiment_delta_signs() {
        let analyzer = KeywordSentiment;
        let happy = analyzer.analyze("this is amazing, thanks!");
        assert!(happy.valence > 0.0);
        assert!(happy.warmth > 0.0);

        let calm = analyzer.analyze("ok");
        assert!(calm.arousal < 0.0);
        assert!(calm.valence.abs() < 1e-6);
    }
}
