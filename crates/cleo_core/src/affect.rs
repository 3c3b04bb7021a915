//! Mood model: a three-axis vector (valence, arousal, warmth) with
//! exponential decay toward the neutral baseline.
//!
//! Every axis lives in [-1.0, 1.0]. Updates are incremental: decay first,
//! then apply a capped delta, then clamp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Guard against NaN and Infinity coming from storage or arithmetic.
#[inline]
fn sanitize_axis(v: f32) -> f32 {
    if v.is_finite() {
        v.clamp(-1.0, 1.0)
    } else {
        tracing::warn!("NaN/Inf detected in mood vector, resetting axis to 0");
        0.0
    }
}

/// Deserialize an axis value, replacing non-finite or out-of-range input.
pub(crate) fn deserialize_safe_axis<'de, D>(deserializer: D) -> Result<f32, D::Error>
where
    D: Deserializer<'de>,
{
    let v = f32::deserialize(deserializer)?;
    Ok(sanitize_axis(v))
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MoodVector {
    /// Positive/negative feeling.
    #[serde(deserialize_with = "deserialize_safe_axis")]
    pub valence: f32,

    /// Calm/activated.
    #[serde(deserialize_with = "deserialize_safe_axis")]
    pub arousal: f32,

    /// Distant/affectionate toward the user.
    #[serde(deserialize_with = "deserialize_safe_axis")]
    pub warmth: f32,
}

impl MoodVector {
    pub fn new(valence: f32, arousal: f32, warmth: f32) -> Self {
        Self {
            valence: sanitize_axis(valence),
            arousal: sanitize_axis(arousal),
            warmth: sanitize_axis(warmth),
        }
    }

    pub fn neutral() -> Self {
        Self::default()
    }

    /// Euclidean distance from the neutral origin, normalized to [0, 1].
    pub fn intensity(&self) -> f32 {
        let d = (self.valence.powi(2) + self.arousal.powi(2) + self.warmth.powi(2)).sqrt();
        (d / 3f32.sqrt()).clamp(0.0, 1.0)
    }

    /// Scale every axis by `factor` toward the baseline.
    pub fn scaled(&self, factor: f32) -> Self {
        Self::new(
            self.valence * factor,
            self.arousal * factor,
            self.warmth * factor,
        )
    }

    pub fn lerp(&self, other: &MoodVector, t: f32) -> MoodVector {
        let t = t.clamp(0.0, 1.0);
        MoodVector::new(
            self.valence + (other.valence - self.valence) * t,
            self.arousal + (other.arousal - self.arousal) * t,
            self.warmth + (other.warmth - self.warmth) * t,
        )
    }

    /// Closest discrete label, used in logs.
    pub fn label(&self) -> &'static str {
        if self.intensity() < 0.12 {
            return "neutral";
        }
        match (self.valence >= 0.0, self.arousal >= 0.0) {
            (true, true) => {
                if self.arousal > 0.5 {
                    "excited"
                } else {
                    "happy"
                }
            }
            (true, false) => "content",
            (false, true) => {
                if self.valence < -0.5 {
                    "irritated"
                } else {
                    "tense"
                }
            }
            (false, false) => "down",
        }
    }

    /// One line of natural language for the system prompt.
    pub fn describe(&self) -> String {
        if self.intensity() < 0.12 {
            return "You feel even and relaxed, nothing in particular is stirring you.".to_string();
        }

        let degree = match self.intensity() {
            i if i < 0.3 => "slightly",
            i if i < 0.55 => "fairly",
            i if i < 0.8 => "quite",
            _ => "very",
        };

        let feeling = match (self.valence >= 0.0, self.arousal >= 0.0) {
            (true, true) => {
                if self.arousal > 0.5 {
                    "excited and playful"
                } else {
                    "cheerful"
                }
            }
            (true, false) => "content and mellow",
            (false, true) => {
                if self.valence < -0.5 {
                    "irritated and restless"
                } else {
                    "a bit on edge"
                }
            }
            (false, false) => "low and quiet",
        };

        let stance = if self.warmth > 0.3 {
            "You feel close to this person."
        } else if self.warmth < -0.3 {
            "You feel a little distant from this person."
        } else {
            "You feel at ease with this person."
        };

        format!("You are feeling {} {}. {}", degree, feeling, stance)
    }
}

/// Incremental mood change produced by sentiment analysis of one message.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MoodDelta {
    pub valence: f32,
    pub arousal: f32,
    pub warmth: f32,
}

impl MoodDelta {
    pub fn new(valence: f32, arousal: f32, warmth: f32) -> Self {
        Self {
            valence,
            arousal,
            warmth,
        }
    }

    /// Limit each component to `[-max, max]`. Non-finite components become 0.
    pub fn capped(&self, max: f32) -> Self {
        let max = max.abs();
        let cap = |v: f32| if v.is_finite() { v.clamp(-max, max) } else { 0.0 };
        Self {
            valence: cap(self.valence),
            arousal: cap(self.arousal),
            warmth: cap(self.warmth),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.valence == 0.0 && self.arousal == 0.0 && self.warmth == 0.0
    }
}

/// Per-user mood, persisted across thought chains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionalState {
    pub user_id: String,
    pub mood: MoodVector,
    pub last_updated_at: DateTime<Utc>,
    pub interaction_count: u64,
}

impl EmotionalState {
    pub fn new(user_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            mood: MoodVector::neutral(),
            last_updated_at: now,
            interaction_count: 0,
        }
    }

    /// Mood as it would be at `now`, decayed by `0.5^(elapsed / half_life)`.
    ///
    /// A non-positive half-life disables decay. Clock skew (negative elapsed)
    /// counts as no time passing.
    pub fn decayed_mood(&self, now: DateTime<Utc>, half_life_secs: f64) -> MoodVector {
        if half_life_secs <= 0.0 {
            return self.mood;
        }
        let elapsed = (now - self.last_updated_at).num_milliseconds().max(0) as f64 / 1000.0;
        let factor = 0.5f64.powf(elapsed / half_life_secs) as f32;
        self.mood.scaled(factor)
    }

    /// Decay to `now`, then apply `delta` with each component capped to
    /// `max_delta`, then clamp.
    pub fn apply(&mut self, delta: MoodDelta, max_delta: f32, half_life_secs: f64, now: DateTime<Utc>) {
        let decayed = self.decayed_mood(now, half_life_secs);
        let delta = delta.capped(max_delta);
        self.mood = MoodVector::new(
            decayed.valence + delta.valence,
            decayed.arousal + delta.arousal,
            decayed.warmth + delta.warmth,
        );
        if now > self.last_updated_at {
            self.last_updated_at = now;
        }
        self.interaction_count = self.interaction_count.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_new_clamps_values() {
        let mood = MoodVector::new(5.0, -3.0, 0.5);
        assert_eq!(mood.valence, 1.0);
        assert_eq!(mood.arousal, -1.0);
        assert_eq!(mood.warmth, 0.5);

        let nan = MoodVector::new(f32::NAN, f32::INFINITY, 0.0);
        assert_eq!(nan, MoodVector::neutral());
    }

    #[test]
    fn test_decay_halves_after_half_life() {
        let mut state = EmotionalState::new("u1", t0());
        state.mood = MoodVector::new(0.8, -0.4, 0.6);

        let decayed = state.decayed_mood(t0() + Duration::seconds(1800), 1800.0);
        assert!((decayed.valence - 0.4).abs() < 1e-4);
        assert!((decayed.arousal + 0.2).abs() < 1e-4);
        assert!((decayed.warmth - 0.3).abs() < 1e-4);
    }

    #[test]
    fn test_decay_ignores_clock_skew() {
        let mut state = EmotionalState::new("u1", t0());
        state.mood = MoodVector::new(0.5, 0.5, 0.5);
        let decayed = state.decayed_mood(t0() - Duration::seconds(600), 1800.0);
        assert_eq!(decayed, state.mood);
    }

    #[test]
    fn test_zero_half_life_disables_decay() {
        let mut state = EmotionalState::new("u1", t0());
        state.mood = MoodVector::new(0.5, 0.5, 0.5);
        let decayed = state.decayed_mood(t0() + Duration::days(30), 0.0);
        assert_eq!(decayed, state.mood);
    }

    #[test]
    fn test_apply_caps_delta() {
        let mut state = EmotionalState::new("u1", t0());
        state.apply(MoodDelta::new(0.9, -0.9, 0.1), 0.3, 1800.0, t0());
        assert!((state.mood.valence - 0.3).abs() < 1e-6);
        assert!((state.mood.arousal + 0.3).abs() < 1e-6);
        assert!((state.mood.warmth - 0.1).abs() < 1e-6);
        assert_eq!(state.interaction_count, 1);
    }

    #[test]
    fn test_apply_clamps_at_bounds() {
        let mut state = EmotionalState::new("u1", t0());
        for i in 0..10 {
            state.apply(MoodDelta::new(0.3, 0.3, 0.3), 0.3, 0.0, t0() + Duration::seconds(i));
        }
        assert_eq!(state.mood, MoodVector::new(1.0, 1.0, 1.0));
        assert_eq!(state.interaction_count, 10);
    }

    #[test]
    fn test_describe_mentions_feeling() {
        let neutral = MoodVector::neutral();
        assert!(neutral.describe().contains("even"));

        let happy = MoodVector::new(0.7, 0.7, 0.6);
        let desc = happy.describe();
        assert!(desc.contains("excited"), "got: {}", desc);
        assert!(desc.contains("close"), "got: {}", desc);

        let down = MoodVector::new(-0.7, -0.6, -0.5);
        assert!(down.describe().contains("low"));
    }

    #[test]
    fn test_label_quadrants() {
        assert_eq!(MoodVector::new(0.6, 0.8, 0.0).label(), "excited");
        assert_eq!(MoodVector::new(0.6, 0.2, 0.0).label(), "happy");
        assert_eq!(MoodVector::new(0.6, -0.4, 0.0).label(), "content");
        assert_eq!(MoodVector::new(-0.7, 0.6, 0.0).label(), "irritated");
        assert_eq!(MoodVector::new(-0.3, 0.4, 0.0).label(), "tense");
        assert_eq!(MoodVector::new(-0.6, -0.6, 0.0).label(), "down");
        assert_eq!(MoodVector::neutral().label(), "neutral");
    }

    #[test]
    fn test_deserialize_sanitizes_out_of_range() {
        let json = r#"{"valence": 4.0, "arousal": -0.2, "warmth": -9.0}"#;
        let mood: MoodVector = serde_json::from_str(json).unwrap();
        assert_eq!(mood.valence, 1.0);
        assert!((mood.arousal + 0.2).abs() < 1e-6);
        assert_eq!(mood.warmth, -1.0);
    }
}
