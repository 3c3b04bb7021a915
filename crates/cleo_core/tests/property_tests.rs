//! Property-based tests for cleo_core.
//!
//! Uses proptest to verify invariants that must hold for ALL possible inputs,
//! not just hand-picked examples.

use chrono::{DateTime, Duration, Utc};
use cleo_core::{
    ConversationContext, ConversationKey, EmotionalState, MoodDelta, MoodVector, OutboundReply,
    Turn,
};
use proptest::prelude::*;
use uuid::Uuid;

// ============================================================================
// Strategies
// ============================================================================

/// Arbitrary delta, deliberately allowed far outside the per-update cap.
fn arb_delta() -> impl Strategy<Value = MoodDelta> {
    (-5.0f32..=5.0, -5.0f32..=5.0, -5.0f32..=5.0).prop_map(|(v, a, w)| MoodDelta::new(v, a, w))
}

fn arb_mood() -> impl Strategy<Value = MoodVector> {
    (-1.0f32..=1.0, -1.0f32..=1.0, -1.0f32..=1.0).prop_map(|(v, a, w)| MoodVector::new(v, a, w))
}

fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

fn in_bounds(m: &MoodVector) -> bool {
    [m.valence, m.arousal, m.warmth]
        .iter()
        .all(|v| v.is_finite() && (-1.0..=1.0).contains(v))
}

// ============================================================================
// Mood properties
// ============================================================================

proptest! {
    /// **Core invariant**: every axis stays within [-1, 1] after any
    /// sequence of updates at any spacing.
    #[test]
    fn mood_stays_bounded_after_any_update_sequence(
        updates in prop::collection::vec((arb_delta(), 0i64..100_000), 1..50),
        half_life in 0.0f64..10_000.0,
        max_delta in 0.0f32..=1.0,
    ) {
        let mut state = EmotionalState::new("u1", t0());
        let mut now = t0();
        for (delta, gap) in updates {
            now += Duration::seconds(gap);
            state.apply(delta, max_delta, half_life, now);
            prop_assert!(in_bounds(&state.mood), "mood out of bounds: {:?}", state.mood);
        }
    }

    /// **Delta cap**: one update moves each axis by at most `max_delta`
    /// beyond the decayed value.
    #[test]
    fn single_update_moves_at_most_max_delta(
        mood in arb_mood(),
        delta in arb_delta(),
        max_delta in 0.0f32..=1.0,
    ) {
        let mut state = EmotionalState::new("u1", t0());
        state.mood = mood;
        state.apply(delta, max_delta, 0.0, t0());
        prop_assert!((state.mood.valence - mood.valence).abs() <= max_delta + 1e-5);
        prop_assert!((state.mood.arousal - mood.arousal).abs() <= max_delta + 1e-5);
        prop_assert!((state.mood.warmth - mood.warmth).abs() <= max_delta + 1e-5);
    }

    /// **Decay never overshoots**: decayed magnitude is never larger than
    /// the stored one and keeps its sign.
    #[test]
    fn decay_shrinks_toward_neutral(
        mood in arb_mood(),
        elapsed in 0i64..1_000_000,
        half_life in 1.0f64..100_000.0,
    ) {
        let mut state = EmotionalState::new("u1", t0());
        state.mood = mood;
        let decayed = state.decayed_mood(t0() + Duration::seconds(elapsed), half_life);
        for (before, after) in [
            (mood.valence, decayed.valence),
            (mood.arousal, decayed.arousal),
            (mood.warmth, decayed.warmth),
        ] {
            prop_assert!(after.abs() <= before.abs() + 1e-6);
            prop_assert!(after == 0.0 || after.signum() == before.signum());
        }
    }
}

// ============================================================================
// Context properties
// ============================================================================

proptest! {
    /// Appending turns with arbitrary (even backwards) clocks keeps the
    /// history strictly ordered and within the cap.
    #[test]
    fn context_ordered_and_bounded(
        offsets in prop::collection::vec(-10_000i64..10_000, 1..120),
        cap in 1usize..60,
    ) {
        let mut ctx = ConversationContext::new(ConversationKey::new("c"));
        for off in offsets {
            let turn = Turn::user(Uuid::new_v4(), "u1", "x", t0() + Duration::seconds(off));
            ctx.append(turn, cap).unwrap();
        }
        prop_assert!(ctx.len() <= cap);
        let stamps: Vec<_> = ctx.turns().map(|t| t.timestamp).collect();
        for pair in stamps.windows(2) {
            prop_assert!(pair[0] < pair[1]);
        }
    }

    /// Chunking never produces an over-long or empty chunk and never loses
    /// non-whitespace characters.
    #[test]
    fn chunks_respect_limit(text in "[a-z .!?\n]{0,400}", max in 5usize..80) {
        let reply = OutboundReply::fallback(&text);
        let chunks = reply.chunks(max);
        for chunk in &chunks {
            prop_assert!(!chunk.is_empty());
            prop_assert!(chunk.chars().count() <= max);
        }
        let squash = |s: &str| s.chars().filter(|c| !c.is_whitespace()).collect::<String>();
        prop_assert_eq!(squash(&chunks.concat()), squash(&text));
    }
}
