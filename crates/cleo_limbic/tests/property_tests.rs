//! Property-based tests for cleo_limbic modulation and tracking.
//!
//! Verifies that derived response parameters always stay within documented
//! bounds and move monotonically with each mood axis.

use chrono::{DateTime, Duration, Utc};
use cleo_core::{MoodDelta, MoodVector};
use cleo_limbic::{derive_parameters, EmotionalStateTracker};
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

fn arb_axis() -> impl Strategy<Value = f32> {
    -1.0f32..=1.0
}

fn arb_mood() -> impl Strategy<Value = MoodVector> {
    (arb_axis(), arb_axis(), arb_axis()).prop_map(|(v, a, w)| MoodVector::new(v, a, w))
}

/// Two ordered values on one axis: `lo <= hi`.
fn arb_ordered_pair() -> impl Strategy<Value = (f32, f32)> {
    (arb_axis(), arb_axis()).prop_map(|(a, b)| if a <= b { (a, b) } else { (b, a) })
}

// ============================================================================
// Bounds
// ============================================================================

proptest! {
    #[test]
    fn parameters_always_in_api_ranges(mood in arb_mood()) {
        let p = derive_parameters(&mood);
        prop_assert!(p.temperature.is_finite() && p.temperature >= 0.1 && p.temperature <= 2.0);
        prop_assert!(p.top_p.is_finite() && p.top_p >= 0.1 && p.top_p <= 1.0);
        prop_assert!(p.presence_penalty >= -2.0 && p.presence_penalty <= 2.0);
        prop_assert!(p.frequency_penalty >= -2.0 && p.frequency_penalty <= 2.0);
        prop_assert!(p.length_variance >= 0.0 && p.length_variance <= 1.0);
        prop_assert!(p.friendliness >= 0.0 && p.friendliness <= 1.0);
        prop_assert!(p.formality >= 0.0 && p.formality <= 1.0);
        prop_assert!(p.max_tokens_factor > 0.0);
    }

    /// Same input, same output.
    #[test]
    fn derive_is_deterministic(mood in arb_mood()) {
        prop_assert_eq!(derive_parameters(&mood), derive_parameters(&mood));
    }
}

// ============================================================================
// Monotonicity per axis
// ============================================================================

proptest! {
    #[test]
    fn arousal_raises_temperature_and_variance(
        (lo, hi) in arb_ordered_pair(),
        v in arb_axis(),
        w in arb_axis(),
    ) {
        let a = derive_parameters(&MoodVector::new(v, lo, w));
        let b = derive_parameters(&MoodVector::new(v, hi, w));
        prop_assert!(b.temperature >= a.temperature);
        prop_assert!(b.length_variance >= a.length_variance);
        prop_assert!(b.max_tokens_factor >= a.max_tokens_factor);
    }

    #[test]
    fn warmth_raises_friendliness_lowers_formality(
        (lo, hi) in arb_ordered_pair(),
        v in arb_axis(),
        a in arb_axis(),
    ) {
        let cold = derive_parameters(&MoodVector::new(v, a, lo));
        let warm = derive_parameters(&MoodVector::new(v, a, hi));
        prop_assert!(warm.friendliness >= cold.friendliness);
        prop_assert!(warm.formality <= cold.formality);
    }

    #[test]
    fn valence_raises_top_p_never_lowers_temperature(
        (lo, hi) in arb_ordered_pair(),
        a in arb_axis(),
        w in arb_axis(),
    ) {
        let sad = derive_parameters(&MoodVector::new(lo, a, w));
        let glad = derive_parameters(&MoodVector::new(hi, a, w));
        prop_assert!(glad.top_p >= sad.top_p);
        prop_assert!(glad.temperature >= sad.temperature);
    }
}

// ============================================================================
// Tracker
// ============================================================================

proptest! {
    /// Any sequence of tracker updates leaves the mood in bounds.
    #[test]
    fn tracker_mood_bounded(
        deltas in prop::collection::vec((-3.0f32..=3.0, -3.0f32..=3.0, -3.0f32..=3.0, 0i64..7200), 1..40),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let tracker = EmotionalStateTracker::default();
        let mut now = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        rt.block_on(async {
            for (v, a, w, gap) in deltas {
                now += Duration::seconds(gap);
                let state = tracker.update_at("u1", MoodDelta::new(v, a, w), now).await;
                for axis in [state.mood.valence, state.mood.arousal, state.mood.warmth] {
                    assert!(axis.is_finite() && (-1.0..=1.0).contains(&axis));
                }
            }
        });
    }
}
