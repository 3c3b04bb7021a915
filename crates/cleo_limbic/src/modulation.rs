//! Response modulation: the bridge between mood and generation.
//!
//! Instead of telling the model how to feel, mood adjusts sampling
//! parameters and reply length, so the tone emerges from the constraint.

use cleo_core::MoodVector;
use serde::{Deserialize, Serialize};

/// Generation parameters derived from a mood vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResponseParameters {
    pub temperature: f32,
    pub top_p: f32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
    /// How far reply length may swing from its length class (0.0 - 1.0).
    pub length_variance: f32,
    /// Factor applied to the length class budget.
    pub max_tokens_factor: f32,
    /// Tone hints for prompt assembly (0.0 - 1.0).
    pub friendliness: f32,
    pub formality: f32,
}

impl Default for ResponseParameters {
    fn default() -> Self {
        derive_parameters(&MoodVector::neutral())
    }
}

impl ResponseParameters {
    /// Scale a token budget by mood. Never returns less than 16 tokens.
    pub fn scale_max_tokens(&self, base: u32) -> u32 {
        ((base as f32 * self.max_tokens_factor).round() as u32).max(16)
    }

    /// Short tone instruction for the system prompt.
    pub fn tone_hint(&self) -> Option<&'static str> {
        if self.friendliness > 0.75 {
            Some("be extra warm and affectionate in this reply.")
        } else if self.formality > 0.65 {
            Some("keep a little more distance and stay polite in this reply.")
        } else {
            None
        }
    }
}

/// Range table mapping each mood axis onto parameters. Every range is
/// walked from its first to its second value as the axis goes from -1 to 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModulationCurves {
    /// Arousal → base temperature.
    pub temperature_range: (f32, f32),
    /// Valence → extra temperature on top of the arousal base.
    pub valence_temperature_boost: f32,
    /// Valence → nucleus sampling width.
    pub top_p_range: (f32, f32),
    /// Arousal → presence penalty.
    pub presence_range: (f32, f32),
    /// Valence → frequency penalty.
    pub frequency_range: (f32, f32),
    /// Arousal → length variance.
    pub length_variance_range: (f32, f32),
    /// Arousal → max token factor.
    pub max_tokens_range: (f32, f32),
    /// Warmth → friendliness.
    pub friendliness_range: (f32, f32),
    /// Warmth → formality.
    pub formality_range: (f32, f32),
}

impl Default for ModulationCurves {
    fn default() -> Self {
        Self {
            temperature_range: (0.5, 1.0),
            valence_temperature_boost: 0.1,
            top_p_range: (0.7, 1.0),
            presence_range: (0.0, 0.5),
            frequency_range: (0.4, 0.1),
            length_variance_range: (0.1, 0.5),
            max_tokens_range: (0.7, 1.3),
            friendliness_range: (0.2, 1.0),
            formality_range: (0.8, 0.1),
        }
    }
}

impl ModulationCurves {
    /// Pure mapping from mood to parameters.
    ///
    /// - arousal up: temperature, length variance and max tokens go up
    /// - warmth up: friendliness goes up, formality goes down
    /// - valence up: top_p goes up, temperature never goes down
    pub fn derive(&self, mood: &MoodVector) -> ResponseParameters {
        let valence = unit(mood.valence);
        let arousal = unit(mood.arousal);
        let warmth = unit(mood.warmth);

        let temperature = lerp(self.temperature_range, arousal)
            + self.valence_temperature_boost.max(0.0) * valence;

        ResponseParameters {
            temperature: temperature.clamp(0.1, 2.0),
            top_p: lerp(self.top_p_range, valence).clamp(0.1, 1.0),
            presence_penalty: lerp(self.presence_range, arousal).clamp(-2.0, 2.0),
            frequency_penalty: lerp(self.frequency_range, valence).clamp(-2.0, 2.0),
            length_variance: lerp(self.length_variance_range, arousal).clamp(0.0, 1.0),
            max_tokens_factor: lerp(self.max_tokens_range, arousal).clamp(0.1, 3.0),
            friendliness: lerp(self.friendliness_range, warmth).clamp(0.0, 1.0),
            formality: lerp(self.formality_range, warmth).clamp(0.0, 1.0),
        }
    }
}

/// [`ModulationCurves::derive`] with the default curves.
pub fn derive_parameters(mood: &MoodVector) -> ResponseParameters {
    ModulationCurves::default().derive(mood)
}

/// Map an axis from [-1, 1] onto [0, 1]. Non-finite input maps to the middle.
fn unit(x: f32) -> f32 {
    if x.is_finite() {
        ((x + 1.0) / 2.0).clamp(0.0, 1.0)
    } else {
        0.5
    }
}

/// Linear interpolation helper
fn lerp((a, b): (f32, f32), t: f32) -> f32 {
    a + (b - a) * t.clamp(0.0, 1.0)
}
