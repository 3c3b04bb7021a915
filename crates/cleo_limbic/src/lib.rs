//! # Cleo Limbic System
//!
//! Fast, non-verbal state regulation for the conversation core:
//!
//! - **Tracker**: one mood vector per user, decayed toward neutral over time
//!   and nudged by the sentiment of each message
//! - **Modulation**: a pure mapping from mood to sampling parameters and
//!   reply length, so mood shapes replies structurally
//!
//! ## Dimensions
//!
//! - Valence: negative to positive feeling
//! - Arousal: calm to activated
//! - Warmth: distant to affectionate toward the user

mod modulation;
mod tracker;

pub use modulation::{derive_parameters, ModulationCurves, ResponseParameters};
pub use tracker::EmotionalStateTracker;
