//! Per-user emotional state tracking.
//!
//! The tracker keeps one mood per user. Updates for the same user are
//! serialized through a per-user mutex; different users never contend.
//! Storage is not touched here: the orchestrator seeds states it loads and
//! saves the states returned by `update`.

use crate::modulation::{ModulationCurves, ResponseParameters};
use chrono::{DateTime, Utc};
use cleo_core::config::EmotionConfig;
use cleo_core::{EmotionalState, MoodDelta, MoodVector};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

pub struct EmotionalStateTracker {
    users: RwLock<HashMap<String, Arc<Mutex<EmotionalState>>>>,
    max_delta: f32,
    half_life_secs: f64,
    curves: ModulationCurves,
}

impl Default for EmotionalStateTracker {
    fn default() -> Self {
        Self::new(&EmotionConfig::default())
    }
}

impl EmotionalStateTracker {
    pub fn new(config: &EmotionConfig) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            max_delta: config.max_delta_per_update,
            half_life_secs: config.half_life_secs,
            curves: ModulationCurves::default(),
        }
    }

    pub fn with_curves(mut self, curves: ModulationCurves) -> Self {
        self.curves = curves;
        self
    }

    /// Per-user slot, created neutral at `now` on first use.
    async fn slot(&self, user_id: &str, now: DateTime<Utc>) -> Arc<Mutex<EmotionalState>> {
        if let Some(slot) = self.users.read().await.get(user_id) {
            return Arc::clone(slot);
        }
        let mut users = self.users.write().await;
        Arc::clone(
            users
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(EmotionalState::new(user_id, now)))),
        )
    }

    pub async fn is_tracked(&self, user_id: &str) -> bool {
        self.users.read().await.contains_key(user_id)
    }

    /// Install a state loaded from storage. An already tracked user keeps
    /// the in-memory state, which is never older than what was saved.
    pub async fn seed(&self, state: EmotionalState) -> bool {
        let mut users = self.users.write().await;
        if users.contains_key(&state.user_id) {
            return false;
        }
        users.insert(state.user_id.clone(), Arc::new(Mutex::new(state)));
        true
    }

    pub async fn update(&self, user_id: &str, delta: MoodDelta) -> EmotionalState {
        self.update_at(user_id, delta, Utc::now()).await
    }

    /// Decay the user's mood to `now`, apply the capped delta, and return
    /// the new state.
    pub async fn update_at(&self, user_id: &str, delta: MoodDelta, now: DateTime<Utc>) -> EmotionalState {
        let slot = self.slot(user_id, now).await;
        let mut state = slot.lock().await;
        let before = state.mood;
        state.apply(delta, self.max_delta, self.half_life_secs, now);
        tracing::debug!(
            "Mood for {}: {} -> {} (v={:.2} a={:.2} w={:.2})",
            user_id,
            before.label(),
            state.mood.label(),
            state.mood.valence,
            state.mood.arousal,
            state.mood.warmth
        );
        state.clone()
    }

    /// What [`update_at`](Self::update_at) would return, without applying it.
    pub async fn preview(&self, user_id: &str, delta: MoodDelta, now: DateTime<Utc>) -> EmotionalState {
        let slot = self.users.read().await.get(user_id).cloned();
        let mut state = match slot {
            Some(slot) => slot.lock().await.clone(),
            None => EmotionalState::new(user_id, now),
        };
        state.apply(delta, self.max_delta, self.half_life_secs, now);
        state
    }

    /// The user's state as of `now`, decayed but not written back.
    pub async fn snapshot(&self, user_id: &str, now: DateTime<Utc>) -> Option<EmotionalState> {
        let slot = self.users.read().await.get(user_id).cloned()?;
        let state = slot.lock().await;
        let mut view = state.clone();
        view.mood = state.decayed_mood(now, self.half_life_secs);
        Some(view)
    }

    pub async fn forget(&self, user_id: &str) -> Option<EmotionalState> {
        let slot = self.users.write().await.remove(user_id)?;
        let state = slot.lock().await;
        Some(state.clone())
    }

    pub fn derive_parameters(&self, state: &EmotionalState) -> ResponseParameters {
        self.curves.derive(&state.mood)
    }

    pub fn derive_for_mood(&self, mood: &MoodVector) -> ResponseParameters {
        self.curves.derive(mood)
    }
}
