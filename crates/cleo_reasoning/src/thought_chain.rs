//! Thought chain transitions.
//!
//! `ThoughtChain` is the policy; `ThoughtChainState` (in `cleo_core`) is the
//! data it drives. Every method takes the state explicitly, so the
//! orchestrator decides when state is loaded and saved.
//!
//! ```text
//! Idle ──message──▶ Active ──engage──▶ AwaitingResponse ──reply──▶ Active
//!                     │  ▲                     │
//!             topic drift│  resume / stale      └──failure──▶ Active (or Closed
//!                     ▼  │                                    after N in a row)
//!                  Interrupted
//! any ──inactivity / close──▶ Closed (terminal, a new chain replaces it)
//! ```

use chrono::{DateTime, Duration, Utc};
use cleo_core::config::ChainConfig;
use cleo_core::{ChainStatus, ConversationKey, PendingTopic, ThoughtChainState, TopicId};

/// Rejected transition: the chain was in `status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainConflict {
    pub status: ChainStatus,
}

pub struct ThoughtChain {
    config: ChainConfig,
}

impl Default for ThoughtChain {
    fn default() -> Self {
        Self::new(ChainConfig::default())
    }
}

fn secs(value: u64) -> Duration {
    Duration::seconds(value.min(86_400 * 365 * 10) as i64)
}

impl ThoughtChain {
    pub fn new(config: ChainConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    fn staleness(&self) -> Duration {
        secs(self.config.staleness_window_secs)
    }

    /// Whether the chain has been idle past the inactivity timeout.
    pub fn is_expired(&self, state: &ThoughtChainState, now: DateTime<Utc>) -> bool {
        now - state.last_activity_at > secs(self.config.inactivity_timeout_secs)
    }

    /// The chain to use for a message arriving at `now`. A missing, closed or
    /// expired chain is replaced by a fresh one.
    pub fn ensure_open(
        &self,
        existing: Option<ThoughtChainState>,
        key: &ConversationKey,
        now: DateTime<Utc>,
    ) -> ThoughtChainState {
        match existing {
            Some(state) if !state.is_closed() && !self.is_expired(&state, now) => state,
            Some(state) => {
                tracing::debug!(
                    "Chain {} for {} is {} (last active {}), starting a new one",
                    state.chain_id,
                    key,
                    if state.is_closed() { "closed" } else { "expired" },
                    state.last_activity_at
                );
                ThoughtChainState::new(key.clone(), now)
            }
            None => ThoughtChainState::new(key.clone(), now),
        }
    }

    /// Record an accepted message: activate the chain, drop stale pending
    /// topics and track topic drift.
    pub fn observe(&self, state: &mut ThoughtChainState, topic: Option<TopicId>, now: DateTime<Utc>) {
        if state.is_closed() || state.status == ChainStatus::AwaitingResponse {
            return;
        }
        let staleness = self.staleness();
        state.pending_topics.retain(|p| now - p.saved_at <= staleness);

        if let Some(topic) = topic {
            match state.current_topic.take() {
                None => state.current_topic = Some(topic),
                Some(current) if current == topic => state.current_topic = Some(current),
                Some(current) => {
                    if state.pending_topic().map(|p| &p.topic) == Some(&topic) {
                        // back to the interrupted topic
                        state.pending_topics.pop();
                    } else {
                        state.pending_topics.push(PendingTopic {
                            topic: current,
                            saved_at: now,
                        });
                        let max = self.config.max_interruption_depth as usize;
                        while state.pending_topics.len() > max {
                            let dropped = state.pending_topics.remove(0);
                            tracing::debug!("Interruption depth exceeded, dropping topic {}", dropped.topic);
                        }
                    }
                    state.current_topic = Some(topic);
                }
            }
        }

        state.interruption_depth = state.pending_topics.len() as u32;
        state.status = if state.pending_topics.is_empty() {
            ChainStatus::Active
        } else {
            ChainStatus::Interrupted
        };
        state.last_activity_at = now;
    }

    /// Mark one model call outstanding.
    pub fn begin_call(&self, state: &mut ThoughtChainState, now: DateTime<Utc>) -> Result<(), ChainConflict> {
        match state.status {
            ChainStatus::AwaitingResponse | ChainStatus::Closed => Err(ChainConflict {
                status: state.status,
            }),
            _ => {
                state.status = ChainStatus::AwaitingResponse;
                state.last_activity_at = now;
                Ok(())
            }
        }
    }

    /// The outstanding call delivered a reply. Resumes the most recent
    /// pending topic if it is still fresh and resets the interruption depth.
    pub fn complete_call(&self, state: &mut ThoughtChainState, now: DateTime<Utc>, follow_up_eligible: bool) {
        state.consecutive_failures = 0;
        if let Some(pending) = state.pending_topics.pop() {
            if now - pending.saved_at <= self.staleness() {
                tracing::debug!("Resuming topic {} on chain {}", pending.topic, state.chain_id);
                state.current_topic = Some(pending.topic);
            }
        }
        state.pending_topics.clear();
        state.interruption_depth = 0;
        state.status = ChainStatus::Active;
        state.last_activity_at = now;

        let cooled_down = state
            .follow_up
            .last_at
            .map_or(true, |at| now - at >= secs(self.config.follow_up_cooldown_secs));
        state.follow_up.available = follow_up_eligible && cooled_down && self.config.max_follow_ups > 0;
        state.follow_up.count = 0;
    }

    /// The outstanding call failed. Returns true when the failure closed
    /// the chain.
    pub fn fail_call(&self, state: &mut ThoughtChainState, now: DateTime<Utc>) -> bool {
        state.consecutive_failures += 1;
        state.follow_up.available = false;
        state.last_activity_at = now;
        if state.consecutive_failures >= self.config.max_consecutive_failures.max(1) {
            tracing::warn!(
                "Closing chain {} for {} after {} consecutive failures",
                state.chain_id,
                state.key,
                state.consecutive_failures
            );
            self.close(state, now);
            return true;
        }
        state.status = self.resting_status(state);
        false
    }

    /// Release the outstanding call without counting a failure.
    pub fn abort_call(&self, state: &mut ThoughtChainState, now: DateTime<Utc>) {
        if state.status == ChainStatus::AwaitingResponse {
            state.status = self.resting_status(state);
        }
        state.last_activity_at = now;
    }

    pub fn close(&self, state: &mut ThoughtChainState, now: DateTime<Utc>) {
        state.status = ChainStatus::Closed;
        state.pending_topics.clear();
        state.interruption_depth = 0;
        state.follow_up.available = false;
        state.last_activity_at = now;
    }

    /// Whether an unprompted follow-up may be issued now.
    pub fn can_follow_up(&self, state: &ThoughtChainState, now: DateTime<Utc>) -> bool {
        state.status == ChainStatus::Active
            && state.follow_up.available
            && state.follow_up.count < self.config.max_follow_ups
            && !self.is_expired(state, now)
    }

    /// A follow-up was delivered.
    pub fn complete_follow_up(&self, state: &mut ThoughtChainState, now: DateTime<Utc>) {
        state.consecutive_failures = 0;
        state.status = ChainStatus::Active;
        state.follow_up.count += 1;
        state.follow_up.last_at = Some(now);
        state.follow_up.available = state.follow_up.count < self.config.max_follow_ups;
        state.last_activity_at = now;
    }

    fn resting_status(&self, state: &ThoughtChainState) -> ChainStatus {
        if state.pending_topics.is_empty() {
            ChainStatus::Active
        } else {
            ChainStatus::Interrupted
        }
    }

    /// Messages that invite a further thought after the reply.
    pub fn is_follow_up_trigger(text: &str) -> bool {
        let lowered = text.to_lowercase();
        if lowered.contains('?') || lowered.contains("...") || lowered.contains("what if") {
            return true;
        }
        lowered
            .split(|c: char| !c.is_alphanumeric())
            .any(|w| matches!(w, "why" | "how" | "imagine" | "think"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn key() -> ConversationKey {
        ConversationKey::new("c1")
    }

    fn topic(id: &str) -> Option<TopicId> {
        Some(TopicId::new(id))
    }

    #[test]
    fn test_first_message_activates() {
        let chain = ThoughtChain::default();
        let mut state = chain.ensure_open(None, &key(), ts(0));
        assert_eq!(state.status, ChainStatus::Idle);
        chain.observe(&mut state, None, ts(1));
        assert_eq!(state.status, ChainStatus::Active);
        assert_eq!(state.last_activity_at, ts(1));
    }

    #[test]
    fn test_call_cycle_and_conflict() {
        let chain = ThoughtChain::default();
        let mut state = chain.ensure_open(None, &key(), ts(0));
        chain.observe(&mut state, None, ts(0));

        chain.begin_call(&mut state, ts(1)).unwrap();
        assert_eq!(state.status, ChainStatus::AwaitingResponse);
        let conflict = chain.begin_call(&mut state, ts(2)).unwrap_err();
        assert_eq!(conflict.status, ChainStatus::AwaitingResponse);

        chain.complete_call(&mut state, ts(3), false);
        assert_eq!(state.status, ChainStatus::Active);
    }

    #[test]
    fn test_topic_drift_interrupts_and_resumes() {
        let chain = ThoughtChain::default();
        let mut state = chain.ensure_open(None, &key(), ts(0));
        chain.observe(&mut state, topic("music"), ts(0));
        assert_eq!(state.status, ChainStatus::Active);

        chain.observe(&mut state, topic("science"), ts(10));
        assert_eq!(state.status, ChainStatus::Interrupted);
        assert_eq!(state.interruption_depth, 1);
        assert_eq!(state.pending_topic().unwrap().topic, TopicId::new("music"));

        chain.begin_call(&mut state, ts(11)).unwrap();
        chain.complete_call(&mut state, ts(12), false);
        assert_eq!(state.status, ChainStatus::Active);
        assert_eq!(state.interruption_depth, 0);
        assert_eq!(state.current_topic, topic("music"));
    }

    #[test]
    fn test_interruption_depth_is_bounded() {
        let chain = ThoughtChain::default();
        let mut state = chain.ensure_open(None, &key(), ts(0));
        for (i, t) in ["a", "b", "c", "d", "e"].iter().enumerate() {
            chain.observe(&mut state, topic(t), ts(i as i64));
        }
        assert_eq!(state.interruption_depth, 3);
        let pending: Vec<&str> = state.pending_topics.iter().map(|p| p.topic.as_str()).collect();
        assert_eq!(pending, vec!["b", "c", "d"]);
    }

    #[test]
    fn test_returning_to_pending_topic_pops_it() {
        let chain = ThoughtChain::default();
        let mut state = chain.ensure_open(None, &key(), ts(0));
        chain.observe(&mut state, topic("music"), ts(0));
        chain.observe(&mut state, topic("art"), ts(1));
        chain.observe(&mut state, topic("music"), ts(2));
        assert_eq!(state.status, ChainStatus::Active);
        assert!(state.pending_topics.is_empty());
        assert_eq!(state.current_topic, topic("music"));
    }

    #[test]
    fn test_stale_pending_topics_are_discarded() {
        let chain = ThoughtChain::default();
        let mut state = chain.ensure_open(None, &key(), ts(0));
        chain.observe(&mut state, topic("music"), ts(0));
        chain.observe(&mut state, topic("art"), ts(1));
        assert_eq!(state.status, ChainStatus::Interrupted);

        // next message arrives after the staleness window
        chain.observe(&mut state, None, ts(1 + 601));
        assert_eq!(state.status, ChainStatus::Active);
        assert_eq!(state.interruption_depth, 0);
        assert_eq!(state.current_topic, topic("art"));
    }

    #[test]
    fn test_stale_topic_not_resumed_on_completion() {
        let chain = ThoughtChain::default();
        let mut state = chain.ensure_open(None, &key(), ts(0));
        chain.observe(&mut state, topic("music"), ts(0));
        chain.observe(&mut state, topic("art"), ts(1));
        chain.begin_call(&mut state, ts(2)).unwrap();
        chain.complete_call(&mut state, ts(1_000), false);
        assert_eq!(state.current_topic, topic("art"));
        assert!(state.pending_topics.is_empty());
    }

    #[test]
    fn test_consecutive_failures_close_chain() {
        let chain = ThoughtChain::default();
        let mut state = chain.ensure_open(None, &key(), ts(0));
        chain.observe(&mut state, None, ts(0));
        for i in 0..2 {
            chain.begin_call(&mut state, ts(i)).unwrap();
            assert!(!chain.fail_call(&mut state, ts(i)));
            assert_eq!(state.status, ChainStatus::Active);
        }
        chain.begin_call(&mut state, ts(3)).unwrap();
        assert!(chain.fail_call(&mut state, ts(3)));
        assert_eq!(state.status, ChainStatus::Closed);
        assert!(chain.begin_call(&mut state, ts(4)).is_err());

        let fresh = chain.ensure_open(Some(state.clone()), &key(), ts(5));
        assert_ne!(fresh.chain_id, state.chain_id);
        assert_eq!(fresh.status, ChainStatus::Idle);
    }

    #[test]
    fn test_success_resets_failures() {
        let chain = ThoughtChain::default();
        let mut state = chain.ensure_open(None, &key(), ts(0));
        chain.observe(&mut state, None, ts(0));
        chain.begin_call(&mut state, ts(1)).unwrap();
        chain.fail_call(&mut state, ts(1));
        chain.begin_call(&mut state, ts(2)).unwrap();
        chain.complete_call(&mut state, ts(2), false);
        assert_eq!(state.consecutive_failures, 0);
    }

    #[test]
    fn test_inactive_chain_is_replaced() {
        let chain = ThoughtChain::default();
        let mut state = chain.ensure_open(None, &key(), ts(0));
        chain.observe(&mut state, None, ts(0));
        let id = state.chain_id;

        let same = chain.ensure_open(Some(state.clone()), &key(), ts(3_600));
        assert_eq!(same.chain_id, id);
        let renewed = chain.ensure_open(Some(state), &key(), ts(3_601));
        assert_ne!(renewed.chain_id, id);
    }

    #[test]
    fn test_follow_up_cooldown_and_cap() {
        let chain = ThoughtChain::default();
        let mut state = chain.ensure_open(None, &key(), ts(0));
        chain.observe(&mut state, None, ts(0));
        chain.begin_call(&mut state, ts(0)).unwrap();
        chain.complete_call(&mut state, ts(1), true);
        assert!(chain.can_follow_up(&state, ts(2)));

        chain.begin_call(&mut state, ts(2)).unwrap();
        chain.complete_follow_up(&mut state, ts(3));
        assert!(!chain.can_follow_up(&state, ts(4)));

        // within cooldown: no follow-up even for a trigger message
        chain.begin_call(&mut state, ts(10)).unwrap();
        chain.complete_call(&mut state, ts(11), true);
        assert!(!chain.can_follow_up(&state, ts(12)));

        // after cooldown
        chain.begin_call(&mut state, ts(400)).unwrap();
        chain.complete_call(&mut state, ts(401), true);
        assert!(chain.can_follow_up(&state, ts(402)));
    }

    #[test]
    fn test_abort_does_not_count_failure() {
        let chain = ThoughtChain::default();
        let mut state = chain.ensure_open(None, &key(), ts(0));
        chain.observe(&mut state, None, ts(0));
        chain.begin_call(&mut state, ts(1)).unwrap();
        chain.abort_call(&mut state, ts(2));
        assert_eq!(state.status, ChainStatus::Active);
        assert_eq!(state.consecutive_failures, 0);
    }

    #[test]
    fn test_follow_up_triggers() {
        assert!(ThoughtChain::is_follow_up_trigger("why do cats purr"));
        assert!(ThoughtChain::is_follow_up_trigger("what if we left"));
        assert!(ThoughtChain::is_follow_up_trigger("hmm..."));
        assert!(ThoughtChain::is_follow_up_trigger("you ok?"));
        assert!(!ThoughtChain::is_follow_up_trigger("nice one"));
        assert!(!ThoughtChain::is_follow_up_trigger("showing off"));
    }
}
