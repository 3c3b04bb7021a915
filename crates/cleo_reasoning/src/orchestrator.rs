//! Conversation orchestration: one inbound message in, at most one reply out.
//!
//! For each message the orchestrator takes the conversation's lock, loads
//! context and chain state, decides whether to engage, and either records
//! the message or runs a completion and records both sides. An accepted
//! inbound turn is always persisted, whatever happens to the model call.
//!
//! User profiles (interests and notes) are updated best effort after the
//! conversation is saved, under a per-user lock since one user can talk in
//! several conversations at once.

use crate::api_types::SamplingParams;
use crate::client::RateLimitedClient;
use crate::decision::{DecisionRouter, Engagement, MessageView};
use crate::error::{ApiError, OrchestratorError};
use crate::locks::{ConversationLocks, KeyedLocks};
use crate::prompts::{LengthClass, PromptBuilder};
use crate::providers::create_provider;
use crate::rate_limit::RateBudget;
use crate::sanitize::{extract_user_notes, sanitize_reply};
use crate::thought_chain::ThoughtChain;
use chrono::{DateTime, Utc};
use cleo_core::{
    ChainStatus, CleoConfig, ConversationContext, ConversationKey, ConversationRepository,
    EmotionalState, InboundMessageEvent, KeywordSentiment, KeywordTopics, OutboundReply, Persona,
    SentimentAnalyzer, ThoughtChainState, TopicClassifier, Turn, UserProfile,
};
use cleo_limbic::{EmotionalStateTracker, ResponseParameters};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Result of handling one inbound message.
#[derive(Debug, Clone)]
pub struct HandleOutcome {
    /// Reply to deliver. `None` when the bot stays quiet.
    pub reply: Option<OutboundReply>,
    pub chain_id: Uuid,
    pub status: ChainStatus,
    pub engagement: Engagement,
    /// Set when the reply is a fallback for a failed completion.
    pub error: Option<ApiError>,
    /// The message was already recorded; nothing was done.
    pub duplicate: bool,
}

impl HandleOutcome {
    fn quiet(chain: &ThoughtChainState, engagement: Engagement) -> Self {
        Self {
            reply: None,
            chain_id: chain.chain_id,
            status: chain.status,
            engagement,
            error: None,
            duplicate: false,
        }
    }
}

pub struct ConversationOrchestrator {
    config: CleoConfig,
    repo: Arc<dyn ConversationRepository>,
    client: RateLimitedClient,
    tracker: Arc<EmotionalStateTracker>,
    chain: ThoughtChain,
    router: DecisionRouter,
    sentiment: Arc<dyn SentimentAnalyzer>,
    topics: Arc<dyn TopicClassifier>,
    locks: ConversationLocks,
    profile_locks: KeyedLocks<String>,
}

impl ConversationOrchestrator {
    pub fn new(config: CleoConfig, client: RateLimitedClient, repo: Arc<dyn ConversationRepository>) -> Self {
        Self {
            tracker: Arc::new(EmotionalStateTracker::new(&config.emotion)),
            chain: ThoughtChain::new(config.chain.clone()),
            router: DecisionRouter::with_defaults(&config.chain),
            sentiment: Arc::new(KeywordSentiment),
            topics: Arc::new(KeywordTopics::default()),
            locks: ConversationLocks::new(),
            profile_locks: KeyedLocks::new(),
            config,
            repo,
            client,
        }
    }

    /// Wire the configured provider, rate budget and client.
    pub fn from_config(config: CleoConfig, repo: Arc<dyn ConversationRepository>) -> anyhow::Result<Self> {
        config.validate()?;
        let llm = create_provider(&config.llm)?;
        let budget = Arc::new(RateBudget::from_config(&config.rate_limit));
        let client = RateLimitedClient::from_config(llm, budget, &config);
        Ok(Self::new(config, client, repo))
    }

    /// Share a tracker with other components.
    pub fn with_tracker(mut self, tracker: Arc<EmotionalStateTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn with_sentiment(mut self, sentiment: Arc<dyn SentimentAnalyzer>) -> Self {
        self.sentiment = sentiment;
        self
    }

    pub fn with_topics(mut self, topics: Arc<dyn TopicClassifier>) -> Self {
        self.topics = topics;
        self
    }

    pub fn with_router(mut self, router: DecisionRouter) -> Self {
        self.router = router;
        self
    }

    pub fn persona(&self) -> &Persona {
        &self.config.persona
    }

    pub fn tracker(&self) -> &Arc<EmotionalStateTracker> {
        &self.tracker
    }

    pub fn client(&self) -> &RateLimitedClient {
        &self.client
    }

    pub async fn handle_message(&self, event: InboundMessageEvent) -> Result<HandleOutcome, OrchestratorError> {
        self.handle_message_cancellable(event, CancellationToken::new())
            .await
    }

    /// Handle one message. Cancelling `token` abandons the work: any
    /// completion in flight is discarded and nothing is persisted.
    #[tracing::instrument(skip_all, fields(conversation = %event.conversation_key, user = %event.user_id))]
    pub async fn handle_message_cancellable(
        &self,
        event: InboundMessageEvent,
        token: CancellationToken,
    ) -> Result<HandleOutcome, OrchestratorError> {
        event.validate()?;
        let key = event.conversation_key.clone();
        let now = event.timestamp;

        let guard = tokio::select! {
            biased;
            () = token.cancelled() => return Err(OrchestratorError::Cancelled),
            guard = self.locks.lock(&key) => guard,
        };

        let mut context = self
            .repo
            .load_context(&key)
            .await
            .map_err(OrchestratorError::storage)?
            .unwrap_or_else(|| ConversationContext::new(key.clone()));
        let stored_chain = self
            .repo
            .load_chain_state(&key)
            .await
            .map_err(OrchestratorError::storage)?;
        let mut chain = self.chain.ensure_open(stored_chain, &key, now);

        let turn_id = event.turn_id();
        if context.contains(turn_id) {
            tracing::info!("Ignoring redelivered message {}", turn_id);
            let mut outcome = HandleOutcome::quiet(&chain, Engagement::Ignore);
            outcome.duplicate = true;
            return Ok(outcome);
        }

        let mut engagement = self.router.route(&MessageView {
            event: &event,
            context: &context,
            persona: &self.config.persona,
        });
        if engagement == Engagement::Ignore {
            return Ok(HandleOutcome::quiet(&chain, engagement));
        }
        if engagement.is_engaged() && self.config.chain.collapse_queued_messages && guard.has_newer_waiters() {
            tracing::debug!("Newer message queued for {}, recording this one only", key);
            engagement = Engagement::Observe;
        }

        let topic = self.topics.classify(&event.text);
        self.chain.observe(&mut chain, topic, now);
        let inbound = Turn::user(turn_id, &event.user_id, &event.text, now);

        if !engagement.is_engaged() {
            self.record(&mut context, inbound);
            self.persist(&context, &chain, None)
                .await
                .map_err(OrchestratorError::storage)?;
            self.update_profile(&event.user_id, Some(&event.text), &[], now)
                .await;
            return Ok(HandleOutcome::quiet(&chain, engagement));
        }

        if let Err(conflict) = self.chain.begin_call(&mut chain, now) {
            tracing::error!(
                "Chain {} for {} was {} when a new call was requested, closing it",
                chain.chain_id,
                key,
                conflict.status
            );
            self.chain.close(&mut chain, now);
            self.record(&mut context, inbound);
            if let Err(e) = self.persist(&context, &chain, None).await {
                tracing::error!("Failed to persist closed chain for {}: {:#}", key, e);
            }
            return Err(OrchestratorError::StateConflict {
                key,
                status: conflict.status,
            });
        }
        tracing::debug!("Engaging in {} ({:?})", key, engagement);

        let mood_loaded = self.ensure_mood_loaded(&event.user_id).await;
        let delta = self.sentiment.analyze(&event.text);
        let mood_preview = self.tracker.preview(&event.user_id, delta, now).await;
        let params = self.tracker.derive_parameters(&mood_preview);

        let profile = self.load_profile(&event.user_id).await;
        let prompt = PromptBuilder::new(&self.config.persona, &self.config.context)
            .with_profile(profile.as_ref())
            .build_reply(&context, &inbound, &mood_preview.mood, &params, now);
        let length = LengthClass::classify(&event.text);
        let sampling = self.sampling(&params, length.budget(&params, self.config.llm.max_tokens));

        let result = tokio::select! {
            biased;
            () = token.cancelled() => {
                tracing::info!("Handling cancelled for {}, discarding completion", key);
                return Err(OrchestratorError::Cancelled);
            }
            result = self.client.complete(&prompt, &sampling) => result,
        };

        let result = result.and_then(|completion| {
            let (raw, notes) = extract_user_notes(&completion.text);
            let text = sanitize_reply(&raw, &self.config.llm.stop);
            if text.is_empty() {
                Err(ApiError::ApiUnavailable {
                    attempts: completion.attempts,
                    last_error: "completion was empty after sanitizing".to_string(),
                })
            } else {
                Ok((text, notes, completion.usage))
            }
        });

        // a mood that failed to load is left alone, so the stored one is
        // neither replaced by a neutral start nor shadowed in the tracker
        let mood = if mood_loaded {
            Some(self.tracker.update_at(&event.user_id, delta, now).await)
        } else {
            None
        };

        match result {
            Ok((text, notes, usage)) => {
                let follow_up = ThoughtChain::is_follow_up_trigger(&event.text);
                self.record(&mut context, inbound);
                let mut assistant = Turn::assistant(&self.config.persona.name, &text, now);
                if let Some(usage) = usage {
                    assistant = assistant.with_usage(usage);
                }
                let assistant_id = assistant.id;
                self.record(&mut context, assistant);
                self.chain.complete_call(&mut chain, now, follow_up);

                let reply = OutboundReply::generated(text, assistant_id);
                if let Err(source) = self.persist(&context, &chain, mood.as_ref()).await {
                    return Err(OrchestratorError::StorageFailure {
                        source,
                        reply: Some(reply),
                    });
                }
                self.update_profile(&event.user_id, Some(&event.text), &notes, now)
                    .await;
                tracing::info!(
                    "Replied in {} ({} chars, mood {})",
                    key,
                    reply.text.chars().count(),
                    mood.as_ref().unwrap_or(&mood_preview).mood.label()
                );
                Ok(HandleOutcome {
                    reply: Some(reply),
                    chain_id: chain.chain_id,
                    status: chain.status,
                    engagement,
                    error: None,
                    duplicate: false,
                })
            }
            Err(error) => {
                if error.counts_as_chain_failure() {
                    self.chain.fail_call(&mut chain, now);
                } else {
                    self.chain.abort_call(&mut chain, now);
                }
                self.record(&mut context, inbound);

                let reply = error.fallback_reply(&self.config.persona);
                if let Err(source) = self.persist(&context, &chain, mood.as_ref()).await {
                    return Err(OrchestratorError::StorageFailure {
                        source,
                        reply: Some(reply),
                    });
                }
                self.update_profile(&event.user_id, Some(&event.text), &[], now)
                    .await;
                tracing::warn!("Completion failed in {}: {}", key, error);
                Ok(HandleOutcome {
                    reply: Some(reply),
                    chain_id: chain.chain_id,
                    status: chain.status,
                    engagement,
                    error: Some(error),
                    duplicate: false,
                })
            }
        }
    }

    /// Explicitly close the conversation's chain. The next message starts
    /// a new one.
    pub async fn close_conversation(&self, key: &ConversationKey) -> Result<(), OrchestratorError> {
        let _guard = self.locks.lock(key).await;
        let Some(mut chain) = self
            .repo
            .load_chain_state(key)
            .await
            .map_err(OrchestratorError::storage)?
        else {
            return Ok(());
        };
        if chain.is_closed() {
            return Ok(());
        }
        self.chain.close(&mut chain, Utc::now());
        tracing::info!("Closed chain {} for {}", chain.chain_id, key);
        self.save_with_retry(|| self.repo.save_chain_state(&chain))
            .await
            .map_err(OrchestratorError::storage)
    }

    /// Follow-up timed by the wall clock. Message handling is timed by event
    /// timestamps instead; hosts that replay events should use
    /// [`continue_thought_at`](Self::continue_thought_at) with their own clock.
    pub async fn continue_thought(&self, key: &ConversationKey) -> Result<Option<OutboundReply>, OrchestratorError> {
        self.continue_thought_at(key, Utc::now()).await
    }

    /// Issue one unprompted follow-up on the bot's last reply, if the chain
    /// allows it. A failed follow-up is silent: `Ok(None)`. A `now` behind
    /// the chain's last activity is moved up to it, so chain and mood time
    /// never run backwards.
    pub async fn continue_thought_at(
        &self,
        key: &ConversationKey,
        now: DateTime<Utc>,
    ) -> Result<Option<OutboundReply>, OrchestratorError> {
        let _guard = self.locks.lock(key).await;
        let Some(mut chain) = self
            .repo
            .load_chain_state(key)
            .await
            .map_err(OrchestratorError::storage)?
        else {
            return Ok(None);
        };
        let now = now.max(chain.last_activity_at);
        if !self.chain.can_follow_up(&chain, now) {
            return Ok(None);
        }
        let Some(mut context) = self
            .repo
            .load_context(key)
            .await
            .map_err(OrchestratorError::storage)?
        else {
            return Ok(None);
        };

        let speaker = context
            .turns()
            .rev()
            .find(|t| !t.is_assistant())
            .map(|t| t.speaker.clone());
        if let Some(speaker) = &speaker {
            self.ensure_mood_loaded(speaker).await;
        }
        let mood = match &speaker {
            Some(speaker) => self.tracker.snapshot(speaker, now).await,
            None => None,
        }
        .map(|s| s.mood)
        .unwrap_or_default();
        let params = self.tracker.derive_for_mood(&mood);

        let builder = PromptBuilder::new(&self.config.persona, &self.config.context);
        let Some(prompt) = builder.build_follow_up(&context, &mood, &params, now) else {
            return Ok(None);
        };
        if self.chain.begin_call(&mut chain, now).is_err() {
            return Ok(None);
        }

        let max_tokens = params.scale_max_tokens(150).min(self.config.llm.max_tokens.max(1));
        let (text, notes) = match self.client.complete(&prompt, &self.sampling(&params, max_tokens)).await {
            Ok(completion) => {
                let (raw, notes) = extract_user_notes(&completion.text);
                (sanitize_reply(&raw, &self.config.llm.stop), notes)
            }
            Err(e) => {
                tracing::warn!("Follow-up thought failed in {}: {}", key, e);
                (String::new(), Vec::new())
            }
        };

        if text.is_empty() {
            self.chain.abort_call(&mut chain, now);
            chain.follow_up.available = false;
            self.save_with_retry(|| self.repo.save_chain_state(&chain))
                .await
                .map_err(OrchestratorError::storage)?;
            return Ok(None);
        }

        let assistant = Turn::assistant(&self.config.persona.name, &text, now);
        let assistant_id = assistant.id;
        self.record(&mut context, assistant);
        self.chain.complete_follow_up(&mut chain, now);

        let reply = OutboundReply::generated(text, assistant_id);
        if let Err(source) = self.persist(&context, &chain, None).await {
            return Err(OrchestratorError::StorageFailure {
                source,
                reply: Some(reply),
            });
        }
        if let Some(speaker) = &speaker {
            self.update_profile(speaker, None, &notes, now).await;
        }
        tracing::info!("Follow-up thought in {}", key);
        Ok(Some(reply))
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn sampling(&self, params: &ResponseParameters, max_tokens: u32) -> SamplingParams {
        SamplingParams {
            max_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
            presence_penalty: params.presence_penalty,
            frequency_penalty: params.frequency_penalty,
            repetition_penalty: self.config.llm.repetition_penalty,
            stop: self.config.llm.stop.clone(),
        }
    }

    fn record(&self, context: &mut ConversationContext, turn: Turn) {
        if let Err(e) = context.append(turn, self.config.context.max_turns) {
            tracing::debug!("Not recording turn in {}: {}", context.key, e);
        }
    }

    /// Seed the tracker from storage the first time a user is seen. Returns
    /// false when the stored mood could not be read; the user is then not
    /// tracked and the load is tried again on their next message.
    async fn ensure_mood_loaded(&self, user_id: &str) -> bool {
        if self.tracker.is_tracked(user_id).await {
            return true;
        }
        match self.repo.load_emotional_state(user_id).await {
            Ok(Some(state)) => {
                self.tracker.seed(state).await;
                true
            }
            Ok(None) => true,
            Err(e) => {
                tracing::warn!("Failed to load mood for {}, using neutral for this reply: {:#}", user_id, e);
                false
            }
        }
    }

    /// Profile for prompt assembly. Missing or unreadable profiles give none.
    async fn load_profile(&self, user_id: &str) -> Option<UserProfile> {
        match self.repo.load_user_profile(user_id).await {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!("Failed to load profile for {}: {:#}", user_id, e);
                None
            }
        }
    }

    /// Merge interests from `text` and new notes into the user's profile.
    /// Failures are logged; the conversation itself is already saved.
    async fn update_profile(&self, user_id: &str, text: Option<&str>, notes: &[String], now: DateTime<Utc>) {
        let _guard = self.profile_locks.lock(&user_id.to_string()).await;
        let mut profile = match self.repo.load_user_profile(user_id).await {
            Ok(profile) => profile.unwrap_or_else(|| UserProfile::new(user_id, now)),
            Err(e) => {
                tracing::warn!("Failed to load profile for {}, not updating it: {:#}", user_id, e);
                return;
            }
        };
        let mut changed = text.is_some_and(|text| profile.observe_interests(text, now));
        for note in notes {
            changed |= profile.add_note(note, now);
        }
        if !changed {
            return;
        }
        tracing::debug!(
            "Profile for {}: {} interests, {} notes",
            user_id,
            profile.interests.len(),
            profile.notes.len()
        );
        if let Err(e) = self.save_with_retry(|| self.repo.save_user_profile(&profile)).await {
            tracing::error!("Failed to save profile for {}: {:#}", user_id, e);
        }
    }

    /// Save context, chain and mood. The whole set is retried once; saves
    /// are idempotent so repeating the ones that succeeded is harmless.
    async fn persist(
        &self,
        context: &ConversationContext,
        chain: &ThoughtChainState,
        mood: Option<&EmotionalState>,
    ) -> anyhow::Result<()> {
        self.save_with_retry(|| async {
            self.repo.save_context(context).await?;
            self.repo.save_chain_state(chain).await?;
            if let Some(mood) = mood {
                self.repo.save_emotional_state(mood).await?;
            }
            Ok::<(), anyhow::Error>(())
        })
        .await
    }

    async fn save_with_retry<F, Fut>(&self, save: F) -> anyhow::Result<()>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = anyhow::Result<()>>,
    {
        match save().await {
            Ok(()) => Ok(()),
            Err(first) => {
                tracing::warn!("Save failed, retrying once: {:#}", first);
                save().await.map_err(|e| {
                    tracing::error!("Save failed again: {:#}", e);
                    e
                })
            }
        }
    }
}
