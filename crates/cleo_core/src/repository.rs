//! Storage seam. The core never touches a database directly; hosts provide a
//! [`ConversationRepository`] and the orchestrator reads and writes through it.

use crate::affect::EmotionalState;
use crate::conversation::{ConversationContext, ConversationKey};
use crate::profile::UserProfile;
use crate::state::ThoughtChainState;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Each save replaces the stored value for its key atomically; saving the
/// same value twice leaves storage unchanged.
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn load_context(&self, key: &ConversationKey) -> anyhow::Result<Option<ConversationContext>>;
    async fn save_context(&self, context: &ConversationContext) -> anyhow::Result<()>;

    async fn load_chain_state(&self, key: &ConversationKey) -> anyhow::Result<Option<ThoughtChainState>>;
    async fn save_chain_state(&self, state: &ThoughtChainState) -> anyhow::Result<()>;

    async fn load_emotional_state(&self, user_id: &str) -> anyhow::Result<Option<EmotionalState>>;
    async fn save_emotional_state(&self, state: &EmotionalState) -> anyhow::Result<()>;

    async fn load_user_profile(&self, user_id: &str) -> anyhow::Result<Option<UserProfile>>;
    async fn save_user_profile(&self, profile: &UserProfile) -> anyhow::Result<()>;
}

/// Process-local repository, used by tests and single-process hosts.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    contexts: RwLock<HashMap<ConversationKey, ConversationContext>>,
    chains: RwLock<HashMap<ConversationKey, ThoughtChainState>>,
    moods: RwLock<HashMap<String, EmotionalState>>,
    profiles: RwLock<HashMap<String, UserProfile>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn conversation_count(&self) -> usize {
        self.contexts.read().await.len()
    }
}

#[async_trait]
impl ConversationRepository for InMemoryRepository {
    async fn load_context(&self, key: &ConversationKey) -> anyhow::Result<Option<ConversationContext>> {
        Ok(self.contexts.read().await.get(key).cloned())
    }

    async fn save_context(&self, context: &ConversationContext) -> anyhow::Result<()> {
        self.contexts
            .write()
            .await
            .insert(context.key.clone(), context.clone());
        Ok(())
    }

    async fn load_chain_state(&self, key: &ConversationKey) -> anyhow::Result<Option<ThoughtChainState>> {
        Ok(self.chains.read().await.get(key).cloned())
    }

    async fn save_chain_state(&self, state: &ThoughtChainState) -> anyhow::Result<()> {
        self.chains
            .write()
            .await
            .insert(state.key.clone(), state.clone());
        Ok(())
    }

    async fn load_emotional_state(&self, user_id: &str) -> anyhow::Result<Option<EmotionalState>> {
        Ok(self.moods.read().await.get(user_id).cloned())
    }

    async fn save_emotional_state(&self, state: &EmotionalState) -> anyhow::Result<()> {
        self.moods
            .write()
            .await
            .insert(state.user_id.clone(), state.clone());
        Ok(())
    }

    async fn load_user_profile(&self, user_id: &str) -> anyhow::Result<Option<UserProfile>> {
        Ok(self.profiles.read().await.get(user_id).cloned())
    }

    async fn save_user_profile(&self, profile: &UserProfile) -> anyhow::Result<()> {
        self.profiles
            .write()
            .await
            .insert(profile.user_id.clone(), profile.clone());
        Ok(())
    }
}
