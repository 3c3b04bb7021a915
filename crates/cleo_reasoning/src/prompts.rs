//! Prompt assembly: persona, mood, what the bot remembers about the user,
//! relevant history, and the reflection instruction, bounded to the
//! configured budget.

use crate::api_types::{ChatMessage, ChatRole};
use chrono::{DateTime, Duration, Utc};
use cleo_core::config::ContextConfig;
use cleo_core::{ConversationContext, MoodVector, Persona, Turn, UserProfile};
use cleo_limbic::ResponseParameters;
use rand::seq::SliceRandom;

// ============================================================================
// Prompt context
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct PromptTurn {
    pub role: ChatRole,
    pub content: String,
    /// Pinned turns survive truncation.
    pub pinned: bool,
}

/// Ordered prompt turns handed to the completion client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptContext {
    turns: Vec<PromptTurn>,
}

impl PromptContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// System turns are always pinned.
    pub fn push_system(&mut self, content: impl Into<String>) {
        self.turns.push(PromptTurn {
            role: ChatRole::System,
            content: content.into(),
            pinned: true,
        });
    }

    pub fn push(&mut self, role: ChatRole, content: impl Into<String>) {
        self.turns.push(PromptTurn {
            role,
            content: content.into(),
            pinned: role == ChatRole::System,
        });
    }

    pub fn turns(&self) -> &[PromptTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn total_chars(&self) -> usize {
        self.turns.iter().map(|t| t.content.chars().count()).sum()
    }

    /// Drop the oldest unpinned turns until at most `max_turns` non-system
    /// turns remain and the total fits `budget_chars`. System turns and the
    /// last `pinned_recent` turns are never dropped, so the result can still
    /// exceed the budget when only pinned turns are left. Returns how many
    /// turns were dropped.
    pub fn truncate(&mut self, max_turns: usize, budget_chars: usize, pinned_recent: usize) -> usize {
        let len = self.turns.len();
        for (i, turn) in self.turns.iter_mut().enumerate() {
            if i + pinned_recent >= len || turn.role == ChatRole::System {
                turn.pinned = true;
            }
        }

        let mut dropped = 0;
        loop {
            let history = self
                .turns
                .iter()
                .filter(|t| t.role != ChatRole::System)
                .count();
            if history <= max_turns && self.total_chars() <= budget_chars {
                break;
            }
            match self.turns.iter().position(|t| !t.pinned) {
                Some(idx) => {
                    self.turns.remove(idx);
                    dropped += 1;
                }
                None => break,
            }
        }
        if dropped > 0 {
            tracing::debug!("Prompt truncated: dropped {} turns, {} chars left", dropped, self.total_chars());
        }
        dropped
    }

    pub fn to_messages(&self) -> Vec<ChatMessage> {
        self.turns
            .iter()
            .map(|t| ChatMessage {
                role: t.role,
                content: t.content.clone(),
            })
            .collect()
    }
}

// ============================================================================
// Response length
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LengthClass {
    Brief,
    Short,
    Medium,
    Detailed,
    Comprehensive,
    Extensive,
}

const GREETINGS: &[&str] = &[
    "hi", "hey", "hello", "yo", "sup", "thanks", "thank", "thx", "ty", "ok", "okay", "cool",
    "nice", "lol", "lmao", "gm", "gn", "bye", "night", "morning", "yes", "no", "yeah", "nope",
];

impl LengthClass {
    /// Token budget for the class.
    pub fn tokens(self) -> u32 {
        match self {
            LengthClass::Brief => 25,
            LengthClass::Short => 50,
            LengthClass::Medium => 120,
            LengthClass::Detailed => 250,
            LengthClass::Comprehensive => 400,
            LengthClass::Extensive => 600,
        }
    }

    /// Heuristic guess at how long a reply `text` deserves.
    pub fn classify(text: &str) -> Self {
        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric() && c != '\'')
            .filter(|w| !w.is_empty())
            .collect();
        let has = |phrase: &str| lowered.contains(phrase);

        if has("in depth") || has("in-depth") || has("deep dive") || has("analyze") || has("analysis") || has("essay") {
            return LengthClass::Extensive;
        }
        if has("step by step") || has("tutorial") || has("guide") || has("in detail") || has("walk me through") {
            return LengthClass::Comprehensive;
        }
        if words.len() <= 3 && words.iter().all(|w| GREETINGS.contains(w)) {
            return LengthClass::Brief;
        }
        if has("explain") || has("how does") || has("how do") || has("why ") || has("code") || has("implement") {
            return LengthClass::Detailed;
        }
        if words.len() > 60 {
            return LengthClass::Detailed;
        }
        if text.contains('?') {
            return LengthClass::Medium;
        }
        if words.len() <= 6 {
            return LengthClass::Short;
        }
        LengthClass::Medium
    }

    /// Class budget scaled by mood: the token factor scales it, and length
    /// variance adds headroom on top. Never above `ceiling`.
    pub fn budget(self, params: &ResponseParameters, ceiling: u32) -> u32 {
        let base = self.tokens();
        let headroom = (base as f32 * params.length_variance).round() as u32;
        params
            .scale_max_tokens(base)
            .saturating_add(headroom)
            .min(ceiling.max(1))
    }
}

// ============================================================================
// Reflection templates
// ============================================================================

const METAPROMPT_TEMPLATES: &[&str] = &[
    "reflect on your last message: \"{last}\"\n\n\
     add new insight or a fresh angle instead of repeating earlier points. \
     keep it coherent with what you said and let it flow naturally.",
    "consider your previous reply: \"{last}\"\n\n\
     build on it from your own perspective, make connections where they fit, \
     and don't restate what you already said.",
];

const REPROMPT_TEMPLATES: &[&str] = &[
    "your previous thought was: \"{last}\"\n\n\
     take a moment to go deeper. what else is worth saying? \
     continue the conversation in a way that invites the user back in.",
    "building on what you just shared: \"{last}\"\n\n\
     explore an interesting implication or question that comes out of it, \
     briefly, without repeating yourself.",
];

fn fill(templates: &[&str], last_reply: &str) -> String {
    let template = templates
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or("{last}");
    template.replace("{last}", last_reply.trim())
}

/// Reflection instruction anchored on the bot's last reply.
pub fn metaprompt(last_reply: &str) -> String {
    format!(
        "{}\n\nremember to offer fresh thoughts without repeating yourself.",
        fill(METAPROMPT_TEMPLATES, last_reply)
    )
}

/// Instruction for an unprompted follow-up thought.
pub fn reprompt(last_reply: &str) -> String {
    fill(REPROMPT_TEMPLATES, last_reply)
}

// ============================================================================
// Builder
// ============================================================================

const NOTE_INSTRUCTION: &str = "if you learn something worth remembering about this user, \
wrap it in <user_note></user_note> tags. notes are never shown in the chat.";

/// Assembles bounded prompts for one persona.
pub struct PromptBuilder<'a> {
    persona: &'a Persona,
    config: &'a ContextConfig,
    profile: Option<&'a UserProfile>,
}

impl<'a> PromptBuilder<'a> {
    pub fn new(persona: &'a Persona, config: &'a ContextConfig) -> Self {
        Self {
            persona,
            config,
            profile: None,
        }
    }

    /// Include notes and interests for the user being answered.
    pub fn with_profile(mut self, profile: Option<&'a UserProfile>) -> Self {
        self.profile = profile;
        self
    }

    fn system_prompt(&self, mood: &MoodVector, params: &ResponseParameters) -> String {
        let mut prompt = self.persona.format_system_prompt(&mood.describe());
        if let Some(hint) = params.tone_hint() {
            prompt.push('\n');
            prompt.push_str(hint);
        }
        if let Some(profile) = self.profile {
            let notes = profile.recent_notes(self.config.prompt_notes);
            if !notes.is_empty() {
                prompt.push_str("\n\nprevious notes about this user:");
                for note in notes {
                    prompt.push_str("\n- ");
                    prompt.push_str(&note.content);
                }
            }
            if !profile.interests.is_empty() {
                let interests: Vec<&str> = profile.interests.iter().map(String::as_str).collect();
                prompt.push_str("\n\nuser's interests: ");
                prompt.push_str(&interests.join(", "));
            }
        }
        prompt.push_str("\n\n");
        prompt.push_str(NOTE_INSTRUCTION);
        prompt
    }

    fn push_history(&self, prompt: &mut PromptContext, context: &ConversationContext, now: DateTime<Utc>) {
        // capped at ten years so chrono never overflows
        let window = Duration::hours(self.config.relevance_window_hours.min(24 * 365 * 10) as i64);
        for turn in context.relevant_turns(now, window, self.config.max_prompt_turns) {
            let role = if turn.is_assistant() {
                ChatRole::Assistant
            } else {
                ChatRole::User
            };
            prompt.push(role, render_turn(turn));
        }
    }

    /// Prompt for a reply to `inbound`. `context` holds the history before
    /// the inbound turn.
    pub fn build_reply(
        &self,
        context: &ConversationContext,
        inbound: &Turn,
        mood: &MoodVector,
        params: &ResponseParameters,
        now: DateTime<Utc>,
    ) -> PromptContext {
        let mut prompt = PromptContext::new();
        prompt.push_system(self.system_prompt(mood, params));
        self.push_history(&mut prompt, context, now);

        let text = self.persona.strip_name_prefix(&inbound.text);
        let text = if text.is_empty() { inbound.text.trim() } else { text };
        prompt.push(ChatRole::User, format!("{}: {}", inbound.speaker, text));

        if let Some(last) = context.last_assistant_turn() {
            prompt.push_system(metaprompt(&last.text));
        }

        prompt.truncate(
            self.config.max_prompt_turns,
            self.config.prompt_budget_chars,
            self.config.pinned_recent_turns,
        );
        prompt
    }

    /// Prompt for a follow-up thought on the bot's last reply. `None` when
    /// the bot has not spoken in this conversation.
    pub fn build_follow_up(
        &self,
        context: &ConversationContext,
        mood: &MoodVector,
        params: &ResponseParameters,
        now: DateTime<Utc>,
    ) -> Option<PromptContext> {
        let last = context.last_assistant_turn()?;
        let mut prompt = PromptContext::new();
        prompt.push_system(self.system_prompt(mood, params));
        self.push_history(&mut prompt, context, now);
        prompt.push_system(reprompt(&last.text));
        prompt.truncate(
            self.config.max_prompt_turns,
            self.config.prompt_budget_chars,
            self.config.pinned_recent_turns,
        );
        Some(prompt)
    }
}

fn render_turn(turn: &Turn) -> String {
    if turn.is_assistant() {
        turn.text.clone()
    } else {
        format!("{}: {}", turn.speaker, turn.text)
    }
}
