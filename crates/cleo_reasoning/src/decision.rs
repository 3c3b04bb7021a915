use chrono::Duration;
use cleo_core::config::ChainConfig;
use cleo_core::{ConversationContext, InboundMessageEvent, Persona};

// ============================================================================
// Engagement levels
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngageReason {
    Mention,
    DirectMessage,
    NameAddress,
    ReplyToBot,
    QuestionFollowUp,
    OpenChannel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engagement {
    /// Reply to this message.
    Engage(EngageReason),
    /// Record it in context, stay quiet.
    Observe,
    /// Not worth recording.
    Ignore,
}

impl Engagement {
    pub fn is_engaged(&self) -> bool {
        matches!(self, Engagement::Engage(_))
    }
}

/// What a rule may look at.
pub struct MessageView<'a> {
    pub event: &'a InboundMessageEvent,
    /// History before this message.
    pub context: &'a ConversationContext,
    pub persona: &'a Persona,
}

// ============================================================================
// DecisionRule trait
// ============================================================================

pub trait DecisionRule: Send + Sync {
    /// Evaluate input and return an engagement, or None to pass to next rule.
    fn evaluate(&self, view: &MessageView<'_>) -> Option<Engagement>;

    /// Name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// DecisionRouter
// ============================================================================

pub struct DecisionRouter {
    rules: Vec<Box<dyn DecisionRule>>,
}

impl Default for DecisionRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionRouter {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Create a router with the built-in rules for `config`.
    pub fn with_defaults(config: &ChainConfig) -> Self {
        let mut router = Self::new();
        router.add_rule(Box::new(BotAuthorRule));
        router.add_rule(Box::new(DirectAddressRule));
        router.add_rule(Box::new(ReplyToBotRule));
        router.add_rule(Box::new(UnansweredQuestionRule {
            recency: Duration::seconds(config.question_recency_secs.min(86_400 * 365) as i64),
        }));
        if !config.require_address {
            router.add_rule(Box::new(OpenChannelRule));
        }
        router
    }

    pub fn add_rule(&mut self, rule: Box<dyn DecisionRule>) {
        self.rules.push(rule);
    }

    /// Route input through rules in order. First match wins.
    /// Falls back to Observe if no rule matches.
    pub fn route(&self, view: &MessageView<'_>) -> Engagement {
        for rule in &self.rules {
            if let Some(level) = rule.evaluate(view) {
                tracing::debug!("DecisionRouter: rule '{}' matched → {:?}", rule.name(), level);
                return level;
            }
        }
        Engagement::Observe
    }
}

// ============================================================================
// Built-in rules
// ============================================================================

/// Never answer bots, this one included, so two bots cannot loop.
pub struct BotAuthorRule;

impl DecisionRule for BotAuthorRule {
    fn evaluate(&self, view: &MessageView<'_>) -> Option<Engagement> {
        view.event.from_bot.then_some(Engagement::Ignore)
    }

    fn name(&self) -> &str { "bot_author" }
}

/// Platform mention, direct-message channel, or the bot's name up front.
pub struct DirectAddressRule;

impl DecisionRule for DirectAddressRule {
    fn evaluate(&self, view: &MessageView<'_>) -> Option<Engagement> {
        let reason = if view.event.is_direct {
            EngageReason::DirectMessage
        } else if view.event.mentions_bot {
            EngageReason::Mention
        } else if view.persona.is_addressed_by_name(&view.event.text) {
            EngageReason::NameAddress
        } else {
            return None;
        };
        Some(Engagement::Engage(reason))
    }

    fn name(&self) -> &str { "direct_address" }
}

/// A platform reply to one of the bot's own turns.
pub struct ReplyToBotRule;

impl DecisionRule for ReplyToBotRule {
    fn evaluate(&self, view: &MessageView<'_>) -> Option<Engagement> {
        let target = view.event.reply_to_id.as_deref()?;
        let turn = view.context.find(target)?;
        turn.is_assistant()
            .then_some(Engagement::Engage(EngageReason::ReplyToBot))
    }

    fn name(&self) -> &str { "reply_to_bot" }
}

/// The bot spoke last, asked a question, and this message arrived soon after.
pub struct UnansweredQuestionRule {
    pub recency: Duration,
}

impl DecisionRule for UnansweredQuestionRule {
    fn evaluate(&self, view: &MessageView<'_>) -> Option<Engagement> {
        let last = view.context.last_turn()?;
        if !last.is_assistant() || !last.text.contains('?') {
            return None;
        }
        let elapsed = view.event.timestamp - last.timestamp;
        (elapsed >= Duration::zero() && elapsed <= self.recency)
            .then_some(Engagement::Engage(EngageReason::QuestionFollowUp))
    }

    fn name(&self) -> &str { "unanswered_question" }
}

/// Every message engages when addressing is not required.
pub struct OpenChannelRule;

impl DecisionRule for OpenChannelRule {
    fn evaluate(&self, _view: &MessageView<'_>) -> Option<Engagement> {
        Some(Engagement::Engage(EngageReason::OpenChannel))
    }

    fn name(&self) -> &str { "open_channel" }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use cleo_core::{ConversationKey, Turn};
    use uuid::Uuid;

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn event(text: &str, secs: i64) -> InboundMessageEvent {
        InboundMessageEvent::new(ConversationKey::new("c1"), "u1", text).at(ts(secs))
    }

    fn route(router: &DecisionRouter, event: &InboundMessageEvent, ctx: &ConversationContext) -> Engagement {
        let persona = Persona::default();
        router.route(&MessageView {
            event,
            context: ctx,
            persona: &persona,
        })
    }

    #[test]
    fn test_unaddressed_message_is_observed() {
        let router = DecisionRouter::with_defaults(&ChainConfig::default());
        let ctx = ConversationContext::new(ConversationKey::new("c1"));
        assert_eq!(route(&router, &event("hey", 0), &ctx), Engagement::Observe);
    }

    #[test]
    fn test_bot_authors_are_ignored_even_when_addressed() {
        let open = ChainConfig {
            require_address: false,
            ..ChainConfig::default()
        };
        for router in [
            DecisionRouter::with_defaults(&ChainConfig::default()),
            DecisionRouter::with_defaults(&open),
        ] {
            let ctx = ConversationContext::new(ConversationKey::new("c1"));
            let event = event("cleo, are you a bot too?", 0).mentioning_bot().from_bot();
            assert_eq!(route(&router, &event, &ctx), Engagement::Ignore);
        }
    }

    #[test]
    fn test_direct_address_forms() {
        let router = DecisionRouter::with_defaults(&ChainConfig::default());
        let ctx = ConversationContext::new(ConversationKey::new("c1"));
        assert_eq!(
            route(&router, &event("hey", 0).mentioning_bot(), &ctx),
            Engagement::Engage(EngageReason::Mention)
        );
        assert_eq!(
            route(&router, &event("hey", 0).direct(), &ctx),
            Engagement::Engage(EngageReason::DirectMessage)
        );
        assert_eq!(
            route(&router, &event("cleo, what's up", 0), &ctx),
            Engagement::Engage(EngageReason::NameAddress)
        );
        assert_eq!(route(&router, &event("cleopatra was a queen", 0), &ctx), Engagement::Observe);
    }

    #[test]
    fn test_reply_to_bot_turn() {
        let router = DecisionRouter::with_defaults(&ChainConfig::default());
        let mut ctx = ConversationContext::new(ConversationKey::new("c1"));
        let user_id = Uuid::new_v4();
        ctx.append(Turn::user(user_id, "u2", "lunch?", ts(0)), 50).unwrap();
        let bot_id = ctx.append(Turn::assistant("cleo", "pizza.", ts(1)), 50).unwrap().id;

        let reply = event("agreed", 10_000).replying_to(bot_id.to_string());
        assert_eq!(route(&router, &reply, &ctx), Engagement::Engage(EngageReason::ReplyToBot));

        let reply = event("agreed", 10_000).replying_to(user_id.to_string());
        assert_eq!(route(&router, &reply, &ctx), Engagement::Observe);
    }

    #[test]
    fn test_question_follow_up_within_recency() {
        let router = DecisionRouter::with_defaults(&ChainConfig::default());
        let mut ctx = ConversationContext::new(ConversationKey::new("c1"));
        ctx.append(Turn::assistant("cleo", "what's your favorite movie?", ts(0)), 50).unwrap();

        assert_eq!(
            route(&router, &event("probably alien", 60), &ctx),
            Engagement::Engage(EngageReason::QuestionFollowUp)
        );
        assert_eq!(route(&router, &event("probably alien", 3_600), &ctx), Engagement::Observe);
    }

    #[test]
    fn test_open_channel_engages_everything() {
        let config = ChainConfig {
            require_address: false,
            ..ChainConfig::default()
        };
        let router = DecisionRouter::with_defaults(&config);
        let ctx = ConversationContext::new(ConversationKey::new("c1"));
        assert_eq!(
            route(&router, &event("hey", 0), &ctx),
            Engagement::Engage(EngageReason::OpenChannel)
        );
    }

    #[test]
    fn test_router_with_custom_rule() {
        struct AlwaysIgnore;
        impl DecisionRule for AlwaysIgnore {
            fn evaluate(&self, _view: &MessageView<'_>) -> Option<Engagement> {
                Some(Engagement::Ignore)
            }
            fn name(&self) -> &str { "always_ignore" }
        }

        let mut router = DecisionRouter::new();
        router.add_rule(Box::new(AlwaysIgnore));
        let ctx = ConversationContext::new(ConversationKey::new("c1"));
        assert_eq!(route(&router, &event("cleo!", 0).mentioning_bot(), &ctx), Engagement::Ignore);
    }
}
