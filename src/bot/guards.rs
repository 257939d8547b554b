// src/bot/guards.rs - Ordered checks that run before any handler body

use log::{debug, error};

use crate::bot::state::StateSnapshot;
use crate::types::{CommandContext, GuardOutcome, Visibility};

pub const NOT_A_MOD_REPLY: &str = "You must be a mod to use that command!";

/// A single predicate over the event context and a state snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    /// The bot is switched on
    BotEnabled,
    /// The actor is the broadcaster or a moderator
    UserIsMod,
    /// The actor has not asked to be left alone
    UserNotIgnored,
    /// The text does not look like a command
    NotCommand,
}

impl Guard {
    pub fn check(&self, ctx: &CommandContext, snapshot: &StateSnapshot, command_marker: char) -> GuardOutcome {
        match self {
            Guard::BotEnabled => {
                if snapshot.enabled {
                    GuardOutcome::Pass
                } else {
                    GuardOutcome::silent("bot is disabled")
                }
            }
            Guard::UserIsMod => {
                if ctx.user.is_privileged() {
                    GuardOutcome::Pass
                } else {
                    GuardOutcome::visible(NOT_A_MOD_REPLY)
                }
            }
            Guard::UserNotIgnored => {
                if snapshot.actor_ignored {
                    GuardOutcome::silent(format!("{} asked to be ignored", ctx.user.display_name))
                } else {
                    GuardOutcome::Pass
                }
            }
            Guard::NotCommand => {
                if ctx.text.starts_with(command_marker) {
                    GuardOutcome::silent(format!("'{}' looks like a command", ctx.text))
                } else {
                    GuardOutcome::Pass
                }
            }
        }
    }
}

/// Guard chain for ordinary chat lines before they reach the spellchecker
pub const MESSAGE_GUARDS: &[Guard] = &[Guard::BotEnabled, Guard::NotCommand, Guard::UserNotIgnored];

/// Runs guard lists in order and stops at the first failure
#[derive(Debug, Clone)]
pub struct GuardPipeline {
    command_marker: char,
}

impl GuardPipeline {
    /// `command_prefix` is the configured prefix; its first character marks
    /// text as a command for [`Guard::NotCommand`].
    pub fn new(command_prefix: &str) -> Self {
        Self {
            command_marker: command_prefix.chars().next().unwrap_or('!'),
        }
    }

    pub fn command_marker(&self) -> char {
        self.command_marker
    }

    /// Evaluate `guards` in declared order. Nothing after a `Fail` runs.
    pub fn evaluate(&self, guards: &[Guard], ctx: &CommandContext, snapshot: &StateSnapshot) -> GuardOutcome {
        for guard in guards {
            let outcome = guard.check(ctx, snapshot, self.command_marker);
            if !outcome.is_pass() {
                return outcome;
            }
        }
        GuardOutcome::Pass
    }

    /// Evaluate and deal with any failure on the spot: silent ones are logged,
    /// visible ones get their single reply. Returns true when the handler may run.
    pub async fn run(&self, name: &str, guards: &[Guard], ctx: &CommandContext, snapshot: &StateSnapshot) -> bool {
        match self.evaluate(guards, ctx, snapshot) {
            GuardOutcome::Pass => true,
            GuardOutcome::Fail { reason, visibility: Visibility::Silent } => {
                debug!("Skipping {}: {}", name, reason);
                false
            }
            GuardOutcome::Fail { reason, visibility: Visibility::UserVisible } => {
                debug!("Rejected {} for {}: {}", name, ctx.user.display_name, reason);
                if let Err(e) = ctx.reply(&reason).await {
                    error!("Failed to send guard reply: {}", e);
                }
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::testing::*;

    const ENABLED: StateSnapshot = StateSnapshot { enabled: true, actor_ignored: false };
    const DISABLED: StateSnapshot = StateSnapshot { enabled: false, actor_ignored: false };
    const IGNORED: StateSnapshot = StateSnapshot { enabled: true, actor_ignored: true };

    #[test]
    fn test_individual_guards() {
        let sink = RecordingSink::new();
        let viewer_ctx = CommandContext::new(viewer("1"), "hello there", sink.clone());
        let mod_ctx = CommandContext::new(moderator("2"), "!c enable", sink.clone());

        assert!(Guard::BotEnabled.check(&viewer_ctx, &ENABLED, '!').is_pass());
        assert!(!Guard::BotEnabled.check(&viewer_ctx, &DISABLED, '!').is_pass());

        assert_eq!(Guard::UserIsMod.check(&viewer_ctx, &ENABLED, '!'), GuardOutcome::visible(NOT_A_MOD_REPLY));
        assert!(Guard::UserIsMod.check(&mod_ctx, &ENABLED, '!').is_pass());

        assert!(Guard::UserNotIgnored.check(&viewer_ctx, &ENABLED, '!').is_pass());
        assert!(!Guard::UserNotIgnored.check(&viewer_ctx, &IGNORED, '!').is_pass());

        assert!(Guard::NotCommand.check(&viewer_ctx, &ENABLED, '!').is_pass());
        assert!(!Guard::NotCommand.check(&mod_ctx, &ENABLED, '!').is_pass());
    }

    #[test]
    fn test_first_failure_wins() {
        let pipeline = GuardPipeline::new("!c ");
        let ctx = CommandContext::new(viewer("1"), "hi", RecordingSink::new());

        // Disabled is reported before the mod check ever runs
        let outcome = pipeline.evaluate(&[Guard::BotEnabled, Guard::UserIsMod], &ctx, &DISABLED);
        assert_eq!(outcome, GuardOutcome::silent("bot is disabled"));

        let outcome = pipeline.evaluate(&[Guard::UserIsMod, Guard::BotEnabled], &ctx, &DISABLED);
        assert_eq!(outcome, GuardOutcome::visible(NOT_A_MOD_REPLY));
    }

    #[test]
    fn test_empty_chain_passes() {
        let pipeline = GuardPipeline::new("!");
        let ctx = CommandContext::new(viewer("1"), "hi", RecordingSink::new());
        assert!(pipeline.evaluate(&[], &ctx, &DISABLED).is_pass());
    }

    #[test]
    fn test_marker_comes_from_prefix() {
        assert_eq!(GuardPipeline::new("!c ").command_marker(), '!');
        assert_eq!(GuardPipeline::new("?spell").command_marker(), '?');
        assert_eq!(GuardPipeline::new("").command_marker(), '!');
    }

    #[tokio::test]
    async fn test_visible_failure_replies_once() {
        let pipeline = GuardPipeline::new("!c ");
        let sink = RecordingSink::new();
        let ctx = CommandContext::new(viewer("1"), "!c enable", sink.clone());

        let allowed = pipeline.run("enable", &[Guard::UserIsMod], &ctx, &ENABLED).await;

        assert!(!allowed);
        assert_eq!(sink.replies(), vec![NOT_A_MOD_REPLY.to_string()]);
    }

    #[tokio::test]
    async fn test_silent_failure_does_not_reply() {
        let pipeline = GuardPipeline::new("!c ");
        let sink = RecordingSink::new();
        let ctx = CommandContext::new(viewer("1"), "helo", sink.clone());

        assert!(!pipeline.run("message", MESSAGE_GUARDS, &ctx, &IGNORED).await);
        assert!(!pipeline.run("message", MESSAGE_GUARDS, &ctx, &DISABLED).await);
        assert!(sink.replies().is_empty());
        assert!(pipeline.run("message", MESSAGE_GUARDS, &ctx, &ENABLED).await);
    }
}
