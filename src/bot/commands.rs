use anyhow::Result;
use async_trait::async_trait;
use log::{debug, error, info};
use std::collections::HashMap;
use std::sync::Arc;

use crate::bot::guards::{Guard, GuardPipeline};
use crate::bot::state::BotState;
use crate::bot::users::UserDirectory;
use crate::error::StateError;
use crate::types::CommandContext;

pub const ABOUT_REPLY: &str =
    "📎 I am a bot! I am here to autocorrect everything you say. Isn't that helpful? 📎";
pub const ENABLE_REPLY: &str = "📎 Clippy will start being annoying now! OpieOP 📎";
pub const DISABLE_REPLY: &str = "📎 Clippy will stop being annoying... for now... monkaS 📎";
pub const IGNORE_REPLY: &str = "📎 Ok! I won't bother you anymore! :) 📎";
pub const ALREADY_IGNORED_REPLY: &str = "📎 You are already on the ignore list! 📎";
pub const LISTEN_REPLY: &str = "📎 Ok! I'll be sure to suggest corrections for you again! :) 📎";
pub const NOT_IGNORED_REPLY: &str = "📎 You are not on the ignore list! 📎";

/// Body of a chat command. Returns the reply text, if any.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, ctx: &CommandContext, state: &BotState) -> Result<Option<String>>;
}

struct Registration {
    name: String,
    guards: Vec<Guard>,
    handler: Arc<dyn CommandHandler>,
}

/// Table of commands: name -> guard list + handler.
///
/// Adding a command is a `register` call; dispatch has no per-command code.
pub struct CommandRouter {
    commands: HashMap<String, Arc<Registration>>,
    pipeline: GuardPipeline,
}

impl CommandRouter {
    pub fn new(pipeline: GuardPipeline) -> Self {
        Self {
            commands: HashMap::new(),
            pipeline,
        }
    }

    /// Router with every built-in command registered
    pub fn with_defaults(pipeline: GuardPipeline, users: Arc<dyn UserDirectory>) -> Self {
        let mut router = Self::new(pipeline);
        router.register(&["about", "help"], vec![Guard::BotEnabled], Arc::new(AboutHandler));
        router.register(&["enable", "start"], vec![Guard::UserIsMod], Arc::new(EnableHandler));
        router.register(&["disable", "stop"], vec![Guard::UserIsMod], Arc::new(DisableHandler));
        router.register(
            &["list", "ignorelist"],
            vec![Guard::BotEnabled, Guard::UserIsMod],
            Arc::new(ListHandler::new(users)),
        );
        router.register(&["ignore"], vec![Guard::BotEnabled], Arc::new(IgnoreHandler));
        router.register(&["listen", "unignore"], vec![Guard::BotEnabled], Arc::new(ListenHandler));
        router
    }

    /// Register `handler` under every name in `names`. The first name is the
    /// one used in logs.
    pub fn register(&mut self, names: &[&str], guards: Vec<Guard>, handler: Arc<dyn CommandHandler>) {
        let Some(primary) = names.first() else {
            return;
        };
        let registration = Arc::new(Registration {
            name: primary.to_lowercase(),
            guards,
            handler,
        });
        for name in names {
            self.commands.insert(name.to_lowercase(), Arc::clone(&registration));
        }
        debug!("Registered command: {}", names.join("/"));
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.commands.contains_key(&name.to_lowercase())
    }

    pub fn pipeline(&self) -> &GuardPipeline {
        &self.pipeline
    }

    /// Run the guards for `name` and, if they all pass, its handler. Returns
    /// false for unknown commands.
    pub async fn dispatch(&self, name: &str, ctx: &CommandContext, state: &BotState) -> bool {
        let registration = match self.commands.get(&name.to_lowercase()) {
            Some(registration) => Arc::clone(registration),
            None => {
                debug!("Unknown command: {}", name);
                return false;
            }
        };

        let snapshot = state.snapshot_for(&ctx.user.id);
        if !self.pipeline.run(&registration.name, &registration.guards, ctx, &snapshot).await {
            return true;
        }

        info!("Executing command '{}' for user '{}'", registration.name, ctx.user.display_name);

        match registration.handler.handle(ctx, state).await {
            Ok(Some(reply)) => {
                if let Err(e) = ctx.reply(&reply).await {
                    error!("Failed to send reply for '{}': {}", registration.name, e);
                }
            }
            Ok(None) => {}
            Err(e) => error!("Command '{}' failed: {}", registration.name, e),
        }
        true
    }
}

pub struct AboutHandler;

#[async_trait]
impl CommandHandler for AboutHandler {
    async fn handle(&self, _ctx: &CommandContext, _state: &BotState) -> Result<Option<String>> {
        Ok(Some(ABOUT_REPLY.to_string()))
    }
}

pub struct EnableHandler;

#[async_trait]
impl CommandHandler for EnableHandler {
    async fn handle(&self, ctx: &CommandContext, state: &BotState) -> Result<Option<String>> {
        state.set_enabled(true);
        info!("{} enabled the bot", ctx.user.display_name);
        Ok(Some(ENABLE_REPLY.to_string()))
    }
}

pub struct DisableHandler;

#[async_trait]
impl CommandHandler for DisableHandler {
    async fn handle(&self, ctx: &CommandContext, state: &BotState) -> Result<Option<String>> {
        state.set_enabled(false);
        info!("{} disabled the bot", ctx.user.display_name);
        Ok(Some(DISABLE_REPLY.to_string()))
    }
}

/// Lists ignored users by display name
pub struct ListHandler {
    users: Arc<dyn UserDirectory>,
}

impl ListHandler {
    pub fn new(users: Arc<dyn UserDirectory>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl CommandHandler for ListHandler {
    async fn handle(&self, _ctx: &CommandContext, state: &BotState) -> Result<Option<String>> {
        // Snapshot first; the lookup below may take a network round trip
        let ids = state.list_ignored();
        if ids.is_empty() {
            return Ok(Some("Ignored users: (none)".to_string()));
        }
        let names = self.users.display_names(&ids).await?;
        Ok(Some(format!("Ignored users: {}", names.join(", "))))
    }
}

pub struct IgnoreHandler;

#[async_trait]
impl CommandHandler for IgnoreHandler {
    async fn handle(&self, ctx: &CommandContext, state: &BotState) -> Result<Option<String>> {
        info!("Got ignore request for user: {}", ctx.user.display_name);
        match state.add_ignored(&ctx.user.id) {
            Ok(()) => Ok(Some(IGNORE_REPLY.to_string())),
            Err(StateError::AlreadyIgnored(_)) => Ok(Some(ALREADY_IGNORED_REPLY.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}

pub struct ListenHandler;

#[async_trait]
impl CommandHandler for ListenHandler {
    async fn handle(&self, ctx: &CommandContext, state: &BotState) -> Result<Option<String>> {
        info!("Got unignore request for user: {}", ctx.user.display_name);
        match state.remove_ignored(&ctx.user.id) {
            Ok(()) => Ok(Some(LISTEN_REPLY.to_string())),
            Err(StateError::NotIgnored(_)) => Ok(Some(NOT_IGNORED_REPLY.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::guards::NOT_A_MOD_REPLY;
    use crate::bot::users::SeenUsers;
    use crate::types::testing::*;
    use crate::types::ChatUser;

    fn router_with(users: Arc<SeenUsers>) -> CommandRouter {
        CommandRouter::with_defaults(GuardPipeline::new("!c "), users)
    }

    fn router() -> CommandRouter {
        router_with(Arc::new(SeenUsers::new()))
    }

    async fn run(router: &CommandRouter, state: &BotState, name: &str, user: ChatUser) -> Vec<String> {
        let sink = RecordingSink::new();
        let ctx = CommandContext::new(user, format!("!c {}", name), sink.clone());
        router.dispatch(name, &ctx, state).await;
        sink.replies()
    }

    #[tokio::test]
    async fn test_non_mod_cannot_enable() {
        let router = router();
        let state = BotState::new(false);

        let replies = run(&router, &state, "enable", viewer("1")).await;

        assert_eq!(replies, vec![NOT_A_MOD_REPLY.to_string()]);
        assert!(!state.is_enabled());
    }

    #[tokio::test]
    async fn test_mod_and_broadcaster_toggle_bot() {
        let router = router();
        let state = BotState::new(true);

        assert_eq!(run(&router, &state, "disable", moderator("2")).await, vec![DISABLE_REPLY.to_string()]);
        assert!(!state.is_enabled());

        // enable works even while disabled
        assert_eq!(run(&router, &state, "START", broadcaster("3")).await, vec![ENABLE_REPLY.to_string()]);
        assert!(state.is_enabled());

        run(&router, &state, "stop", broadcaster("3")).await;
        assert!(!state.is_enabled());
    }

    #[tokio::test]
    async fn test_unknown_command_is_ignored() {
        let router = router();
        let state = BotState::new(true);

        let sink = RecordingSink::new();
        let ctx = CommandContext::new(moderator("1"), "!c frobnicate", sink.clone());
        assert!(!router.dispatch("frobnicate", &ctx, &state).await);

        assert!(sink.replies().is_empty());
        assert!(state.is_enabled());
        assert!(state.list_ignored().is_empty());
    }

    #[tokio::test]
    async fn test_about_and_help_share_handler() {
        let router = router();
        let state = BotState::new(true);

        assert_eq!(run(&router, &state, "about", viewer("1")).await, vec![ABOUT_REPLY.to_string()]);
        assert_eq!(run(&router, &state, "help", viewer("1")).await, vec![ABOUT_REPLY.to_string()]);

        state.set_enabled(false);
        assert!(run(&router, &state, "about", viewer("1")).await.is_empty());
    }

    #[tokio::test]
    async fn test_ignore_and_listen_round_trip() {
        let router = router();
        let state = BotState::new(true);

        assert_eq!(run(&router, &state, "ignore", viewer("5")).await, vec![IGNORE_REPLY.to_string()]);
        assert_eq!(state.list_ignored(), vec!["5"]);

        assert_eq!(run(&router, &state, "ignore", viewer("5")).await, vec![ALREADY_IGNORED_REPLY.to_string()]);
        assert_eq!(state.list_ignored(), vec!["5"]);

        assert_eq!(run(&router, &state, "listen", viewer("5")).await, vec![LISTEN_REPLY.to_string()]);
        assert!(state.list_ignored().is_empty());

        assert_eq!(run(&router, &state, "unignore", viewer("5")).await, vec![NOT_IGNORED_REPLY.to_string()]);
    }

    #[tokio::test]
    async fn test_ignore_requires_enabled_bot() {
        let router = router();
        let state = BotState::new(false);

        assert!(run(&router, &state, "ignore", viewer("5")).await.is_empty());
        assert!(state.list_ignored().is_empty());
    }

    #[tokio::test]
    async fn test_list_requires_mod_and_shows_names() {
        let users = Arc::new(SeenUsers::new());
        users.observe(&viewer("5"));
        let router = router_with(Arc::clone(&users));
        let state = BotState::new(true);

        assert_eq!(run(&router, &state, "list", viewer("5")).await, vec![NOT_A_MOD_REPLY.to_string()]);
        assert_eq!(run(&router, &state, "list", moderator("1")).await, vec!["Ignored users: (none)".to_string()]);

        state.add_ignored("5").unwrap();
        state.add_ignored("6").unwrap();
        assert_eq!(
            run(&router, &state, "ignorelist", moderator("1")).await,
            vec!["Ignored users: Viewer5, 6".to_string()]
        );
    }

    #[tokio::test]
    async fn test_list_on_disabled_bot_is_silent_even_for_non_mods() {
        let router = router();
        let state = BotState::new(false);
        assert!(run(&router, &state, "list", viewer("5")).await.is_empty());
    }

    struct FailingDirectory;

    #[async_trait]
    impl UserDirectory for FailingDirectory {
        async fn display_names(&self, _ids: &[String]) -> Result<Vec<String>> {
            Err(anyhow::anyhow!("helix is down"))
        }
    }

    #[tokio::test]
    async fn test_handler_errors_are_not_sent_to_chat() {
        let router = CommandRouter::with_defaults(GuardPipeline::new("!c "), Arc::new(FailingDirectory));
        let state = BotState::new(true);
        state.add_ignored("5").unwrap();

        assert!(run(&router, &state, "list", moderator("1")).await.is_empty());
    }

    #[tokio::test]
    async fn test_custom_registration() {
        struct Ping;

        #[async_trait]
        impl CommandHandler for Ping {
            async fn handle(&self, _ctx: &CommandContext, _state: &BotState) -> Result<Option<String>> {
                Ok(Some("pong".to_string()))
            }
        }

        let mut router = CommandRouter::new(GuardPipeline::new("!c "));
        router.register(&["ping"], vec![], Arc::new(Ping));
        assert!(router.is_registered("PING"));

        let state = BotState::new(false);
        assert_eq!(run(&router, &state, "ping", viewer("1")).await, vec!["pong".to_string()]);
    }

    /// Sets the flag and records the write under one lock, so the log's
    /// order is the order the writes landed in
    struct RecordingToggle {
        value: bool,
        log: Arc<std::sync::Mutex<Vec<bool>>>,
    }

    #[async_trait]
    impl CommandHandler for RecordingToggle {
        async fn handle(&self, _ctx: &CommandContext, state: &BotState) -> Result<Option<String>> {
            let mut log = self.log.lock().unwrap();
            state.set_enabled(self.value);
            log.push(self.value);
            Ok(Some(if self.value { ENABLE_REPLY } else { DISABLE_REPLY }.to_string()))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_toggles_keep_the_last_write() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut router = CommandRouter::new(GuardPipeline::new("!c "));
        for (name, value) in [("enable", true), ("disable", false)] {
            let handler = RecordingToggle { value, log: Arc::clone(&log) };
            router.register(&[name], vec![Guard::UserIsMod], Arc::new(handler));
        }
        let router = Arc::new(router);
        let state = Arc::new(BotState::new(true));

        let tasks: Vec<_> = (0..32)
            .map(|i| {
                let router = Arc::clone(&router);
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let name = if i % 2 == 0 { "enable" } else { "disable" };
                    run(&router, &state, name, moderator("1")).await
                })
            })
            .collect();

        let mut replies = 0;
        for task in tasks {
            replies += task.await.unwrap().len();
        }

        let log = log.lock().unwrap();
        assert_eq!(replies, 32);
        assert_eq!(log.len(), 32);
        assert_eq!(log.iter().filter(|enabled| **enabled).count(), 16);
        assert_eq!(state.is_enabled(), *log.last().unwrap());
        assert_eq!(state.snapshot_for("1").enabled, *log.last().unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_default_toggles_answer_every_mod_across_threads() {
        let router = Arc::new(router());
        let state = Arc::new(BotState::new(false));

        let tasks: Vec<_> = (0..32)
            .map(|i| {
                let router = Arc::clone(&router);
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let name = if i % 2 == 0 { "enable" } else { "disable" };
                    (name, run(&router, &state, name, moderator("1")).await)
                })
            })
            .collect();

        for task in tasks {
            let (name, replies) = task.await.unwrap();
            let expected = if name == "enable" { ENABLE_REPLY } else { DISABLE_REPLY };
            assert_eq!(replies, vec![expected.to_string()]);
        }

        run(&router, &state, "enable", moderator("1")).await;
        assert!(state.is_enabled());
    }
}
