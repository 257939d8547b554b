//! # ClippyBot
//!
//! A Twitch chat bot that points out misspelled words, in the spirit of a
//! certain paperclip.
//!
//! Plain chat messages are spellchecked against a word-frequency dictionary;
//! messages starting with the command prefix (`!c ` by default) go to a small
//! command table for enabling the bot and managing the ignore list.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use clippybot::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = BotConfig::from_env()?;
//!     let state = Arc::new(BotState::new(config.start_enabled));
//!     let guard = IgnoreListGuard::load(Arc::clone(&state), &config.ignore_users_path)?;
//!
//!     let spellchecker = Arc::new(SpellChecker::new(Dictionary::builtin()?));
//!     let bot = ChatBot::new(&config, state, spellchecker, Arc::new(SeenUsers::new()));
//!
//!     let twitch = TwitchConnection::new(TwitchConfig::from_env()?);
//!     let shutdown = ShutdownSignal::new();
//!     shutdown.start_signal_handlers();
//!
//!     let result = bot.run(Box::new(twitch), shutdown).await;
//!     guard.commit()?;
//!     result.map(|_| ())
//! }
//! ```

pub mod bot;
pub mod config;
pub mod error;
pub mod platforms;
pub mod types;

// Re-export commonly used items
pub mod prelude {
    pub use crate::bot::commands::{CommandHandler, CommandRouter};
    pub use crate::bot::guards::{Guard, GuardPipeline};
    pub use crate::bot::persistence::IgnoreListGuard;
    pub use crate::bot::shutdown::{ShutdownReason, ShutdownSignal};
    pub use crate::bot::spellcheck::{Dictionary, SpellChecker};
    pub use crate::bot::state::BotState;
    pub use crate::bot::users::{SeenUsers, UserDirectory};
    pub use crate::bot::ChatBot;
    pub use crate::config::BotConfig;
    pub use crate::platforms::{
        helix::HelixUserDirectory,
        twitch::{TwitchConfig, TwitchConnection},
        PlatformConnection,
    };
    pub use crate::types::{ChatEvent, ChatMessage, ChatUser, CommandContext, CorrectionSuggestion};
    pub use anyhow::Result;
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
