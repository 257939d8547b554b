// src/types/mod.rs - Event and context types shared by the transport and the bot core

use anyhow::Result;
use async_trait::async_trait;
use log::warn;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The author of a chat message, as reported by the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatUser {
    pub id: String,
    pub login: String,
    pub display_name: String,
    pub is_mod: bool,
    pub is_broadcaster: bool,
}

impl ChatUser {
    /// Broadcasters are always treated as moderators of their own channel
    pub fn is_privileged(&self) -> bool {
        self.is_broadcaster || self.is_mod
    }
}

/// A single chat line. The actor is optional because some platform notices
/// arrive without user tags; those are rejected once, at the bot boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub channel: String,
    pub id: Option<String>,
    pub user: Option<ChatUser>,
    pub text: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Everything the transport can hand to the bot
#[derive(Debug, Clone)]
pub enum ChatEvent {
    Message(ChatMessage),
    /// The bot account itself joined a channel
    Joined { channel: String, user_name: String },
    /// The transport lost its connection and will deliver nothing more
    Disconnected { reason: String },
}

/// One misspelled word and the dictionary's best guess for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrectionSuggestion {
    pub original_word: String,
    pub suggested_word: Option<String>,
}

impl CorrectionSuggestion {
    pub fn render(&self) -> Option<String> {
        self.suggested_word
            .as_ref()
            .map(|suggestion| format!("{} (did you mean \"{}\"?)", self.original_word, suggestion))
    }
}

/// Whether a guard failure is reported back to chat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Silent,
    UserVisible,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    Pass,
    Fail { reason: String, visibility: Visibility },
}

impl GuardOutcome {
    pub fn silent(reason: impl Into<String>) -> Self {
        GuardOutcome::Fail { reason: reason.into(), visibility: Visibility::Silent }
    }

    pub fn visible(reason: impl Into<String>) -> Self {
        GuardOutcome::Fail { reason: reason.into(), visibility: Visibility::UserVisible }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, GuardOutcome::Pass)
    }
}

/// Capability to answer the event currently being handled
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn reply(&self, text: &str) -> Result<()>;
}

/// Per-event context handed to guards and command handlers
pub struct CommandContext {
    pub user: ChatUser,
    pub text: String,
    pub args: Vec<String>,
    sink: Arc<dyn ReplySink>,
    replied: AtomicBool,
}

impl CommandContext {
    pub fn new(user: ChatUser, text: impl Into<String>, sink: Arc<dyn ReplySink>) -> Self {
        Self {
            user,
            text: text.into(),
            args: Vec::new(),
            sink,
            replied: AtomicBool::new(false),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Send the single reply allowed for this event. Later calls are dropped.
    pub async fn reply(&self, text: &str) -> Result<()> {
        if self.replied.swap(true, Ordering::SeqCst) {
            warn!("Dropping second reply to {}: {}", self.user.display_name, text);
            return Ok(());
        }
        self.sink.reply(text).await
    }

    pub fn has_replied(&self) -> bool {
        self.replied.load(Ordering::SeqCst)
    }
}
