// src/config/mod.rs - Bot settings read from the environment (and .env)

use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use std::env;
use std::path::PathBuf;

pub const DEFAULT_COMMAND_PREFIX: &str = "!c ";
pub const DEFAULT_IGNORE_FILE: &str = "ignore-users.json";
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Everything about the bot that is not platform credentials
#[derive(Debug, Clone, PartialEq)]
pub struct BotConfig {
    pub command_prefix: String,
    pub ignore_users_path: PathBuf,
    /// `None` uses the dictionary compiled into the binary
    pub dictionary_path: Option<PathBuf>,
    pub max_edit_distance: u8,
    pub start_enabled: bool,
    pub log_level: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            command_prefix: DEFAULT_COMMAND_PREFIX.to_string(),
            ignore_users_path: PathBuf::from(DEFAULT_IGNORE_FILE),
            dictionary_path: None,
            max_edit_distance: 2,
            start_enabled: true,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl BotConfig {
    /// Load configuration from `CLIPPYBOT_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`BotConfig::from_env`] but reading through `lookup`, which
    /// keeps tests away from the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let command_prefix = lookup("CLIPPYBOT_COMMAND_PREFIX").unwrap_or(defaults.command_prefix);
        if command_prefix.trim().is_empty() {
            return Err(anyhow!("CLIPPYBOT_COMMAND_PREFIX must not be empty"));
        }

        let ignore_users_path = lookup("CLIPPYBOT_IGNORE_FILE")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.ignore_users_path);

        let dictionary_path = lookup("CLIPPYBOT_DICTIONARY")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        let max_edit_distance = match lookup("CLIPPYBOT_MAX_EDIT_DISTANCE") {
            Some(value) => {
                let distance: u8 = value
                    .trim()
                    .parse()
                    .with_context(|| format!("CLIPPYBOT_MAX_EDIT_DISTANCE is not a number: {}", value))?;
                if !(1..=2).contains(&distance) {
                    return Err(anyhow!("CLIPPYBOT_MAX_EDIT_DISTANCE must be 1 or 2, got {}", distance));
                }
                distance
            }
            None => defaults.max_edit_distance,
        };

        let start_enabled = match lookup("CLIPPYBOT_START_ENABLED") {
            Some(value) => parse_bool(&value)
                .ok_or_else(|| anyhow!("CLIPPYBOT_START_ENABLED must be true or false, got {}", value))?,
            None => defaults.start_enabled,
        };

        let log_level = lookup("CLIPPYBOT_LOG_LEVEL").unwrap_or(defaults.log_level);

        let config = Self {
            command_prefix,
            ignore_users_path,
            dictionary_path,
            max_edit_distance,
            start_enabled,
            log_level,
        };
        debug!("Bot config: {:?}", config);
        Ok(config)
    }

    pub fn log_summary(&self) {
        info!(
            "Command prefix '{}', ignore list at {}, dictionary {}",
            self.command_prefix,
            self.ignore_users_path.display(),
            self.dictionary_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "built-in".to_string())
        );
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
