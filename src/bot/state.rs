// src/bot/state.rs - Enabled flag and ignore list shared by every handler

use log::{debug, info, warn};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::StateError;

struct Inner {
    enabled: bool,
    ignored: Vec<String>,
}

/// What a guard chain needs to know about the bot, read in one lock acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateSnapshot {
    pub enabled: bool,
    pub actor_ignored: bool,
}

/// Single source of truth for the enabled flag and the ignore list.
///
/// Both fields live behind one synchronous mutex. Every method takes the lock,
/// does its work and releases it before returning, so no caller can hold it
/// across an `.await`.
pub struct BotState {
    inner: Mutex<Inner>,
}

impl BotState {
    pub fn new(enabled: bool) -> Self {
        Self {
            inner: Mutex::new(Inner { enabled, ignored: Vec::new() }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Every critical section leaves `Inner` consistent, so a poisoned lock is still usable
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_enabled(&self) -> bool {
        self.lock().enabled
    }

    pub fn set_enabled(&self, enabled: bool) {
        let mut inner = self.lock();
        if inner.enabled != enabled {
            info!("Bot {}", if enabled { "enabled" } else { "disabled" });
        }
        inner.enabled = enabled;
    }

    pub fn snapshot_for(&self, user_id: &str) -> StateSnapshot {
        let inner = self.lock();
        StateSnapshot {
            enabled: inner.enabled,
            actor_ignored: inner.ignored.iter().any(|id| id == user_id),
        }
    }

    pub fn add_ignored(&self, user_id: &str) -> Result<(), StateError> {
        let mut inner = self.lock();
        if inner.ignored.iter().any(|id| id == user_id) {
            return Err(StateError::AlreadyIgnored(user_id.to_string()));
        }
        inner.ignored.push(user_id.to_string());
        debug!("Ignoring user {} ({} ignored)", user_id, inner.ignored.len());
        Ok(())
    }

    pub fn remove_ignored(&self, user_id: &str) -> Result<(), StateError> {
        let mut inner = self.lock();
        match inner.ignored.iter().position(|id| id == user_id) {
            Some(index) => {
                inner.ignored.remove(index);
                debug!("Listening to user {} again ({} ignored)", user_id, inner.ignored.len());
                Ok(())
            }
            None => Err(StateError::NotIgnored(user_id.to_string())),
        }
    }

    /// Copy of the ignore list in insertion order
    pub fn list_ignored(&self) -> Vec<String> {
        self.lock().ignored.clone()
    }

    /// Seed the ignore list, typically from the file loaded at startup.
    /// Duplicate ids are collapsed to their first occurrence.
    pub fn replace_ignored(&self, ids: Vec<String>) {
        let total = ids.len();
        let mut unique: Vec<String> = Vec::with_capacity(total);
        for id in ids {
            if !unique.contains(&id) {
                unique.push(id);
            }
        }
        if unique.len() != total {
            warn!("Dropped {} duplicate entries from the ignore list", total - unique.len());
        }
        self.lock().ignored = unique;
    }
}

impl Default for BotState {
    fn default() -> Self {
        Self::new(true)
    }
}
