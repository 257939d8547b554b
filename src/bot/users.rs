// src/bot/users.rs - Turning user ids back into names people recognise

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::types::ChatUser;

/// Looks up display names for user ids
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Display names for `ids`, in the same order. Ids the directory cannot
    /// resolve may be omitted.
    async fn display_names(&self, ids: &[String]) -> Result<Vec<String>>;

    /// Called for every chat message so caching directories can learn names
    fn observe(&self, _user: &ChatUser) {}
}

/// Directory built from the names seen in chat. Unknown ids come back as-is.
#[derive(Default)]
pub struct SeenUsers {
    names: RwLock<HashMap<String, String>>,
}

impl SeenUsers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.names.read().map(|names| names.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl UserDirectory for SeenUsers {
    async fn display_names(&self, ids: &[String]) -> Result<Vec<String>> {
        let names = self
            .names
            .read()
            .map_err(|_| anyhow::anyhow!("seen-users cache is poisoned"))?;
        Ok(ids
            .iter()
            .map(|id| names.get(id).cloned().unwrap_or_else(|| id.clone()))
            .collect())
    }

    fn observe(&self, user: &ChatUser) {
        if let Ok(mut names) = self.names.write() {
            if names.get(&user.id) != Some(&user.display_name) {
                names.insert(user.id.clone(), user.display_name.clone());
            }
        }
    }
}
