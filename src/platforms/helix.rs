use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, warn};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::bot::users::{SeenUsers, UserDirectory};
use crate::types::ChatUser;

const HELIX_USERS_URL: &str = "https://api.twitch.tv/helix/users";
/// Helix accepts at most this many `id` parameters per request
const MAX_IDS_PER_REQUEST: usize = 100;
const HELIX_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct HelixUsersResponse {
    data: Vec<HelixUser>,
}

#[derive(Debug, Deserialize)]
struct HelixUser {
    id: String,
    display_name: String,
}

/// Resolves user ids through the Twitch Helix API.
///
/// Ids Helix does not return (deleted or banned accounts) fall back to names
/// seen in chat, then to the raw id.
pub struct HelixUserDirectory {
    client: reqwest::Client,
    client_id: String,
    access_token: String,
    base_url: String,
    timeout: Duration,
    seen: SeenUsers,
}

impl HelixUserDirectory {
    /// `oauth_token` may carry the IRC-style `oauth:` prefix
    pub fn new(client_id: impl Into<String>, oauth_token: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            client_id: client_id.into(),
            access_token: oauth_token.trim_start_matches("oauth:").to_string(),
            base_url: HELIX_USERS_URL.to_string(),
            timeout: HELIX_TIMEOUT,
            seen: SeenUsers::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Upper bound on one Helix request, connect through body
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn fetch_batch(&self, ids: &[String]) -> Result<Vec<HelixUser>> {
        let query: Vec<(&str, &str)> = ids.iter().map(|id| ("id", id.as_str())).collect();

        let response = self
            .client
            .get(&self.base_url)
            .header("Client-Id", &self.client_id)
            .bearer_auth(&self.access_token)
            .query(&query)
            .timeout(self.timeout)
            .send()
            .await
            .context("Failed to reach Twitch Helix")?
            .error_for_status()
            .context("Twitch Helix rejected the user lookup")?;

        let body: HelixUsersResponse = response
            .json()
            .await
            .context("Failed to parse Twitch Helix users response")?;
        debug!("Helix resolved {} of {} users", body.data.len(), ids.len());
        Ok(body.data)
    }
}

#[async_trait]
impl UserDirectory for HelixUserDirectory {
    async fn display_names(&self, ids: &[String]) -> Result<Vec<String>> {
        let mut resolved: HashMap<String, String> = HashMap::new();
        for chunk in ids.chunks(MAX_IDS_PER_REQUEST) {
            for user in self.fetch_batch(chunk).await? {
                resolved.insert(user.id, user.display_name);
            }
        }

        let fallback = self.seen.display_names(ids).await?;
        Ok(ids
            .iter()
            .zip(fallback)
            .map(|(id, seen_name)| match resolved.remove(id) {
                Some(name) => name,
                None => {
                    warn!("Helix has no user with id {}", id);
                    seen_name
                }
            })
            .collect())
    }

    fn observe(&self, user: &ChatUser) {
        self.seen.observe(user);
    }
}
