use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::types::ChatEvent;

pub mod helix;
pub mod twitch;

/// Trait defining the interface a chat transport must implement
#[async_trait]
pub trait PlatformConnection: Send + Sync {
    /// Connect to the platform and start receiving events
    async fn connect(&mut self) -> Result<()>;

    /// Send a message to the specified channel
    async fn send_message(&self, channel: &str, message: &str) -> Result<()>;

    /// Send a message threaded under `parent_id`
    async fn send_reply(&self, channel: &str, parent_id: &str, message: &str) -> Result<()> {
        let _ = parent_id;
        self.send_message(channel, message).await
    }

    /// Get the platform identifier (e.g., "twitch")
    fn platform_name(&self) -> &str;

    /// Check if the connection is healthy
    async fn is_connected(&self) -> bool;

    /// Get a receiver for incoming events. A lost connection is reported as
    /// `ChatEvent::Disconnected`.
    fn get_event_receiver(&self) -> Option<broadcast::Receiver<ChatEvent>>;

    /// Gracefully disconnect
    async fn disconnect(&mut self) -> Result<()>;
}
