use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, RwLock};

use crate::config::BotConfig;
use crate::platforms::PlatformConnection;
use crate::types::{ChatEvent, ChatMessage, CommandContext, ReplySink};

pub mod commands;
pub mod guards;
pub mod persistence;
pub mod shutdown;
pub mod spellcheck;
pub mod state;
pub mod users;

use commands::CommandRouter;
use guards::{GuardPipeline, MESSAGE_GUARDS};
use shutdown::{ShutdownReason, ShutdownSignal};
use spellcheck::{render_suggestions, SpellChecker};
use state::BotState;
use users::UserDirectory;

/// How long queued replies get to drain once the event loop stops
const REPLY_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub fn greeting(bot_name: &str) -> String {
    format!("📎 Hi, my name is {}, I'm here to help. :) 📎", bot_name)
}

pub fn misspelling_reply(corrections: &str) -> String {
    format!(
        "📎 Uh-oh, looks like you misspelled {} Would you like help with that? 📎",
        corrections
    )
}

/// A reply on its way to the transport writer task
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundReply {
    pub channel: String,
    pub parent_id: Option<String>,
    pub text: String,
}

/// Reply capability for one inbound event, backed by the writer task's queue
pub struct ChannelReply {
    channel: String,
    parent_id: Option<String>,
    outbound: mpsc::Sender<OutboundReply>,
}

impl ChannelReply {
    pub fn new(channel: impl Into<String>, parent_id: Option<String>, outbound: mpsc::Sender<OutboundReply>) -> Self {
        Self {
            channel: channel.into(),
            parent_id,
            outbound,
        }
    }
}

#[async_trait]
impl ReplySink for ChannelReply {
    async fn reply(&self, text: &str) -> Result<()> {
        self.outbound
            .send(OutboundReply {
                channel: self.channel.clone(),
                parent_id: self.parent_id.clone(),
                text: text.to_string(),
            })
            .await
            .map_err(|_| anyhow!("reply queue for #{} is closed", self.channel))
    }
}

/// Core bot engine: routes chat events to commands or the spellchecker
pub struct ChatBot {
    state: Arc<BotState>,
    spellchecker: Arc<SpellChecker>,
    router: CommandRouter,
    users: Arc<dyn UserDirectory>,
    command_prefix: String,
}

impl ChatBot {
    pub fn new(
        config: &BotConfig,
        state: Arc<BotState>,
        spellchecker: Arc<SpellChecker>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        let pipeline = GuardPipeline::new(&config.command_prefix);
        let router = CommandRouter::with_defaults(pipeline, Arc::clone(&users));

        Self {
            state,
            spellchecker,
            router,
            users,
            command_prefix: config.command_prefix.clone(),
        }
    }

    /// Handle one event to completion. Any reply goes through `sink`.
    pub async fn handle_event(&self, event: ChatEvent, sink: Arc<dyn ReplySink>) {
        match event {
            ChatEvent::Joined { channel, user_name } => {
                info!("Joined #{} as {}", channel, user_name);
                if let Err(e) = sink.reply(&greeting(&user_name)).await {
                    error!("Failed to greet #{}: {}", channel, e);
                }
            }
            ChatEvent::Message(message) => self.handle_message(message, sink).await,
            ChatEvent::Disconnected { reason } => {
                debug!("Disconnect event reached handler: {}", reason);
            }
        }
    }

    async fn handle_message(&self, message: ChatMessage, sink: Arc<dyn ReplySink>) {
        let Some(user) = message.user else {
            debug!("Dropping message without an author in #{}", message.channel);
            return;
        };
        self.users.observe(&user);

        if let Some(command_text) = message.text.strip_prefix(self.command_prefix.as_str()) {
            let mut parts = command_text.split_whitespace();
            let Some(name) = parts.next().map(str::to_lowercase) else {
                debug!("Empty command from {}", user.display_name);
                return;
            };
            let args: Vec<String> = parts.map(str::to_string).collect();
            let ctx = CommandContext::new(user, message.text, sink).with_args(args);
            self.router.dispatch(&name, &ctx, &self.state).await;
            return;
        }

        let ctx = CommandContext::new(user, message.text, sink);
        let snapshot = self.state.snapshot_for(&ctx.user.id);
        if !self.router.pipeline().run("message", MESSAGE_GUARDS, &ctx, &snapshot).await {
            return;
        }

        // Candidate search is CPU bound; keep it off the reactor threads
        let checker = Arc::clone(&self.spellchecker);
        let text = ctx.text.clone();
        let suggestions = match tokio::task::spawn_blocking(move || checker.check(&text)).await {
            Ok(suggestions) => suggestions,
            Err(e) => {
                error!("Spellcheck task failed for {}: {}", ctx.user.display_name, e);
                return;
            }
        };
        if let Some(corrections) = render_suggestions(&suggestions) {
            debug!("Correcting {}: {}", ctx.user.display_name, corrections);
            if let Err(e) = ctx.reply(&misspelling_reply(&corrections)).await {
                error!("Failed to send correction to {}: {}", ctx.user.display_name, e);
            }
        }
    }

    /// Connect, then process events one at a time until `shutdown` fires or
    /// the transport goes away.
    pub async fn run(&self, mut connection: Box<dyn PlatformConnection>, shutdown: ShutdownSignal) -> Result<ShutdownReason> {
        let platform_name = connection.platform_name().to_string();
        connection.connect().await?;

        let mut events = connection
            .get_event_receiver()
            .ok_or_else(|| anyhow!("{} connection has no event stream", platform_name))?;

        let connection: Arc<RwLock<Box<dyn PlatformConnection>>> = Arc::new(RwLock::new(connection));

        // Response handler that sends replies back to the platform
        let (response_tx, mut response_rx) = mpsc::channel::<OutboundReply>(100);
        let writer = {
            let connection = Arc::clone(&connection);
            tokio::spawn(async move {
                while let Some(reply) = response_rx.recv().await {
                    let connection = connection.read().await;
                    let sent = match &reply.parent_id {
                        Some(parent_id) => connection.send_reply(&reply.channel, parent_id, &reply.text).await,
                        None => connection.send_message(&reply.channel, &reply.text).await,
                    };
                    match sent {
                        Ok(()) => info!("Sent response to #{}: {}", reply.channel, reply.text),
                        Err(e) => error!("Failed to send response to #{}: {}", reply.channel, e),
                    }
                }
            })
        };

        info!("Chat bot started on {}", platform_name);

        let reason = loop {
            tokio::select! {
                reason = shutdown.wait() => break reason,
                event = events.recv() => match event {
                    Ok(ChatEvent::Disconnected { reason }) => {
                        warn!("{} connection lost: {}", platform_name, reason);
                        shutdown.trigger(ShutdownReason::Disconnected(reason));
                    }
                    Ok(event) => {
                        if let Some(sink) = reply_sink_for(&event, response_tx.clone()) {
                            // A stuck handler (slow Helix lookup, say) must not hold up shutdown
                            tokio::select! {
                                _ = self.handle_event(event, sink) => {}
                                reason = shutdown.wait() => {
                                    warn!("Abandoning in-flight event to shut down");
                                    break reason;
                                }
                            }
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Event loop fell behind, skipped {} events", skipped);
                    }
                    Err(RecvError::Closed) => {
                        shutdown.trigger(ShutdownReason::Disconnected("event stream closed".to_string()));
                    }
                },
            }
        };

        info!("Stopping chat bot: {}", reason);

        drop(response_tx);
        if tokio::time::timeout(REPLY_DRAIN_TIMEOUT, writer).await.is_err() {
            warn!("Timed out flushing queued replies");
        }

        if let Err(e) = connection.write().await.disconnect().await {
            error!("Failed to disconnect from {}: {}", platform_name, e);
        }

        Ok(reason)
    }
}

/// Replies to a message thread under it; join greetings go to the channel
fn reply_sink_for(event: &ChatEvent, outbound: mpsc::Sender<OutboundReply>) -> Option<Arc<dyn ReplySink>> {
    match event {
        ChatEvent::Message(message) => Some(Arc::new(ChannelReply::new(&message.channel, message.id.clone(), outbound))),
        ChatEvent::Joined { channel, .. } => Some(Arc::new(ChannelReply::new(channel.as_str(), None, outbound))),
        ChatEvent::Disconnected { .. } => None,
    }
}
