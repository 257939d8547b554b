use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use crate::platforms::PlatformConnection;
use crate::types::{ChatEvent, ChatMessage, ChatUser};

const TWITCH_IRC_URL: &str = "wss://irc-ws.chat.twitch.tv:443";

// Type aliases for cleaner code
type WebSocketWriter = Arc<RwLock<futures_util::stream::SplitSink<tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>, Message>>>;

/// Configuration for the Twitch connection
#[derive(Debug, Clone)]
pub struct TwitchConfig {
    pub username: String,
    pub oauth_token: String, // oauth:your_token_here
    pub channel: String,
    /// Application client id; enables Helix user lookups when set
    pub client_id: Option<String>,
}

impl TwitchConfig {
    /// Load Twitch configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let username = env::var("TWITCH_USERNAME")
            .context("TWITCH_USERNAME environment variable not set")?;

        let oauth_token = env::var("TWITCH_OAUTH_TOKEN")
            .context("TWITCH_OAUTH_TOKEN environment variable not set")?;

        let channel = env::var("TWITCH_CHANNEL")
            .context("TWITCH_CHANNEL environment variable not set")?;

        let client_id = env::var("TWITCH_CLIENT_ID").ok().filter(|id| !id.trim().is_empty());

        Self::new(username, oauth_token, channel, client_id)
    }

    pub fn new(username: String, oauth_token: String, channel: String, client_id: Option<String>) -> Result<Self> {
        let channel = channel.trim().trim_start_matches('#').to_lowercase();
        if channel.is_empty() {
            return Err(anyhow::anyhow!("No channel specified in TWITCH_CHANNEL"));
        }

        // Validate OAuth token format
        if !oauth_token.starts_with("oauth:") {
            return Err(anyhow::anyhow!(
                "TWITCH_OAUTH_TOKEN must start with 'oauth:' - got: {}...",
                &oauth_token[..oauth_token.char_indices().nth(10).map(|(i, _)| i).unwrap_or(oauth_token.len())]
            ));
        }

        info!("Loaded Twitch config for user '{}' in #{}", username, channel);

        Ok(Self {
            username: username.to_lowercase(),
            oauth_token,
            channel,
            client_id,
        })
    }
}

/// Twitch IRC connection implementation
pub struct TwitchConnection {
    config: TwitchConfig,
    event_sender: Option<broadcast::Sender<ChatEvent>>,
    websocket_writer: Option<WebSocketWriter>,
    is_connected: Arc<RwLock<bool>>,
}

impl TwitchConnection {
    pub fn new(config: TwitchConfig) -> Self {
        Self {
            config,
            event_sender: None,
            websocket_writer: None,
            is_connected: Arc::new(RwLock::new(false)),
        }
    }

    async fn send_raw(&self, line: String) -> Result<()> {
        let writer_arc = self
            .websocket_writer
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Not connected to Twitch"))?;
        writer_arc.write().await.send(Message::Text(line)).await?;
        Ok(())
    }
}

/// Everything a single websocket frame asks of us
#[derive(Debug, Default)]
pub struct ParsedFrame {
    pub events: Vec<ChatEvent>,
    /// Payloads of server PINGs, each owed a PONG
    pub pings: Vec<String>,
}

/// Parse one websocket frame, which may hold several IRC lines
pub fn parse_twitch_frame(raw: &str, bot_login: &str) -> ParsedFrame {
    let mut frame = ParsedFrame::default();
    for line in raw.split('\n').map(str::trim).filter(|line| !line.is_empty()) {
        if let Some(payload) = line.strip_prefix("PING") {
            frame.pings.push(payload.trim().to_string());
        } else if let Some(event) = parse_irc_line(line, bot_login) {
            frame.events.push(event);
        }
    }
    frame
}

/// Parse a single IRC line into an event we care about: PRIVMSG, or JOIN by
/// the bot itself.
pub fn parse_irc_line(line: &str, bot_login: &str) -> Option<ChatEvent> {
    // Format: [@tags ]:nick!user@host COMMAND #channel[ :trailing]
    let (tags, rest) = match line.strip_prefix('@') {
        Some(tagged) => {
            let (tags, rest) = tagged.split_once(' ')?;
            (parse_tags(tags), rest)
        }
        None => (HashMap::new(), line),
    };

    let rest = rest.strip_prefix(':')?;
    let (prefix, rest) = rest.split_once(' ')?;
    let nick = prefix.split('!').next().unwrap_or_default();

    let (command, rest) = rest.split_once(' ').unwrap_or((rest, ""));
    match command {
        "PRIVMSG" => {
            let (channel, text) = rest.split_once(" :")?;
            Some(ChatEvent::Message(ChatMessage {
                channel: channel.trim_start_matches('#').to_string(),
                id: tags.get("id").filter(|id| !id.is_empty()).cloned(),
                user: user_from_tags(&tags, nick),
                text: text.to_string(),
                timestamp: chrono::Utc::now(),
            }))
        }
        "JOIN" if nick.eq_ignore_ascii_case(bot_login) => Some(ChatEvent::Joined {
            channel: rest.trim().trim_start_matches('#').to_string(),
            user_name: nick.to_string(),
        }),
        _ => {
            debug!("Ignoring IRC command {}", command);
            None
        }
    }
}

fn parse_tags(raw: &str) -> HashMap<String, String> {
    raw.split(';')
        .filter_map(|tag| tag.split_once('='))
        .map(|(key, value)| (key.to_string(), unescape_tag_value(value)))
        .collect()
}

fn unescape_tag_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('s') => out.push(' '),
            Some(':') => out.push(';'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Messages without a `user-id` tag have no actor the bot can act on
fn user_from_tags(tags: &HashMap<String, String>, nick: &str) -> Option<ChatUser> {
    let id = tags.get("user-id").filter(|id| !id.is_empty())?.clone();
    let badges = tags.get("badges").map(String::as_str).unwrap_or_default();
    let is_broadcaster = badges
        .split(',')
        .filter_map(|badge| badge.split('/').next())
        .any(|badge| badge == "broadcaster");

    let display_name = tags
        .get("display-name")
        .filter(|name| !name.is_empty())
        .cloned()
        .unwrap_or_else(|| nick.to_string());

    Some(ChatUser {
        id,
        login: nick.to_string(),
        display_name,
        is_mod: tags.get("mod").map(|m| m == "1").unwrap_or(false),
        is_broadcaster,
    })
}

#[async_trait]
impl PlatformConnection for TwitchConnection {
    async fn connect(&mut self) -> Result<()> {
        info!("Connecting to Twitch IRC...");

        let url = Url::parse(TWITCH_IRC_URL)
            .context("Failed to parse Twitch WebSocket URL")?;

        let (ws_stream, _) = connect_async(url)
            .await
            .context("Failed to connect to Twitch WebSocket")?;

        let (write, read) = ws_stream.split();

        // Store writer for sending messages
        let writer_arc = Arc::new(RwLock::new(write));
        let writer_for_pong = Arc::clone(&writer_arc);
        self.websocket_writer = Some(writer_arc);

        // Authenticate with Twitch
        self.send_raw(format!("PASS {}\r\n", self.config.oauth_token)).await
            .context("Failed to send PASS command")?;
        self.send_raw(format!("NICK {}\r\n", self.config.username)).await
            .context("Failed to send NICK command")?;

        // Tags carry user ids, badges and message ids
        self.send_raw("CAP REQ :twitch.tv/tags twitch.tv/commands twitch.tv/membership\r\n".to_string()).await
            .context("Failed to request capabilities")?;

        self.send_raw(format!("JOIN #{}\r\n", self.config.channel)).await
            .with_context(|| format!("Failed to join channel: {}", self.config.channel))?;

        let (tx, _) = broadcast::channel(1000);
        self.event_sender = Some(tx.clone());

        *self.is_connected.write().await = true;

        let event_sender = tx;
        let is_connected = Arc::clone(&self.is_connected);
        let bot_login = self.config.username.clone();

        tokio::spawn(async move {
            let mut read = read;
            info!("Twitch message reader started");

            let reason = loop {
                match read.next().await {
                    Some(Ok(Message::Text(text))) => {
                        debug!("Received: {}", text);

                        let frame = parse_twitch_frame(&text, &bot_login);

                        // Handle PING/PONG to keep connection alive
                        for payload in frame.pings {
                            debug!("Responding to PING");
                            let pong_msg = format!("PONG {}\r\n", payload);
                            if let Err(e) = writer_for_pong.write().await.send(Message::Text(pong_msg)).await {
                                error!("Failed to send PONG: {}", e);
                            }
                        }

                        for event in frame.events {
                            if let Err(e) = event_sender.send(event) {
                                warn!("Failed to broadcast event: {}", e);
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        debug!("Received ping, sending pong");
                        if let Err(e) = writer_for_pong.write().await.send(Message::Pong(payload)).await {
                            error!("Failed to send pong: {}", e);
                        }
                    }
                    Some(Ok(Message::Close(close_frame))) => {
                        info!("WebSocket connection closed: {:?}", close_frame);
                        break "connection closed by Twitch".to_string();
                    }
                    Some(Ok(_)) => {
                        debug!("Ignoring non-text websocket frame");
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        break format!("websocket error: {}", e);
                    }
                    None => {
                        warn!("WebSocket stream ended");
                        break "websocket stream ended".to_string();
                    }
                }
            };

            *is_connected.write().await = false;
            let _ = event_sender.send(ChatEvent::Disconnected { reason });
            warn!("Twitch connection handler exited");
        });

        info!("Successfully connected to Twitch IRC");
        Ok(())
    }

    async fn send_message(&self, channel: &str, message: &str) -> Result<()> {
        match self.send_raw(format!("PRIVMSG #{} :{}\r\n", channel, message)).await {
            Ok(()) => {
                debug!("Sent message to #{}: {}", channel, message);
                Ok(())
            }
            Err(e) => {
                error!("Failed to send message to #{}: {}", channel, e);
                Err(e)
            }
        }
    }

    async fn send_reply(&self, channel: &str, parent_id: &str, message: &str) -> Result<()> {
        let line = format!("@reply-parent-msg-id={} PRIVMSG #{} :{}\r\n", parent_id, channel, message);
        match self.send_raw(line).await {
            Ok(()) => {
                debug!("Sent reply to {} in #{}: {}", parent_id, channel, message);
                Ok(())
            }
            Err(e) => {
                error!("Failed to send reply to #{}: {}", channel, e);
                Err(e)
            }
        }
    }

    fn platform_name(&self) -> &str {
        "twitch"
    }

    async fn is_connected(&self) -> bool {
        *self.is_connected.read().await
    }

    fn get_event_receiver(&self) -> Option<broadcast::Receiver<ChatEvent>> {
        self.event_sender.as_ref().map(|sender| sender.subscribe())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(writer_arc) = self.websocket_writer.take() {
            if let Err(e) = writer_arc.write().await.close().await {
                debug!("Error closing Twitch websocket: {}", e);
            }
        }
        *self.is_connected.write().await = false;
        self.event_sender = None;
        info!("Disconnected from Twitch");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRIVMSG: &str = "@badge-info=;badges=broadcaster/1,premium/1;color=#0000FF;display-name=Ivo\\sR;emotes=;id=b34ccfc7-4977-403a-8a94-33c6bac34fb8;mod=0;room-id=1337;user-id=1337 :the_ivo_robotnic!the_ivo_robotnic@the_ivo_robotnic.tmi.twitch.tv PRIVMSG #the_ivo_robotnic :helo wrld";

    #[test]
    fn test_parse_privmsg_with_tags() {
        let event = parse_irc_line(PRIVMSG, "clippybot").unwrap();
        let ChatEvent::Message(message) = event else {
            panic!("expected a message");
        };

        assert_eq!(message.channel, "the_ivo_robotnic");
        assert_eq!(message.text, "helo wrld");
        assert_eq!(message.id.as_deref(), Some("b34ccfc7-4977-403a-8a94-33c6bac34fb8"));

        let user = message.user.unwrap();
        assert_eq!(user.id, "1337");
        assert_eq!(user.login, "the_ivo_robotnic");
        assert_eq!(user.display_name, "Ivo R");
        assert!(user.is_broadcaster);
        assert!(!user.is_mod);
    }

    #[test]
    fn test_parse_mod_flag_and_colon_in_text() {
        let line = "@badges=moderator/1;display-name=;mod=1;user-id=42 :somemod!somemod@somemod.tmi.twitch.tv PRIVMSG #chan :!c list: now";
        let ChatEvent::Message(message) = parse_irc_line(line, "clippybot").unwrap() else {
            panic!("expected a message");
        };
        let user = message.user.unwrap();
        assert!(user.is_mod);
        assert!(!user.is_broadcaster);
        assert_eq!(user.display_name, "somemod");
        assert_eq!(message.text, "!c list: now");
        assert_eq!(message.id, None);
    }

    #[test]
    fn test_message_without_user_id_has_no_actor() {
        let line = ":someone!someone@someone.tmi.twitch.tv PRIVMSG #chan :hello";
        let ChatEvent::Message(message) = parse_irc_line(line, "clippybot").unwrap() else {
            panic!("expected a message");
        };
        assert!(message.user.is_none());
    }

    #[test]
    fn test_own_join_is_reported() {
        let line = ":clippybot!clippybot@clippybot.tmi.twitch.tv JOIN #the_ivo_robotnic";
        match parse_irc_line(line, "ClippyBot") {
            Some(ChatEvent::Joined { channel, user_name }) => {
                assert_eq!(channel, "the_ivo_robotnic");
                assert_eq!(user_name, "clippybot");
            }
            other => panic!("unexpected event: {:?}", other),
        }

        let other_join = ":viewer!viewer@viewer.tmi.twitch.tv JOIN #the_ivo_robotnic";
        assert!(parse_irc_line(other_join, "clippybot").is_none());
    }

    #[test]
    fn test_frame_with_several_lines() {
        let frame = format!(
            ":tmi.twitch.tv 001 clippybot :Welcome, GLHF!\r\n{}\r\n:clippybot!clippybot@clippybot.tmi.twitch.tv JOIN #x\r\n",
            PRIVMSG
        );
        let parsed = parse_twitch_frame(&frame, "clippybot");
        assert_eq!(parsed.events.len(), 2);
        assert!(matches!(parsed.events[0], ChatEvent::Message(_)));
        assert!(matches!(parsed.events[1], ChatEvent::Joined { .. }));
        assert!(parsed.pings.is_empty());
    }

    #[test]
    fn test_ping_after_chat_line_is_answered() {
        let frame = format!("{}\r\nPING :tmi.twitch.tv\r\n", PRIVMSG);
        let parsed = parse_twitch_frame(&frame, "clippybot");
        assert_eq!(parsed.events.len(), 1);
        assert_eq!(parsed.pings, vec![":tmi.twitch.tv".to_string()]);
    }

    #[test]
    fn test_ping_first_does_not_swallow_following_lines() {
        let frame = format!("PING :tmi.twitch.tv\r\n{}\r\n", PRIVMSG);
        let parsed = parse_twitch_frame(&frame, "clippybot");
        assert_eq!(parsed.pings, vec![":tmi.twitch.tv".to_string()]);
        assert_eq!(parsed.events.len(), 1);
        assert!(matches!(parsed.events[0], ChatEvent::Message(_)));
    }

    #[test]
    fn test_tag_unescaping() {
        assert_eq!(unescape_tag_value("a\\sb\\:c\\\\d"), "a b;c\\d");
    }

    #[test]
    fn test_config_validation() {
        let config = TwitchConfig::new("ClippyBot".into(), "oauth:abc".into(), "#The_Ivo_Robotnic".into(), None).unwrap();
        assert_eq!(config.channel, "the_ivo_robotnic");
        assert_eq!(config.username, "clippybot");

        assert!(TwitchConfig::new("bot".into(), "abc".into(), "chan".into(), None).is_err());
        assert!(TwitchConfig::new("bot".into(), "oauth:abc".into(), " ".into(), None).is_err());
    }
}
