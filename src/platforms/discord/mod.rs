use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::SinkExt;
use log::{debug, info};
use serde::Deserialize;
use serde_json::json;
use std::env;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio_tungstenite::tungstenite::Message;

use crate::platforms::{ChatTransport, PlatformConnection};
use crate::types::{ChatMessage, MessageId};

mod gateway;

use gateway::{Gateway, SharedWriter};

const API_BASE: &str = "https://discord.com/api/v10";

#[derive(Debug, Deserialize)]
struct DiscordUser {
    id: String,
}

/// Message object as returned by REST and MESSAGE_CREATE
#[derive(Debug, Deserialize)]
struct DiscordMessage {
    id: String,
    channel_id: String,
    author: DiscordUser,
    #[serde(default)]
    content: String,
    timestamp: chrono::DateTime<chrono::Utc>,
}

impl DiscordMessage {
    /// Parse a MESSAGE_CREATE dispatch into our standard message type
    fn parse_event(data: serde_json::Value) -> Option<ChatMessage> {
        match serde_json::from_value::<DiscordMessage>(data) {
            Ok(message) => Some(message.into()),
            Err(e) => {
                debug!("Ignoring unparseable MESSAGE_CREATE: {}", e);
                None
            }
        }
    }
}

impl From<DiscordMessage> for ChatMessage {
    fn from(message: DiscordMessage) -> Self {
        ChatMessage {
            id: message.id,
            channel_id: message.channel_id,
            author_id: message.author.id,
            content: message.content,
            timestamp: message.timestamp,
        }
    }
}

/// Configuration for the Discord connection
#[derive(Debug, Clone)]
pub struct DiscordConfig {
    pub bot_token: String,
}

impl DiscordConfig {
    /// Load Discord configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let token = env::var("DISCORD_BOT_TOKEN")
            .context("DISCORD_BOT_TOKEN environment variable not set")?;
        let token = token.trim();
        let token = token.strip_prefix("Bot ").unwrap_or(token).to_string();

        if token.is_empty() {
            return Err(anyhow::anyhow!("DISCORD_BOT_TOKEN is empty"));
        }

        Ok(Self { bot_token: token })
    }
}

/// Discord gateway + REST connection.
///
/// The gateway task owns the only broadcast sender, so receivers see `Closed`
/// once it gives up. This struct keeps a receiver to hand out subscriptions.
pub struct DiscordConnection {
    config: DiscordConfig,
    http_client: reqwest::Client,
    bot_user_id: Option<String>,
    message_receiver: Option<broadcast::Receiver<ChatMessage>>,
    websocket_writer: SharedWriter,
    is_connected: Arc<RwLock<bool>>,
    shutdown_requested: Arc<RwLock<bool>>,
}

impl DiscordConnection {
    pub fn new(config: DiscordConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
            bot_user_id: None,
            message_receiver: None,
            websocket_writer: Arc::new(RwLock::new(None)),
            is_connected: Arc::new(RwLock::new(false)),
            shutdown_requested: Arc::new(RwLock::new(false)),
        }
    }

    fn authorization(&self) -> String {
        format!("Bot {}", self.config.bot_token)
    }

    fn channel_url(channel_id: &str, rest: &str) -> String {
        format!("{}/channels/{}{}", API_BASE, channel_id, rest)
    }

    /// Turn a non-2xx response into an error carrying the body
    async fn check(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            Err(anyhow::anyhow!("Discord {} failed with {}: {}", what, status, error_text))
        }
    }

    async fn fetch_current_user(&self) -> Result<DiscordUser> {
        let response = self.http_client
            .get(format!("{}/users/@me", API_BASE))
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .send()
            .await
            .context("Failed to query Discord bot user")?;

        Self::check(response, "current user lookup")
            .await?
            .json()
            .await
            .context("Invalid Discord user payload")
    }
}

#[async_trait]
impl ChatTransport for DiscordConnection {
    async fn fetch_recent_messages(
        &self,
        channel_id: &str,
        limit: usize,
        before_message_id: &str,
    ) -> Result<Vec<ChatMessage>> {
        let response = self.http_client
            .get(Self::channel_url(channel_id, "/messages"))
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .query(&[("limit", limit.to_string()), ("before", before_message_id.to_string())])
            .send()
            .await
            .context("Failed to fetch Discord channel messages")?;

        let messages: Vec<DiscordMessage> = Self::check(response, "message history")
            .await?
            .json()
            .await
            .context("Invalid Discord message history payload")?;

        Ok(messages.into_iter().map(ChatMessage::from).collect())
    }

    async fn send_message(&self, channel_id: &str, text: &str) -> Result<MessageId> {
        let response = self.http_client
            .post(Self::channel_url(channel_id, "/messages"))
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .json(&json!({ "content": text }))
            .send()
            .await
            .context("Failed to send Discord message")?;

        let sent: DiscordMessage = Self::check(response, "send message")
            .await?
            .json()
            .await
            .context("Invalid Discord message payload")?;

        debug!("Sent message {} to {}: {}", sent.id, channel_id, text);
        Ok(sent.id)
    }

    async fn edit_message(&self, channel_id: &str, message_id: &str, text: &str) -> Result<()> {
        let response = self.http_client
            .patch(Self::channel_url(channel_id, &format!("/messages/{}", message_id)))
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .json(&json!({ "content": text }))
            .send()
            .await
            .context("Failed to edit Discord message")?;

        Self::check(response, "edit message").await?;
        Ok(())
    }

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<()> {
        let response = self.http_client
            .delete(Self::channel_url(channel_id, &format!("/messages/{}", message_id)))
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .send()
            .await
            .context("Failed to delete Discord message")?;

        Self::check(response, "delete message").await?;
        Ok(())
    }

    async fn add_reaction(&self, channel_id: &str, message_id: &str, emoji: &str) -> Result<()> {
        let path = format!("/messages/{}/reactions/{}/@me", message_id, urlencoding::encode(emoji));
        let response = self.http_client
            .put(Self::channel_url(channel_id, &path))
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .header(reqwest::header::CONTENT_LENGTH, 0)
            .send()
            .await
            .context("Failed to add Discord reaction")?;

        Self::check(response, "add reaction").await?;
        Ok(())
    }

    async fn send_typing(&self, channel_id: &str) -> Result<()> {
        let response = self.http_client
            .post(Self::channel_url(channel_id, "/typing"))
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .header(reqwest::header::CONTENT_LENGTH, 0)
            .send()
            .await
            .context("Failed to trigger Discord typing indicator")?;

        Self::check(response, "typing indicator").await?;
        Ok(())
    }

    fn bot_user_id(&self) -> Option<String> {
        self.bot_user_id.clone()
    }
}

#[async_trait]
impl PlatformConnection for DiscordConnection {
    async fn connect(&mut self) -> Result<()> {
        info!("Connecting to Discord...");

        let me = self.fetch_current_user().await?;
        info!("Authenticated as Discord user {}", me.id);
        self.bot_user_id = Some(me.id);

        *self.shutdown_requested.write().await = false;

        // Set up message broadcasting
        let (tx, rx) = broadcast::channel(1000);
        self.message_receiver = Some(rx);

        let gateway = Gateway::new(
            self.config.bot_token.clone(),
            tx,
            Arc::clone(&self.websocket_writer),
            Arc::clone(&self.is_connected),
            Arc::clone(&self.shutdown_requested),
        );

        let (reader, heartbeat) = gateway.open(false).await?;
        tokio::spawn(gateway.run(reader, heartbeat));

        info!("Successfully connected to Discord gateway");
        Ok(())
    }

    fn platform_name(&self) -> &str {
        "discord"
    }

    async fn is_connected(&self) -> bool {
        *self.is_connected.read().await
    }

    fn get_message_receiver(&self) -> Option<broadcast::Receiver<ChatMessage>> {
        self.message_receiver.as_ref().map(|receiver| receiver.resubscribe())
    }

    async fn disconnect(&self) -> Result<()> {
        *self.shutdown_requested.write().await = true;
        *self.is_connected.write().await = false;
        if let Some(sink) = self.websocket_writer.write().await.as_mut() {
            if let Err(e) = sink.send(Message::Close(None)).await {
                debug!("Gateway already closed: {}", e);
            }
        }
        info!("Disconnected from Discord");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_message_create() {
        let data = json!({
            "id": "1001",
            "channel_id": "42",
            "author": {"id": "7", "username": "alice"},
            "content": "hello",
            "timestamp": "2024-03-01T12:00:00.000000+00:00",
            "tts": false
        });

        let message = DiscordMessage::parse_event(data).unwrap();
        assert_eq!(message.id, "1001");
        assert_eq!(message.channel_id, "42");
        assert_eq!(message.author_id, "7");
        assert_eq!(message.content, "hello");
    }

    #[test]
    fn test_attachment_only_message_has_empty_content() {
        let data = json!({
            "id": "1002",
            "channel_id": "42",
            "author": {"id": "8", "bot": true},
            "timestamp": "2024-03-01T12:00:00+00:00",
            "attachments": [{"id": "5"}]
        });

        let message = DiscordMessage::parse_event(data).unwrap();
        assert!(message.content.is_empty());
        assert_eq!(message.author_id, "8");
    }

    #[test]
    fn test_malformed_dispatch_is_ignored() {
        assert!(DiscordMessage::parse_event(json!({"id": "1"})).is_none());
    }

    #[test]
    fn test_history_payload() {
        let body = r#"[
            {"id": "3", "channel_id": "42", "author": {"id": "7"}, "content": "b", "timestamp": "2024-03-01T12:00:02+00:00"},
            {"id": "2", "channel_id": "42", "author": {"id": "7"}, "content": "a", "timestamp": "2024-03-01T12:00:01+00:00"}
        ]"#;
        let messages: Vec<DiscordMessage> = serde_json::from_str(body).unwrap();
        let messages: Vec<ChatMessage> = messages.into_iter().map(ChatMessage::from).collect();
        assert_eq!(messages.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(), vec!["3", "2"]);
    }

    #[test]
    fn test_receiver_is_available_only_after_connect() {
        let connection = DiscordConnection::new(DiscordConfig { bot_token: "t".to_string() });
        assert!(connection.get_message_receiver().is_none());
        assert_eq!(connection.platform_name(), "discord");
    }
}
