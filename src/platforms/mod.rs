use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::types::{ChatMessage, MessageId};

pub mod discord;

#[cfg(test)]
pub(crate) mod mock;

/// Channel operations the moderation core needs from a chat platform
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Up to `limit` messages strictly before `before_message_id` in the channel, newest first
    async fn fetch_recent_messages(
        &self,
        channel_id: &str,
        limit: usize,
        before_message_id: &str,
    ) -> Result<Vec<ChatMessage>>;

    /// Send a message to the specified channel
    async fn send_message(&self, channel_id: &str, text: &str) -> Result<MessageId>;

    async fn edit_message(&self, channel_id: &str, message_id: &str, text: &str) -> Result<()>;

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<()>;

    /// Add a unicode emoji reaction to a message
    async fn add_reaction(&self, channel_id: &str, message_id: &str, emoji: &str) -> Result<()>;

    /// Show the "bot is typing" indicator in a channel
    async fn send_typing(&self, channel_id: &str) -> Result<()>;

    /// The bot's own user id, once known
    fn bot_user_id(&self) -> Option<String>;
}

/// Trait defining the lifecycle all platform connections must implement
#[async_trait]
pub trait PlatformConnection: ChatTransport {
    /// Connect to the platform and start receiving messages
    async fn connect(&mut self) -> Result<()>;

    /// Get the platform identifier (e.g., "discord")
    fn platform_name(&self) -> &str;

    /// Check if the connection is healthy
    async fn is_connected(&self) -> bool;

    /// Get a receiver for incoming messages
    fn get_message_receiver(&self) -> Option<broadcast::Receiver<ChatMessage>>;

    /// Gracefully disconnect
    async fn disconnect(&self) -> Result<()>;
}
