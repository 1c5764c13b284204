// src/types/mod.rs - Core message and moderation types

use serde::{Deserialize, Serialize};

/// Platform-assigned message identifier
pub type MessageId = String;

/// Core message type that flows through the bot system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub channel_id: String,
    pub author_id: String,
    pub content: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ChatMessage {
    pub fn new(id: impl Into<String>, channel_id: impl Into<String>, author_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            channel_id: channel_id.into(),
            author_id: author_id.into(),
            content: content.into(),
            timestamp: chrono::Utc::now(),
        }
    }
}

/// How messages are grouped when looking for repeats
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateMode {
    /// Only identical normalized text counts as a repeat
    #[default]
    Literal,
    /// Any two numeral-like messages also count as repeats of each other
    Numeric,
}

/// Category used to decide whether two messages "count as the same"
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EquivalenceClass {
    Literal(String),
    Numeric,
}

/// Moderation actions, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EscalationAction {
    None,
    ReactDisappointed,
    ReactAngry,
    DeleteMessage,
}

/// How a command trigger is compared against a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Normalized text equals the trigger
    Exact,
    /// Normalized text contains the trigger
    Contains,
    /// Trigger is a regex run against the raw text; `$n` in the response expands to submatches
    RegexSubmatch,
}

impl MatchMode {
    /// Map the config file's boolean flags to a mode. `regexp` wins over `contains`.
    pub fn from_flags(regexp: bool, contains: bool) -> Self {
        if regexp {
            MatchMode::RegexSubmatch
        } else if contains {
            MatchMode::Contains
        } else {
            MatchMode::Exact
        }
    }
}
