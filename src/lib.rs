//! # chatwarden
//!
//! A Discord moderation bot that discourages repeated messages and runs
//! configurable command, replacement and auto-response rules.
//!
//! ## Features
//!
//! - **Repetition escalation**: the last three messages in a channel are compared
//!   with each new one; repeats earn a 😞, then a 😡, then a deletion
//! - **Numeric equivalence**: optionally treat every number-like message as the same
//! - **Commands**: exact, substring or regex triggers with `$n` submatch templates
//!   and an optional typing indicator
//! - **Replacements and auto-responses**: ordered rewrite rules and trigger/reply pairs
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chatwarden::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let rules = load_rules(&config_path_from_env()).await?;
//!     let mut bot = ChatBot::new(Arc::new(rules));
//!
//!     let config = DiscordConfig::from_env()?;
//!     bot.add_connection(Box::new(DiscordConnection::new(config)));
//!
//!     bot.start().await?;
//!     tokio::signal::ctrl_c().await?;
//!     bot.shutdown().await
//! }
//! ```

pub mod types;
pub mod platforms;
pub mod bot;
pub mod config;

// Re-export commonly used items
pub mod prelude {
    pub use crate::bot::ChatBot;
    pub use crate::bot::dispatcher::{DispatchReport, MessageDispatcher, SkipReason};
    pub use crate::bot::rules::{ExclusionSet, RuleSet};
    pub use crate::config::{config_path_from_env, load_rules, BotConfiguration, ConfigError};
    pub use crate::platforms::{
        ChatTransport,
        PlatformConnection,
        discord::{DiscordConnection, DiscordConfig},
    };
    pub use crate::types::{ChatMessage, DuplicateMode, EscalationAction, MatchMode};
    pub use anyhow::Result;
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
