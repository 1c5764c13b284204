// src/bot/replacements.rs - Ordered text substitution pipeline

use log::{error, info};
use regex::Regex;

use crate::platforms::ChatTransport;
use crate::types::ChatMessage;

#[derive(Debug, Clone)]
pub enum ReplacementPattern {
    Literal(String),
    Regex(Regex),
}

/// A single substitution. Regex targets may use `$1` / `${name}` back-references.
#[derive(Debug, Clone)]
pub struct ReplacementRule {
    pub from: ReplacementPattern,
    pub to: String,
}

impl ReplacementRule {
    pub fn literal(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: ReplacementPattern::Literal(from.into()),
            to: to.into(),
        }
    }

    pub fn regex(from: &str, to: impl Into<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            from: ReplacementPattern::Regex(Regex::new(from)?),
            to: to.into(),
        })
    }

    /// Replace every occurrence in `text`
    pub fn apply(&self, text: &str) -> String {
        match &self.from {
            ReplacementPattern::Literal(from) => text.replace(from.as_str(), &self.to),
            ReplacementPattern::Regex(pattern) => pattern.replace_all(text, self.to.as_str()).into_owned(),
        }
    }
}

/// Rules applied in declared order, each one seeing the previous one's output
pub struct ReplacementPipeline {
    rules: Vec<ReplacementRule>,
}

impl ReplacementPipeline {
    pub fn new(rules: Vec<ReplacementRule>) -> Self {
        Self { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rewrite(&self, text: &str) -> String {
        self.rules
            .iter()
            .fold(text.to_string(), |current, rule| rule.apply(&current))
    }

    /// The rewritten text, only when it differs from the input
    pub fn rewrite_if_changed(&self, text: &str) -> Option<String> {
        let rewritten = self.rewrite(text);
        (rewritten != text).then_some(rewritten)
    }

    /// Edit the message once if the pipeline changes it. Returns whether the edit went through.
    pub async fn process_message(&self, transport: &dyn ChatTransport, message: &ChatMessage) -> bool {
        let Some(rewritten) = self.rewrite_if_changed(&message.content) else {
            return false;
        };

        match transport.edit_message(&message.channel_id, &message.id, &rewritten).await {
            Ok(()) => {
                info!("Rewrote message {} in {}", message.id, message.channel_id);
                true
            }
            Err(e) => {
                error!("Failed to edit message {} in {}: {}", message.id, message.channel_id, e);
                false
            }
        }
    }
}
