// src/bot/responses.rs - Trigger/reply rules evaluated against the original text

use log::{error, info};
use regex::Regex;

use crate::platforms::ChatTransport;
use crate::types::ChatMessage;

#[derive(Debug, Clone)]
pub enum ResponseTrigger {
    Substring(String),
    Regex(Regex),
}

impl ResponseTrigger {
    pub fn matches(&self, text: &str) -> bool {
        match self {
            ResponseTrigger::Substring(needle) => text.contains(needle.as_str()),
            ResponseTrigger::Regex(pattern) => pattern.is_match(text),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResponseRule {
    pub trigger: ResponseTrigger,
    pub reply: String,
}

impl ResponseRule {
    pub fn substring(trigger: impl Into<String>, reply: impl Into<String>) -> Self {
        Self {
            trigger: ResponseTrigger::Substring(trigger.into()),
            reply: reply.into(),
        }
    }

    pub fn regex(trigger: &str, reply: impl Into<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            trigger: ResponseTrigger::Regex(Regex::new(trigger)?),
            reply: reply.into(),
        })
    }
}

pub struct ResponsePipeline {
    rules: Vec<ResponseRule>,
}

impl ResponsePipeline {
    pub fn new(rules: Vec<ResponseRule>) -> Self {
        Self { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Replies of every matching rule, duplicates included
    pub fn matching_replies<'a>(&'a self, raw: &str) -> Vec<&'a str> {
        self.rules
            .iter()
            .filter(|rule| rule.trigger.matches(raw))
            .map(|rule| rule.reply.as_str())
            .collect()
    }

    /// Send each matching reply as a new message. Returns how many were sent.
    pub async fn process_message(&self, transport: &dyn ChatTransport, message: &ChatMessage) -> usize {
        let mut sent = 0;
        for reply in self.matching_replies(&message.content) {
            match transport.send_message(&message.channel_id, reply).await {
                Ok(_) => {
                    info!("Auto-responded in {} to message {}", message.channel_id, message.id);
                    sent += 1;
                }
                Err(e) => error!("Failed to send auto-response to {}: {}", message.channel_id, e),
            }
        }
        sent
    }
}
