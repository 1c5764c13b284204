// In-memory transport that records every call, for tests

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::platforms::ChatTransport;
use crate::types::{ChatMessage, MessageId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Send { channel_id: String, text: String },
    Edit { channel_id: String, message_id: String, text: String },
    Delete { channel_id: String, message_id: String },
    React { channel_id: String, message_id: String, emoji: String },
    Typing { channel_id: String },
}

#[derive(Default)]
struct State {
    history: Vec<ChatMessage>,
    calls: Vec<TransportCall>,
    failing: HashSet<&'static str>,
    attempts: HashMap<&'static str, usize>,
    next_id: u64,
}

pub struct RecordingTransport {
    bot_user_id: String,
    state: Mutex<State>,
}

impl RecordingTransport {
    pub fn new(bot_user_id: &str) -> Self {
        Self {
            bot_user_id: bot_user_id.to_string(),
            state: Mutex::new(State::default()),
        }
    }

    /// Append a message to channel history, oldest first
    pub fn push_history(&self, message: ChatMessage) {
        self.state.lock().unwrap().history.push(message);
    }

    /// Make every call of `operation` fail: fetch, send, edit, delete, react, typing
    pub fn fail_on(&self, operation: &'static str) {
        self.state.lock().unwrap().failing.insert(operation);
    }

    /// Successful side-effecting calls in order
    pub fn calls(&self) -> Vec<TransportCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::Send { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Attempts of `operation`, successful or not
    pub fn attempts(&self, operation: &'static str) -> usize {
        self.state.lock().unwrap().attempts.get(operation).copied().unwrap_or(0)
    }

    fn attempt(&self, operation: &'static str, call: Option<TransportCall>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        *state.attempts.entry(operation).or_insert(0) += 1;
        if state.failing.contains(operation) {
            return Err(anyhow!("{} rejected by test transport", operation));
        }
        if let Some(call) = call {
            state.calls.push(call);
        }
        Ok(())
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn fetch_recent_messages(
        &self,
        channel_id: &str,
        limit: usize,
        before_message_id: &str,
    ) -> Result<Vec<ChatMessage>> {
        self.attempt("fetch", None)?;
        let state = self.state.lock().unwrap();
        let end = state
            .history
            .iter()
            .position(|m| m.id == before_message_id)
            .unwrap_or(state.history.len());
        Ok(state.history[..end]
            .iter()
            .rev()
            .filter(|m| m.channel_id == channel_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn send_message(&self, channel_id: &str, text: &str) -> Result<MessageId> {
        self.attempt("send", Some(TransportCall::Send {
            channel_id: channel_id.to_string(),
            text: text.to_string(),
        }))?;
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        Ok(format!("sent-{}", state.next_id))
    }

    async fn edit_message(&self, channel_id: &str, message_id: &str, text: &str) -> Result<()> {
        self.attempt("edit", Some(TransportCall::Edit {
            channel_id: channel_id.to_string(),
            message_id: message_id.to_string(),
            text: text.to_string(),
        }))
    }

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<()> {
        self.attempt("delete", Some(TransportCall::Delete {
            channel_id: channel_id.to_string(),
            message_id: message_id.to_string(),
        }))
    }

    async fn add_reaction(&self, channel_id: &str, message_id: &str, emoji: &str) -> Result<()> {
        self.attempt("react", Some(TransportCall::React {
            channel_id: channel_id.to_string(),
            message_id: message_id.to_string(),
            emoji: emoji.to_string(),
        }))
    }

    async fn send_typing(&self, channel_id: &str) -> Result<()> {
        self.attempt("typing", Some(TransportCall::Typing {
            channel_id: channel_id.to_string(),
        }))
    }

    fn bot_user_id(&self) -> Option<String> {
        Some(self.bot_user_id.clone())
    }
}
