use log::{debug, error, info};
use regex::{Captures, Regex};
use std::sync::{Arc, LazyLock};

use crate::bot::deferred::{schedule_reply, DeferredReply, TYPING_DELAY};
use crate::platforms::ChatTransport;
use crate::types::{ChatMessage, MatchMode};

/// `$` followed by a group index in a response template
static SUBMATCH_REFERENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$(\d+)").unwrap());

/// A trigger/response pair from the command table
#[derive(Debug, Clone)]
pub struct CommandRule {
    pub trigger: String,
    pub response: String,
    pub mode: MatchMode,
    pub show_typing: bool,
    pattern: Option<Regex>,
}

impl CommandRule {
    /// Build a rule, compiling the trigger once when it is a regex
    pub fn new(
        trigger: impl Into<String>,
        response: impl Into<String>,
        mode: MatchMode,
        show_typing: bool,
    ) -> Result<Self, regex::Error> {
        let trigger = trigger.into();
        let pattern = match mode {
            MatchMode::RegexSubmatch => Some(Regex::new(&trigger)?),
            MatchMode::Exact | MatchMode::Contains => None,
        };

        Ok(Self {
            trigger,
            response: response.into(),
            mode,
            show_typing,
            pattern,
        })
    }

    /// Response for this message, if the rule matches.
    /// Literal modes compare against the normalized text, regex mode against the raw text.
    pub fn render(&self, raw: &str, normalized: &str) -> Option<String> {
        match self.mode {
            MatchMode::Exact => (normalized == self.trigger).then(|| self.response.clone()),
            MatchMode::Contains => normalized.contains(&self.trigger).then(|| self.response.clone()),
            MatchMode::RegexSubmatch => {
                let captures = self.pattern.as_ref()?.captures(raw)?;
                Some(expand_submatches(&self.response, &captures))
            }
        }
    }
}

/// Replace `$0` with the whole match and `$1..$n` with capture groups.
/// A group that did not participate expands to nothing; an index past the
/// last group is left as written.
pub fn expand_submatches(template: &str, captures: &Captures) -> String {
    SUBMATCH_REFERENCE
        .replace_all(template, |reference: &Captures| {
            match reference[1].parse::<usize>() {
                Ok(index) if index < captures.len() => captures
                    .get(index)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default(),
                _ => reference[0].to_string(),
            }
        })
        .into_owned()
}

/// What the command table did for one message
#[derive(Debug, Default)]
pub struct CommandOutcome {
    pub sent: usize,
    pub deferred: Vec<DeferredReply>,
}

pub struct CommandSystem {
    commands: Vec<CommandRule>,
}

impl CommandSystem {
    pub fn new(commands: Vec<CommandRule>) -> Self {
        Self { commands }
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Every rule that fires for this message, with its rendered response.
    /// Empty responses are dropped.
    pub fn matching_responses<'a>(&'a self, raw: &str, normalized: &str) -> Vec<(&'a CommandRule, String)> {
        self.commands
            .iter()
            .filter_map(|command| {
                command
                    .render(raw, normalized)
                    .filter(|response| !response.is_empty())
                    .map(|response| (command, response))
            })
            .collect()
    }

    /// Send responses for every matching command. Typing commands are
    /// scheduled as deferred replies and only if the typing indicator went through.
    pub async fn process_message(
        &self,
        transport: &Arc<dyn ChatTransport>,
        message: &ChatMessage,
        normalized: &str,
    ) -> CommandOutcome {
        let mut outcome = CommandOutcome::default();

        for (command, response) in self.matching_responses(&message.content, normalized) {
            debug!("Command '{}' matched message {} in {}", command.trigger, message.id, message.channel_id);

            if command.show_typing {
                if let Err(e) = transport.send_typing(&message.channel_id).await {
                    error!("Failed to send typing indicator to {}: {}", message.channel_id, e);
                    continue;
                }
                outcome.deferred.push(schedule_reply(
                    Arc::clone(transport),
                    message.channel_id.clone(),
                    response,
                    TYPING_DELAY,
                ));
            } else {
                match transport.send_message(&message.channel_id, &response).await {
                    Ok(_) => {
                        info!("Executed command '{}' in {}", command.trigger, message.channel_id);
                        outcome.sent += 1;
                    }
                    Err(e) => error!("Failed to send command response to {}: {}", message.channel_id, e),
                }
            }
        }

        outcome
    }
}
