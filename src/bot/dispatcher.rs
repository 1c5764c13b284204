// src/bot/dispatcher.rs - Per-message orchestration: exclusions, escalation, rules

use log::{debug, error, warn};
use std::sync::Arc;

use crate::bot::classifier::normalize;
use crate::bot::deferred::DeferredReply;
use crate::bot::escalation::apply_action;
use crate::bot::history::count_repeats;
use crate::bot::rules::RuleSet;
use crate::platforms::ChatTransport;
use crate::types::{ChatMessage, EscalationAction};

/// Why a message was ignored before any side effect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    SelfAuthored,
    EmptyContent,
    ExcludedChannel,
    ExcludedUser,
}

/// What happened while handling one message
#[derive(Debug)]
pub struct DispatchReport {
    pub skipped: Option<SkipReason>,
    /// `None` when skipped or when history could not be fetched
    pub issue_count: Option<usize>,
    pub action: EscalationAction,
    pub action_applied: bool,
    pub edited: bool,
    pub replies_sent: usize,
    pub deferred: Vec<DeferredReply>,
}

impl DispatchReport {
    fn skipped(reason: SkipReason) -> Self {
        Self {
            skipped: Some(reason),
            ..Self::default()
        }
    }
}

impl Default for DispatchReport {
    fn default() -> Self {
        Self {
            skipped: None,
            issue_count: None,
            action: EscalationAction::None,
            action_applied: false,
            edited: false,
            replies_sent: 0,
            deferred: Vec::new(),
        }
    }
}

/// Runs the escalation flow and the rule flow for every incoming message.
///
/// Holds the immutable rule tables and the transport; nothing else is shared
/// between events.
#[derive(Clone)]
pub struct MessageDispatcher {
    rules: Arc<RuleSet>,
    transport: Arc<dyn ChatTransport>,
}

impl MessageDispatcher {
    pub fn new(rules: Arc<RuleSet>, transport: Arc<dyn ChatTransport>) -> Self {
        Self { rules, transport }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// First matching exclusion, checked in order: own message, empty, channel, user
    pub fn exclusion_reason(&self, message: &ChatMessage) -> Option<SkipReason> {
        if self.transport.bot_user_id().as_deref() == Some(message.author_id.as_str()) {
            return Some(SkipReason::SelfAuthored);
        }
        if message.content.is_empty() {
            return Some(SkipReason::EmptyContent);
        }
        if self.rules.exclusions.is_channel_excluded(&message.channel_id) {
            return Some(SkipReason::ExcludedChannel);
        }
        if self.rules.exclusions.is_user_excluded(&message.author_id) {
            return Some(SkipReason::ExcludedUser);
        }
        None
    }

    /// Handle one message end to end. Transport failures are logged and never
    /// stop the other flow.
    pub async fn handle_message(&self, message: &ChatMessage) -> DispatchReport {
        if let Some(reason) = self.exclusion_reason(message) {
            debug!("Skipping message {} in {}: {:?}", message.id, message.channel_id, reason);
            return DispatchReport::skipped(reason);
        }

        let mut report = DispatchReport::default();
        self.run_escalation(message, &mut report).await;
        self.run_rules(message, &mut report).await;
        report
    }

    async fn run_escalation(&self, message: &ChatMessage, report: &mut DispatchReport) {
        let count = match count_repeats(self.transport.as_ref(), message, self.rules.duplicate_mode).await {
            Ok(count) => count,
            Err(e) => {
                error!("Skipping repeat check for message {}: {:#}", message.id, e);
                return;
            }
        };

        let action = EscalationAction::for_count(count);
        report.issue_count = Some(count);
        report.action = action;

        if action == EscalationAction::None {
            return;
        }
        warn!(
            "Message {} from {} repeats {} recent messages, escalating to {:?}",
            message.id, message.author_id, count, action
        );
        match apply_action(self.transport.as_ref(), action, message).await {
            Ok(()) => report.action_applied = true,
            Err(e) => error!("Failed to perform {:?} on message {}: {:#}", action, message.id, e),
        }
    }

    async fn run_rules(&self, message: &ChatMessage, report: &mut DispatchReport) {
        let normalized = normalize(&message.content);

        let commands = self.rules.commands.process_message(&self.transport, message, &normalized).await;
        report.replies_sent += commands.sent;
        report.deferred = commands.deferred;

        report.edited = self.rules.replacements.process_message(self.transport.as_ref(), message).await;

        report.replies_sent += self.rules.responses.process_message(self.transport.as_ref(), message).await;
    }
}
