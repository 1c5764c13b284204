// src/bot/rules.rs - Compiled, read-only rule tables shared by every event

use std::collections::HashSet;

use crate::bot::commands::{CommandRule, CommandSystem};
use crate::bot::replacements::{ReplacementPipeline, ReplacementRule};
use crate::bot::responses::{ResponsePipeline, ResponseRule};
use crate::types::DuplicateMode;

/// Channels and users the bot ignores entirely
#[derive(Debug, Clone, Default)]
pub struct ExclusionSet {
    pub channels: HashSet<String>,
    pub users: HashSet<String>,
}

impl ExclusionSet {
    pub fn is_channel_excluded(&self, channel_id: &str) -> bool {
        self.channels.contains(channel_id)
    }

    pub fn is_user_excluded(&self, user_id: &str) -> bool {
        self.users.contains(user_id)
    }
}

/// Everything loaded from configuration, built once at startup
pub struct RuleSet {
    pub duplicate_mode: DuplicateMode,
    pub commands: CommandSystem,
    pub replacements: ReplacementPipeline,
    pub responses: ResponsePipeline,
    pub exclusions: ExclusionSet,
}

impl RuleSet {
    pub fn new(
        duplicate_mode: DuplicateMode,
        commands: Vec<CommandRule>,
        replacements: Vec<ReplacementRule>,
        responses: Vec<ResponseRule>,
        exclusions: ExclusionSet,
    ) -> Self {
        Self {
            duplicate_mode,
            commands: CommandSystem::new(commands),
            replacements: ReplacementPipeline::new(replacements),
            responses: ResponsePipeline::new(responses),
            exclusions,
        }
    }

    /// No rules and no exclusions; duplicate detection still runs
    pub fn empty() -> Self {
        Self::new(DuplicateMode::default(), Vec::new(), Vec::new(), Vec::new(), ExclusionSet::default())
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::empty()
    }
}
