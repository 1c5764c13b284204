// src/bot/escalation.rs - Repeat count to moderation action

use anyhow::Result;
use log::info;

use crate::platforms::ChatTransport;
use crate::types::{ChatMessage, EscalationAction};

pub const DISAPPOINTED_EMOJI: &str = "😞";
pub const ANGRY_EMOJI: &str = "😡";

impl EscalationAction {
    /// Monotone step function: reactions first, deletion once the window is full of repeats
    pub fn for_count(issue_count: usize) -> Self {
        match issue_count {
            0 => EscalationAction::None,
            1 => EscalationAction::ReactDisappointed,
            2 => EscalationAction::ReactAngry,
            _ => EscalationAction::DeleteMessage,
        }
    }

    pub fn reaction(&self) -> Option<&'static str> {
        match self {
            EscalationAction::ReactDisappointed => Some(DISAPPOINTED_EMOJI),
            EscalationAction::ReactAngry => Some(ANGRY_EMOJI),
            _ => None,
        }
    }
}

/// Carry out `action` on `message`. Makes at most one transport call.
pub async fn apply_action(
    transport: &dyn ChatTransport,
    action: EscalationAction,
    message: &ChatMessage,
) -> Result<()> {
    match action {
        EscalationAction::None => {}
        EscalationAction::ReactDisappointed | EscalationAction::ReactAngry => {
            let emoji = action.reaction().unwrap_or(DISAPPOINTED_EMOJI);
            transport.add_reaction(&message.channel_id, &message.id, emoji).await?;
            info!("Reacted {} to repeated message {} from {}", emoji, message.id, message.author_id);
        }
        EscalationAction::DeleteMessage => {
            transport.delete_message(&message.channel_id, &message.id).await?;
            info!("Deleted repeated message {} from {} in {}", message.id, message.author_id, message.channel_id);
        }
    }
    Ok(())
}
