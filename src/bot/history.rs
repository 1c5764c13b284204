// src/bot/history.rs - Trailing-window repeat counting

use anyhow::{Context, Result};
use log::debug;

use crate::bot::classifier::{classify, Classified};
use crate::platforms::ChatTransport;
use crate::types::{ChatMessage, DuplicateMode};

/// Number of messages before the current one that are compared against it
pub const HISTORY_WINDOW: usize = 3;

/// Count how many of `prior` are equivalent to `current`.
/// Order does not matter and every equivalent message counts on its own.
pub fn issue_count(current: &Classified, prior: &[ChatMessage], mode: DuplicateMode) -> usize {
    prior
        .iter()
        .filter(|message| current.is_equivalent(&classify(&message.content, mode)))
        .count()
}

/// Fetch the window preceding `message` and count repeats of it
pub async fn count_repeats(
    transport: &dyn ChatTransport,
    message: &ChatMessage,
    mode: DuplicateMode,
) -> Result<usize> {
    let prior = transport
        .fetch_recent_messages(&message.channel_id, HISTORY_WINDOW, &message.id)
        .await
        .context("Failed to fetch recent channel history")?;

    let current = classify(&message.content, mode);
    let count = issue_count(&current, &prior, mode);

    debug!(
        "Message {} in {} repeats {} of the last {} messages",
        message.id, message.channel_id, count, prior.len()
    );
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::mock::RecordingTransport;

    fn history(contents: &[&str]) -> Vec<ChatMessage> {
        contents
            .iter()
            .enumerate()
            .map(|(i, content)| ChatMessage::new(format!("m{}", i), "chan", "user", *content))
            .collect()
    }

    #[test]
    fn test_counts_literal_repeats() {
        let current = classify("hi", DuplicateMode::Literal);
        assert_eq!(issue_count(&current, &history(&["hi", "hi"]), DuplicateMode::Literal), 2);
        assert_eq!(issue_count(&current, &history(&["hi", "HI", "*hi*"]), DuplicateMode::Literal), 3);
        assert_eq!(issue_count(&current, &history(&["hey", "hello"]), DuplicateMode::Literal), 0);
        assert_eq!(issue_count(&current, &[], DuplicateMode::Literal), 0);
    }

    #[test]
    fn test_counts_numeric_class() {
        let current = classify("3", DuplicateMode::Numeric);
        let prior = history(&["5", "five", "5\u{FE0F}\u{20E3}"]);
        assert_eq!(issue_count(&current, &prior, DuplicateMode::Numeric), 3);

        let current = classify("3", DuplicateMode::Literal);
        assert_eq!(issue_count(&current, &prior, DuplicateMode::Literal), 0);
    }

    #[tokio::test]
    async fn test_count_repeats_only_looks_before_message() {
        let transport = RecordingTransport::new("bot");
        transport.push_history(ChatMessage::new("1", "chan", "alice", "spam"));
        transport.push_history(ChatMessage::new("2", "chan", "alice", "spam"));
        transport.push_history(ChatMessage::new("3", "other", "alice", "spam"));
        let current = ChatMessage::new("4", "chan", "alice", "spam");
        transport.push_history(current.clone());

        let count = count_repeats(&transport, &current, DuplicateMode::Literal).await.unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_count_repeats_propagates_fetch_failure() {
        let transport = RecordingTransport::new("bot");
        transport.fail_on("fetch");
        let current = ChatMessage::new("4", "chan", "alice", "spam");

        assert!(count_repeats(&transport, &current, DuplicateMode::Literal).await.is_err());
    }
}
