// src/bot/deferred.rs - Replies sent after a delay, off the event-handling path

use log::{debug, error, info};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

use crate::platforms::ChatTransport;

/// Pause between the typing indicator and the reply
pub const TYPING_DELAY: Duration = Duration::from_secs(1);

/// Handle to a scheduled reply.
///
/// Dropping the handle detaches the task: the reply is still sent, with no
/// ordering guarantee relative to messages that arrive in the meantime.
/// Replies still sleeping when the process exits are lost.
#[derive(Debug)]
pub struct DeferredReply {
    handle: JoinHandle<()>,
}

impl DeferredReply {
    /// Cancel the reply if it has not been sent yet
    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the task to finish or be cancelled
    pub async fn wait(self) {
        if let Err(e) = self.handle.await {
            debug!("Deferred reply did not complete: {}", e);
        }
    }
}

/// Spawn a task that sleeps for `delay` and then sends `text` to `channel_id`
pub fn schedule_reply(
    transport: Arc<dyn ChatTransport>,
    channel_id: String,
    text: String,
    delay: Duration,
) -> DeferredReply {
    let handle = tokio::spawn(async move {
        sleep(delay).await;
        match transport.send_message(&channel_id, &text).await {
            Ok(message_id) => info!("Sent deferred reply {} to {}", message_id, channel_id),
            Err(e) => error!("Failed to send deferred reply to {}: {}", channel_id, e),
        }
    });
    DeferredReply { handle }
}
