use anyhow::{anyhow, Result};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::platforms::{ChatTransport, PlatformConnection};
use crate::types::ChatMessage;

pub mod classifier;
pub mod commands;
pub mod deferred;
pub mod dispatcher;
pub mod escalation;
pub mod history;
pub mod replacements;
pub mod responses;
pub mod rules;

use dispatcher::MessageDispatcher;
use rules::RuleSet;

/// Owns the platform connections and feeds every incoming message to a dispatcher
pub struct ChatBot {
    rules: Arc<RuleSet>,
    pending: Vec<Box<dyn PlatformConnection>>,
    connections: Vec<Arc<dyn PlatformConnection>>,
    processors: Vec<JoinHandle<()>>,
}

impl ChatBot {
    pub fn new(rules: Arc<RuleSet>) -> Self {
        Self {
            rules,
            pending: Vec::new(),
            connections: Vec::new(),
            processors: Vec::new(),
        }
    }

    /// Add a platform connection to the bot. It is connected by `start`.
    pub fn add_connection(&mut self, connection: Box<dyn PlatformConnection>) {
        info!("Added {} connection", connection.platform_name());
        self.pending.push(connection);
    }

    /// Connect every registered platform and start one processing loop per connection
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting chat bot...");

        for mut connection in self.pending.drain(..) {
            let platform_name = connection.platform_name().to_string();
            if let Err(e) = connection.connect().await {
                error!("Failed to connect to {}: {}", platform_name, e);
                continue;
            }

            let Some(receiver) = connection.get_message_receiver() else {
                warn!("{} connected without a message receiver", platform_name);
                continue;
            };

            let connection: Arc<dyn PlatformConnection> = Arc::from(connection);
            let transport: Arc<dyn ChatTransport> = connection.clone();
            let dispatcher = MessageDispatcher::new(Arc::clone(&self.rules), transport);

            self.processors.push(spawn_processor(platform_name.clone(), dispatcher, receiver));
            self.connections.push(connection);
            info!("Set up message processor for {}", platform_name);
        }

        if self.connections.is_empty() {
            return Err(anyhow!("No platform connection could be established"));
        }

        info!("Chat bot started with {} connection(s)", self.connections.len());
        Ok(())
    }

    /// Health check for all connections
    pub async fn health_check(&self) -> HashMap<String, bool> {
        let mut status = HashMap::new();

        for connection in &self.connections {
            let is_healthy = connection.is_connected().await;
            if !is_healthy {
                warn!("{} connection is unhealthy", connection.platform_name());
            }
            status.insert(connection.platform_name().to_string(), is_healthy);
        }

        status
    }

    /// Resolves once every processing loop has ended, i.e. every connection
    /// has closed its message stream for good
    pub async fn closed(&mut self) {
        futures_util::future::join_all(self.processors.iter_mut()).await;
    }

    /// Disconnect all platforms and stop processing. Pending deferred replies may be lost.
    pub async fn shutdown(&mut self) -> Result<()> {
        info!("Shutting down chat bot...");

        for connection in &self.connections {
            if let Err(e) = connection.disconnect().await {
                error!("Error disconnecting from {}: {}", connection.platform_name(), e);
            }
        }

        for processor in self.processors.drain(..) {
            processor.abort();
        }
        self.connections.clear();

        info!("Chat bot shutdown complete");
        Ok(())
    }
}

/// Handle messages from one connection strictly one at a time
fn spawn_processor(
    platform_name: String,
    dispatcher: MessageDispatcher,
    mut receiver: broadcast::Receiver<ChatMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(message) => {
                    let report = dispatcher.handle_message(&message).await;
                    if let Some(reason) = report.skipped {
                        debug!("Skipped message {} on {}: {:?}", message.id, platform_name, reason);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("{} message receiver lagged by {} messages", platform_name, n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("{} message receiver closed", platform_name);
                    break;
                }
            }
        }
    })
}
