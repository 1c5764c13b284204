use anyhow::{Context, Result};
use log::{error, info};
use std::sync::Arc;

use chatwarden::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables and initialize logging
    dotenv::dotenv().ok();
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("Starting chatwarden v{}", chatwarden::VERSION);

    let config_path = config_path_from_env();
    let rules = match load_rules(&config_path).await {
        Ok(rules) => rules,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    let mut bot = ChatBot::new(Arc::new(rules));

    let discord_config = DiscordConfig::from_env()?;
    bot.add_connection(Box::new(DiscordConnection::new(discord_config)));

    bot.start().await?;
    info!("Bot is running. Press Ctrl+C to stop.");

    let connections_lost = tokio::select! {
        result = shutdown_signal() => {
            result?;
            false
        }
        _ = bot.closed() => true,
    };

    if connections_lost {
        error!("All platform connections closed, exiting");
        bot.shutdown().await?;
        return Err(anyhow::anyhow!("Platform connections closed unexpectedly"));
    }

    info!("Shutdown signal received");
    bot.shutdown().await
}

/// Wait for Ctrl+C, or SIGTERM (systemd, docker stop, etc.) on unix
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .context("Failed to register SIGTERM handler")?;

        tokio::select! {
            result = tokio::signal::ctrl_c() => result.context("Failed to listen for Ctrl+C")?,
            _ = sigterm.recv() => info!("Received SIGTERM"),
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl+C")
    }
}
