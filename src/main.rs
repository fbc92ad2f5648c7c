mod bot;
mod callback;
mod config;
mod dedup;
mod render;
mod server;
mod telegram;
mod update;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

use crate::bot::AppState;
use crate::config::Config;
use crate::telegram::TelegramClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,anonbot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Admin: {}", config.telegram.admin_id);
    info!("  Channel: {}", config.channel.id);
    info!("  Membership lock: {}", config.channel.lock);

    // Register the webhook with Telegram before accepting traffic
    let client = TelegramClient::new(&config.telegram.bot_token);
    let webhook_url = Url::parse(&format!(
        "{}/{}",
        config.server.public_url.trim_end_matches('/'),
        config.telegram.bot_token
    ))
    .context("public_url does not form a valid webhook URL")?;
    client.register_webhook(webhook_url).await?;
    info!("Webhook registered with Telegram");

    let port = config.server.port;
    let state = Arc::new(AppState::new(config, Arc::new(client)));

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("Listening on {addr}");
    axum::serve(listener, server::router(state))
        .await
        .context("Server error")?;

    Ok(())
}
