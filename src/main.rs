mod bot;
mod commands;
mod config;
mod platform;
mod preferences;
mod shortener;
mod transform;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::AppState;
use crate::config::Config;
use crate::preferences::SqlitePreferenceStore;
use crate::shortener::HttpShortener;
use crate::transform::MessageTransformer;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,linkbot=debug".into()),
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
    info!("  Shortener: {}", config.shortener.base_url);
    info!("  Database: {}", config.storage.database_path.display());
    info!("  Channel link prefix: {}", config.channel.link_prefix);
    info!("  Allowed users: {:?}", config.telegram.allowed_user_ids);

    let store = Arc::new(
        SqlitePreferenceStore::open(&config.storage.database_path)
            .context("Failed to open preference store")?,
    );
    let shortener = Arc::new(HttpShortener::new(&config.shortener)?);
    let transformer = MessageTransformer::new(
        store.clone(),
        shortener,
        &config.channel.link_prefix,
        config.shortener.timeout(),
    )?;

    let state = Arc::new(AppState::new(config, store, transformer));

    info!("Bot is starting...");
    bot::run(state).await?;

    Ok(())
}
