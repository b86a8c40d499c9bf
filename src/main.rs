mod commands;
mod config;
mod platform;
mod rates;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use teloxide::Bot;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::CommandHandler;
use crate::config::Config;
use crate::rates::cbr::CbrClient;
use crate::rates::RateService;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,rates_bot=debug".into()),
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
    if let Some(username) = &config.telegram.bot_username {
        info!("  Bot: @{}", username);
    }

    let feed = CbrClient::new(&config.feed.url, config.feed_timeout())
        .context("Failed to build rate feed client")?;
    let (usd, eur) = config.rate_queries()?;
    info!("  Feed: {} (timeout {:?})", feed.url(), config.feed_timeout());
    info!("  USD: {} -> {}", usd.currency_id, usd.query.as_str());
    info!("  EUR: {} -> {}", eur.currency_id, eur.query.as_str());

    let handler = Arc::new(CommandHandler::new(RateService::new(
        Arc::new(feed),
        usd,
        eur,
    )));

    let bot = Bot::new(&config.telegram.bot_token);
    if config.telegram.register_commands {
        platform::telegram::register_commands(&bot).await;
    }

    info!("Bot is starting...");
    platform::telegram::run(handler, bot).await;

    Ok(())
}
