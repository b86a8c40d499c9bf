use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::rates::RateQuery;

/// Environment variable consulted when `telegram.bot_token` is empty.
pub const TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    #[serde(default = "default_feed_config")]
    pub feed: FeedConfig,
    #[serde(default = "default_rates_config")]
    pub rates: RatesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub bot_username: Option<String>,
    /// Publish the command menu on startup
    #[serde(default = "default_register_commands")]
    pub register_commands: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    #[serde(default = "default_feed_url")]
    pub url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RatesConfig {
    #[serde(default = "default_usd")]
    pub usd: CurrencyConfig,
    #[serde(default = "default_eur")]
    pub eur: CurrencyConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CurrencyConfig {
    /// Feed identifier, e.g. "R01235"
    pub id: String,
    pub query: String,
}

fn default_register_commands() -> bool {
    true
}

fn default_feed_url() -> String {
    "https://www.cbr.ru/scripts/XML_daily.asp".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_feed_config() -> FeedConfig {
    FeedConfig {
        url: default_feed_url(),
        timeout_secs: default_timeout_secs(),
    }
}

fn default_usd() -> CurrencyConfig {
    CurrencyConfig {
        id: "R01235".to_string(),
        query: "ValCurs//Valute[@ID='R01235']/Value".to_string(),
    }
}

fn default_eur() -> CurrencyConfig {
    CurrencyConfig {
        id: "R01239".to_string(),
        query: "ValCurs//Valute[@ID='R01239']/Value".to_string(),
    }
}

fn default_rates_config() -> RatesConfig {
    RatesConfig {
        usd: default_usd(),
        eur: default_eur(),
    }
}

/// Configured token wins; an empty one falls back to the environment.
fn resolve_token(configured: &str, from_env: Option<String>) -> Result<String> {
    if !configured.trim().is_empty() {
        return Ok(configured.trim().to_string());
    }
    match from_env {
        Some(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
        _ => anyhow::bail!("telegram.bot_token is empty and {} is not set", TOKEN_ENV),
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content, std::env::var(TOKEN_ENV).ok())
    }

    /// Parse TOML text, resolve the bot token and validate the rate queries.
    pub fn parse(content: &str, token_from_env: Option<String>) -> Result<Self> {
        let mut config: Config =
            toml::from_str(content).context("Failed to parse config file")?;

        config.telegram.bot_token = resolve_token(&config.telegram.bot_token, token_from_env)?;
        config.rate_queries()?;

        Ok(config)
    }

    /// Compiled USD and EUR queries.
    pub fn rate_queries(&self) -> Result<(RateQuery, RateQuery)> {
        let usd = RateQuery::new(&self.rates.usd.id, &self.rates.usd.query)
            .context("Invalid [rates.usd] query")?;
        let eur = RateQuery::new(&self.rates.eur.id, &self.rates.eur.query)
            .context("Invalid [rates.eur] query")?;
        Ok((usd, eur))
    }

    pub fn feed_timeout(&self) -> Duration {
        Duration::from_secs(self.feed.timeout_secs)
    }
}
