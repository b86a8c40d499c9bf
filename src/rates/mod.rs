pub mod cbr;
pub mod extract;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::rates::extract::{extract_value, PathQuery};

/// Failure to pull a value out of the feed document.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("malformed XML: {0}")]
    Parse(#[from] roxmltree::Error),

    #[error("invalid query '{query}': {reason}")]
    Query { query: String, reason: String },
}

/// Failure to fetch the feed document from upstream.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("feed {url} answered with status {status}")]
    Status { url: String, status: u16 },
}

#[derive(Debug, Error)]
pub enum RateError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

/// Currencies the bot can quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Currency {
    Usd,
    Eur,
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Currency::Usd => write!(f, "USD"),
            Currency::Eur => write!(f, "EUR"),
        }
    }
}

/// Pairs a feed currency identifier with the query that locates its value.
/// The query is checked when the pair is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateQuery {
    pub currency_id: String,
    pub query: PathQuery,
}

impl RateQuery {
    pub fn new(currency_id: &str, query: &str) -> Result<Self, ExtractionError> {
        Ok(Self {
            currency_id: currency_id.to_string(),
            query: PathQuery::compile(query)?,
        })
    }
}

/// Source of the current-day rate feed.
#[async_trait]
pub trait RateFeed: Send + Sync {
    async fn fetch_rates_document(&self) -> Result<String, TransportError>;
}

/// Fetches the feed and extracts one currency's value. Nothing is cached:
/// every call is one upstream round trip.
pub struct RateService {
    feed: Arc<dyn RateFeed>,
    usd: RateQuery,
    eur: RateQuery,
}

impl RateService {
    pub fn new(feed: Arc<dyn RateFeed>, usd: RateQuery, eur: RateQuery) -> Self {
        Self { feed, usd, eur }
    }

    pub fn query_for(&self, currency: Currency) -> &RateQuery {
        match currency {
            Currency::Usd => &self.usd,
            Currency::Eur => &self.eur,
        }
    }

    pub async fn current_rate(&self, currency: Currency) -> Result<String, RateError> {
        let rate_query = self.query_for(currency);
        let xml = self.feed.fetch_rates_document().await?;
        let value = extract_value(&xml, rate_query.query.as_str())?;

        debug!(
            "Extracted {} ({}) = {:?}",
            currency, rate_query.currency_id, value
        );
        Ok(value)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    fn service(feed: Arc<StaticFeed>) -> RateService {
        let (usd, eur) = default_queries();
        RateService::new(feed, usd, eur)
    }

    #[tokio::test]
    async fn test_current_rate_per_currency() {
        let feed = Arc::new(StaticFeed::ok(&feed_with("91.0", "99,5")));
        let rates = service(feed.clone());

        assert_eq!(rates.current_rate(Currency::Usd).await.unwrap(), "91.0");
        assert_eq!(rates.current_rate(Currency::Eur).await.unwrap(), "99,5");
        assert_eq!(feed.calls(), 2);
    }

    #[tokio::test]
    async fn test_transport_failure_is_reported() {
        let rates = service(Arc::new(StaticFeed::failing()));
        let err = rates.current_rate(Currency::Usd).await.unwrap_err();
        assert!(matches!(err, RateError::Transport(TransportError::Status { status: 503, .. })));
    }

    #[tokio::test]
    async fn test_malformed_feed_is_extraction_error() {
        let rates = service(Arc::new(StaticFeed::ok("<ValCurs><Valute>")));
        let err = rates.current_rate(Currency::Eur).await.unwrap_err();
        assert!(matches!(err, RateError::Extraction(ExtractionError::Parse(_))));
    }

    #[test]
    fn test_rate_query_rejects_bad_syntax() {
        let err = RateQuery::new("R01235", "ValCurs//Valute[@ID='R01235'").unwrap_err();
        assert!(err.to_string().contains("invalid query"));
    }

    #[test]
    fn test_currency_display() {
        assert_eq!(Currency::Usd.to_string(), "USD");
        assert_eq!(Currency::Eur.to_string(), "EUR");
    }
}
