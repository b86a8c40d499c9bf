use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::rates::{RateFeed, TransportError};

/// Client for the central bank's daily XML rate feed.
pub struct CbrClient {
    client: reqwest::Client,
    url: String,
}

impl CbrClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, url))
    }

    pub fn with_client(client: reqwest::Client, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RateFeed for CbrClient {
    async fn fetch_rates_document(&self) -> Result<String, TransportError> {
        debug!("Fetching rate feed: {}", self.url);

        let response = self.client.get(&self.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }

        // The feed declares its charset in Content-Type; text() decodes it.
        let body = response.text().await?;
        debug!("Rate feed returned {} bytes", body.len());
        Ok(body)
    }
}
