//! Reference price lookup
//!
//! A missing price never fails a batch: every error is logged here and
//! surfaces to callers as `None`.

use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::PriceConfig;

/// Source of the native asset's fiat price
#[async_trait]
pub trait PriceQuote: Send + Sync {
    /// Current price of `asset`, `None` when it could not be obtained
    async fn current_price(&self, asset: &str) -> Option<f64>;
}

#[derive(Debug, Error)]
enum PriceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {0}")]
    Status(StatusCode),

    #[error("Response has no {vs} price for {asset}")]
    MissingField { asset: String, vs: String },
}

/// Simple-price API client (`?ids={asset}&vs_currencies={vs}`)
#[derive(Debug, Clone)]
pub struct CoinGeckoClient {
    http: reqwest::Client,
    url: String,
    vs_currency: String,
}

impl CoinGeckoClient {
    pub fn new(url: &str, vs_currency: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url: url.to_string(),
            vs_currency: vs_currency.to_ascii_lowercase(),
        })
    }

    pub fn from_config(config: &PriceConfig) -> Result<Self, reqwest::Error> {
        Self::new(
            &config.url,
            &config.vs_currency,
            Duration::from_secs(config.timeout_secs),
        )
    }

    async fn fetch(&self, asset: &str) -> Result<f64, PriceError> {
        let response = self
            .http
            .get(&self.url)
            .query(&[("ids", asset), ("vs_currencies", self.vs_currency.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PriceError::Status(status));
        }

        let body: serde_json::Value = response.json().await?;
        body.get(asset)
            .and_then(|quotes| quotes.get(&self.vs_currency))
            .and_then(serde_json::Value::as_f64)
            .ok_or_else(|| PriceError::MissingField {
                asset: asset.to_string(),
                vs: self.vs_currency.clone(),
            })
    }
}

#[async_trait]
impl PriceQuote for CoinGeckoClient {
    async fn current_price(&self, asset: &str) -> Option<f64> {
        match self.fetch(asset).await {
            Ok(price) => {
                debug!(asset, vs = %self.vs_currency, price, "Fetched reference price");
                Some(price)
            }
            Err(e) => {
                warn!(asset, error = %e, "Price lookup failed");
                None
            }
        }
    }
}
