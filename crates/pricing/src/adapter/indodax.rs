//! Indodax adapter for crypto prices.
//!
//! Fetches spot prices from the Indodax public ticker API. Mappings are
//! lowercase pair ids quoted against IDR, e.g. `btcidr`, `ethidr`.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::adapter::{RateLimit, SourceAdapter};
use crate::errors::PriceError;
use crate::models::{PriceSource, Quote};

const ADAPTER_ID: &str = "INDODAX";
const API_BASE: &str = "https://indodax.com/api";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct TickerResponse {
    ticker: Ticker,
}

#[derive(Debug, Deserialize)]
struct Ticker {
    /// Last traded price, returned as a string by the API.
    last: String,
}

/// Indodax public ticker adapter.
pub struct IndodaxAdapter {
    client: Client,
}

impl IndodaxAdapter {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client }
    }

    fn parse_price(raw: &str) -> Result<Decimal, PriceError> {
        Decimal::from_str(raw).map_err(|_| PriceError::FetchFailed {
            provider: ADAPTER_ID,
            message: format!("unparseable price: {}", raw),
        })
    }
}

impl Default for IndodaxAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for IndodaxAdapter {
    fn id(&self) -> &'static str {
        ADAPTER_ID
    }

    fn source(&self) -> PriceSource {
        PriceSource::Crypto
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit {
            requests_per_minute: 120,
            max_concurrency: 6,
        }
    }

    fn validate_mapping(&self, mapping: &str) -> Result<(), PriceError> {
        let well_formed = mapping.len() >= 6
            && mapping.ends_with("idr")
            && mapping
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if !well_formed {
            return Err(PriceError::InvalidMapping {
                provider: ADAPTER_ID,
                mapping: mapping.to_string(),
            });
        }
        Ok(())
    }

    async fn fetch(&self, mapping: &str) -> Result<Quote, PriceError> {
        let url = format!("{}/ticker/{}", API_BASE, mapping);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| PriceError::FetchFailed {
                provider: ADAPTER_ID,
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(PriceError::FetchFailed {
                provider: ADAPTER_ID,
                message: format!("HTTP {}", response.status()),
            });
        }

        let ticker: TickerResponse =
            response
                .json()
                .await
                .map_err(|e| PriceError::FetchFailed {
                    provider: ADAPTER_ID,
                    message: e.to_string(),
                })?;

        let price = Self::parse_price(&ticker.ticker.last)?;
        let quote = Quote::new(price, "IDR", Utc::now());
        quote.validate()?;
        Ok(quote)
    }
}
