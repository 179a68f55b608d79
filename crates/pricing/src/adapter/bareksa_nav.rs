//! Bareksa adapter for mutual-fund NAV.
//!
//! Fetches the latest published net asset value per unit for a fund code.
//! NAV updates once per trading day, so this source pairs with a long TTL.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::adapter::{RateLimit, SourceAdapter};
use crate::errors::PriceError;
use crate::models::{PriceSource, Quote};

const ADAPTER_ID: &str = "BAREKSA_NAV";
const API_BASE: &str = "https://api.bareksa.com/v1/nav";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct NavResponse {
    #[allow(dead_code)]
    code: String,
    /// NAV per unit in IDR.
    nav: f64,
    #[allow(dead_code)]
    date: Option<String>,
}

/// Bareksa mutual-fund NAV adapter.
pub struct BareksaNavAdapter {
    client: Client,
}

impl BareksaNavAdapter {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client }
    }
}

impl Default for BareksaNavAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for BareksaNavAdapter {
    fn id(&self) -> &'static str {
        ADAPTER_ID
    }

    fn source(&self) -> PriceSource {
        PriceSource::MutualFund
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit {
            requests_per_minute: 30,
            max_concurrency: 2,
        }
    }

    fn validate_mapping(&self, mapping: &str) -> Result<(), PriceError> {
        // Fund codes: at least three alphanumeric characters, dashes allowed.
        let well_formed = mapping.len() >= 3
            && mapping
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !well_formed {
            return Err(PriceError::InvalidMapping {
                provider: ADAPTER_ID,
                mapping: mapping.to_string(),
            });
        }
        Ok(())
    }

    async fn fetch(&self, mapping: &str) -> Result<Quote, PriceError> {
        let url = format!("{}/latest?code={}", API_BASE, urlencoding::encode(mapping));

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

        let body: NavResponse = response
            .json()
            .await
            .map_err(|e| PriceError::FetchFailed {
                provider: ADAPTER_ID,
                message: e.to_string(),
            })?;

        let nav = Decimal::try_from(body.nav).map_err(|_| PriceError::FetchFailed {
            provider: ADAPTER_ID,
            message: format!("unrepresentable NAV: {}", body.nav),
        })?;

        let quote = Quote::new(nav, "IDR", Utc::now());
        quote.validate()?;
        Ok(quote)
    }
}
