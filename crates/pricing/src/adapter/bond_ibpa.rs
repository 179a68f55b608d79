//! IBPA adapter for Indonesian government and retail bonds.
//!
//! Fetches the daily reference price for a bond series from the Indonesia
//! Bond Pricing Agency feed. Mappings are series codes such as `FR0098`,
//! `ORI024`, or `SR018`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::adapter::{RateLimit, SourceAdapter};
use crate::errors::PriceError;
use crate::models::{PriceSource, Quote};

const ADAPTER_ID: &str = "BOND_IBPA";
const API_BASE: &str = "https://api.phei.co.id/v1/price";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct BondPriceResponse {
    #[allow(dead_code)]
    series: String,
    /// Reference price.
    price: f64,
    /// Quote currency; the feed defaults to IDR.
    currency: Option<String>,
}

/// IBPA bond reference price adapter.
pub struct BondIbpaAdapter {
    client: Client,
}

impl BondIbpaAdapter {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client }
    }

    /// Series codes are 2-4 uppercase letters followed by 2-4 digits.
    fn is_series_code(mapping: &str) -> bool {
        let letters = mapping.chars().take_while(|c| c.is_ascii_uppercase()).count();
        let digits = mapping.len() - letters;
        (2..=4).contains(&letters)
            && (2..=4).contains(&digits)
            && mapping[letters..].chars().all(|c| c.is_ascii_digit())
    }
}

impl Default for BondIbpaAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for BondIbpaAdapter {
    fn id(&self) -> &'static str {
        ADAPTER_ID
    }

    fn source(&self) -> PriceSource {
        PriceSource::Bond
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit {
            requests_per_minute: 30,
            max_concurrency: 2,
        }
    }

    fn validate_mapping(&self, mapping: &str) -> Result<(), PriceError> {
        if !Self::is_series_code(mapping) {
            return Err(PriceError::InvalidMapping {
                provider: ADAPTER_ID,
                mapping: mapping.to_string(),
            });
        }
        Ok(())
    }

    async fn fetch(&self, mapping: &str) -> Result<Quote, PriceError> {
        let url = format!("{}/{}", API_BASE, mapping);

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

        let body: BondPriceResponse =
            response
                .json()
                .await
                .map_err(|e| PriceError::FetchFailed {
                    provider: ADAPTER_ID,
                    message: e.to_string(),
                })?;

        let price = Decimal::try_from(body.price).map_err(|_| PriceError::FetchFailed {
            provider: ADAPTER_ID,
            message: format!("unrepresentable price: {}", body.price),
        })?;

        let currency = body.currency.unwrap_or_else(|| "IDR".to_string());
        let quote = Quote::new(price, currency, Utc::now());
        quote.validate()?;
        Ok(quote)
    }
}
