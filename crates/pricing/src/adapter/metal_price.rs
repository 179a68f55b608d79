//! Metal Price API adapter for gold and other precious metals.
//!
//! Mappings are metal symbols (`XAU` for gold, `XAG` for silver). The API
//! returns how many troy ounces one USD buys, so the price per ounce is
//! the reciprocal - quotes come back in USD and go through FX conversion.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::adapter::{RateLimit, SourceAdapter};
use crate::errors::PriceError;
use crate::models::{PriceSource, Quote};

const ADAPTER_ID: &str = "METAL_PRICE";
const API_BASE: &str = "https://api.metalpriceapi.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Supported metal symbols.
const SUPPORTED_METALS: &[&str] = &["XAU", "XAG", "XPT", "XPD"];

#[derive(Debug, Deserialize)]
struct MetalPriceResponse {
    success: bool,
    /// 1 USD = rate troy ounces of the requested metal.
    rates: HashMap<String, f64>,
}

/// Metal Price API adapter.
pub struct MetalPriceAdapter {
    client: Client,
    api_key: String,
}

impl MetalPriceAdapter {
    pub fn new(api_key: String) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, api_key }
    }

    fn is_supported_metal(symbol: &str) -> bool {
        SUPPORTED_METALS.contains(&symbol)
    }

    /// Price per troy ounce from the API's ounces-per-USD rate.
    fn price_from_rate(rate: f64) -> Result<Decimal, PriceError> {
        if rate <= 0.0 {
            return Err(PriceError::FetchFailed {
                provider: ADAPTER_ID,
                message: format!("invalid rate: {}", rate),
            });
        }
        Decimal::try_from(1.0 / rate).map_err(|_| PriceError::FetchFailed {
            provider: ADAPTER_ID,
            message: format!("unrepresentable rate: {}", rate),
        })
    }
}

#[async_trait]
impl SourceAdapter for MetalPriceAdapter {
    fn id(&self) -> &'static str {
        ADAPTER_ID
    }

    fn source(&self) -> PriceSource {
        PriceSource::Gold
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit {
            requests_per_minute: 30,
            max_concurrency: 2,
        }
    }

    fn validate_mapping(&self, mapping: &str) -> Result<(), PriceError> {
        if !Self::is_supported_metal(mapping) {
            return Err(PriceError::InvalidMapping {
                provider: ADAPTER_ID,
                mapping: mapping.to_string(),
            });
        }
        Ok(())
    }

    async fn fetch(&self, mapping: &str) -> Result<Quote, PriceError> {
        let url = format!(
            "{}/latest?api_key={}&base=USD&currencies={}",
            API_BASE, self.api_key, mapping
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| PriceError::FetchFailed {
                provider: ADAPTER_ID,
                message: e.to_string(),
            })?;

        let body: MetalPriceResponse =
            response
                .json()
                .await
                .map_err(|e| PriceError::FetchFailed {
                    provider: ADAPTER_ID,
                    message: e.to_string(),
                })?;

        if !body.success {
            return Err(PriceError::FetchFailed {
                provider: ADAPTER_ID,
                message: "API request failed".to_string(),
            });
        }

        let rate = body.rates.get(mapping).ok_or_else(|| PriceError::FetchFailed {
            provider: ADAPTER_ID,
            message: format!("no rate for {}", mapping),
        })?;

        let quote = Quote::new(Self::price_from_rate(*rate)?, "USD", Utc::now());
        quote.validate()?;
        Ok(quote)
    }
}
