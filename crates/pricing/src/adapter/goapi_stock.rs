//! GoAPI adapter for IDX equities.
//!
//! Fetches last-done prices for Indonesia Stock Exchange tickers.
//! Mappings are plain IDX tickers, e.g. `BBCA`, `TLKM`. Quotes are in IDR.
//! Requires an API key.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::adapter::{RateLimit, SourceAdapter};
use crate::errors::PriceError;
use crate::models::{PriceSource, Quote};

const ADAPTER_ID: &str = "GOAPI_STOCK";
const API_BASE: &str = "https://api.goapi.io/stock/idx";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct StockResponse {
    status: String,
    data: Option<StockData>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StockData {
    #[allow(dead_code)]
    symbol: String,
    /// Last done price in IDR.
    close: f64,
}

/// GoAPI IDX equity adapter.
pub struct GoapiStockAdapter {
    client: Client,
    api_key: String,
}

impl GoapiStockAdapter {
    pub fn new(api_key: String) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, api_key }
    }

    fn to_decimal(raw: f64) -> Result<Decimal, PriceError> {
        Decimal::try_from(raw).map_err(|_| PriceError::FetchFailed {
            provider: ADAPTER_ID,
            message: format!("unrepresentable price: {}", raw),
        })
    }
}

#[async_trait]
impl SourceAdapter for GoapiStockAdapter {
    fn id(&self) -> &'static str {
        ADAPTER_ID
    }

    fn source(&self) -> PriceSource {
        PriceSource::Stock
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit {
            requests_per_minute: 60,
            max_concurrency: 4,
        }
    }

    fn validate_mapping(&self, mapping: &str) -> Result<(), PriceError> {
        // IDX tickers are 2 to 6 uppercase letters.
        let well_formed = (2..=6).contains(&mapping.len())
            && mapping.chars().all(|c| c.is_ascii_uppercase());
        if !well_formed {
            return Err(PriceError::InvalidMapping {
                provider: ADAPTER_ID,
                mapping: mapping.to_string(),
            });
        }
        Ok(())
    }

    async fn fetch(&self, mapping: &str) -> Result<Quote, PriceError> {
        let url = format!(
            "{}/{}?api_key={}",
            API_BASE,
            urlencoding::encode(mapping),
            self.api_key
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

        if !response.status().is_success() {
            return Err(PriceError::FetchFailed {
                provider: ADAPTER_ID,
                message: format!("HTTP {}", response.status()),
            });
        }

        let body: StockResponse =
            response
                .json()
                .await
                .map_err(|e| PriceError::FetchFailed {
                    provider: ADAPTER_ID,
                    message: e.to_string(),
                })?;

        if body.status != "success" {
            return Err(PriceError::FetchFailed {
                provider: ADAPTER_ID,
                message: body
                    .message
                    .unwrap_or_else(|| "API request failed".to_string()),
            });
        }

        let data = body.data.ok_or_else(|| PriceError::FetchFailed {
            provider: ADAPTER_ID,
            message: format!("no data for {}", mapping),
        })?;

        let quote = Quote::new(Self::to_decimal(data.close)?, "IDR", Utc::now());
        quote.validate()?;
        Ok(quote)
    }
}
