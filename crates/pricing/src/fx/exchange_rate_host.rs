use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use rust_decimal::Decimal;

use crate::errors::PriceError;
use crate::fx::RateSource;

const BASE_URL: &str = "https://api.exchangerate.host/latest";

/// FX rates from the exchangerate.host latest-rates endpoint.
pub struct ExchangeRateHostSource {
    client: Client,
}

#[derive(Debug, serde::Deserialize)]
struct LatestRatesResponse {
    success: Option<bool>,
    rates: HashMap<String, f64>,
}

impl ExchangeRateHostSource {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client }
    }
}

#[async_trait]
impl RateSource for ExchangeRateHostSource {
    fn id(&self) -> &'static str {
        "EXCHANGE_RATE_HOST"
    }

    async fn rate(&self, from: &str, to: &str) -> Result<Decimal, PriceError> {
        let url = format!(
            "{}?base={}&symbols={}",
            BASE_URL,
            urlencoding::encode(from),
            urlencoding::encode(to)
        );
        debug!("fetching FX rate {}/{} from exchangerate.host", from, to);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(PriceError::FetchFailed {
                provider: self.id(),
                message: format!("HTTP {} for {}/{}", response.status(), from, to),
            });
        }

        let body: LatestRatesResponse = response.json().await?;
        if body.success == Some(false) {
            return Err(PriceError::FetchFailed {
                provider: self.id(),
                message: format!("provider reported failure for {}/{}", from, to),
            });
        }

        let raw = body.rates.get(to).copied().ok_or_else(|| {
            PriceError::FetchFailed {
                provider: self.id(),
                message: format!("no {} rate in response for base {}", to, from),
            }
        })?;

        let rate = Decimal::try_from(raw).map_err(|_| {
            PriceError::InvalidData(format!("unrepresentable FX rate {} for {}/{}", raw, from, to))
        })?;
        if rate <= Decimal::ZERO {
            return Err(PriceError::InvalidData(format!(
                "non-positive FX rate {} for {}/{}",
                rate, from, to
            )));
        }

        Ok(rate)
    }
}
