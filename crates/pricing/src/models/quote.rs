use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::PriceError;

/// The normalized result of one adapter call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Quote {
    /// Current price in the quote currency. Always non-negative.
    pub price: Decimal,

    /// ISO 4217 currency code of the price.
    pub currency: String,

    /// When the price was fetched.
    pub fetched_at: DateTime<Utc>,
}

impl Quote {
    /// Create a new quote.
    pub fn new(price: Decimal, currency: impl Into<String>, fetched_at: DateTime<Utc>) -> Self {
        Self {
            price,
            currency: currency.into(),
            fetched_at,
        }
    }

    /// Check the quote invariants: non-negative price, recognizable
    /// currency code (three alphabetic characters).
    pub fn validate(&self) -> Result<(), PriceError> {
        if self.price.is_sign_negative() {
            return Err(PriceError::InvalidData(format!(
                "negative price: {}",
                self.price
            )));
        }
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(PriceError::InvalidData(format!(
                "invalid currency code: {}",
                self.currency
            )));
        }
        Ok(())
    }
}
