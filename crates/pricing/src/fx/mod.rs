//! Currency conversion into the base reporting currency.
//!
//! Rates are looked up through a [`RateSource`] and cached with the same
//! single-flight TTL mechanism as quotes, keyed by currency pair. Stale
//! fallback is always on for rates: a conversion only fails with
//! [`PriceError::RateUnavailable`] when no rate can be fetched and no
//! cached rate, even an expired one, exists.

mod exchange_rate_host;

pub use exchange_rate_host::ExchangeRateHostSource;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use rust_decimal::Decimal;

use crate::cache::{Freshness, TtlCache};
use crate::errors::PriceError;

/// Where FX rates come from.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Identifier for logging.
    fn id(&self) -> &'static str;

    /// Current exchange rate: one unit of `from` in units of `to`.
    async fn rate(&self, from: &str, to: &str) -> Result<Decimal, PriceError>;
}

/// Converts amounts into the base reporting currency.
pub struct FxConverter {
    base: String,
    rate_ttl: Duration,
    cache: TtlCache<(String, String), Decimal>,
    source: Arc<dyn RateSource>,
}

impl FxConverter {
    pub fn new(
        base: impl Into<String>,
        source: Arc<dyn RateSource>,
        rate_ttl: Duration,
        max_entries: usize,
    ) -> Self {
        Self {
            base: base.into(),
            rate_ttl,
            // Stale rates beat no rates; fallback is not optional here.
            cache: TtlCache::new(max_entries, true),
            source,
        }
    }

    /// The base reporting currency.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Convert `amount` from `from_currency` into the base currency.
    ///
    /// Identity when the currencies match - no lookup, no cache touch.
    pub async fn to_base(&self, amount: Decimal, from_currency: &str) -> Result<Decimal, PriceError> {
        if from_currency == self.base {
            return Ok(amount);
        }

        let key = (from_currency.to_string(), self.base.clone());
        let source = Arc::clone(&self.source);
        let (from, to) = key.clone();
        let fetch = async move {
            let rate = source.rate(&from, &to).await?;
            if rate <= Decimal::ZERO {
                return Err(PriceError::InvalidData(format!(
                    "non-positive FX rate {} for {}/{}",
                    rate, from, to
                )));
            }
            Ok(rate)
        };

        let hit = self
            .cache
            .get_or_fetch(key, self.rate_ttl, fetch)
            .await
            .map_err(|error| {
                warn!(
                    "FX rate lookup failed for {}/{}: {}",
                    from_currency, self.base, error
                );
                PriceError::RateUnavailable {
                    from: from_currency.to_string(),
                    to: self.base.clone(),
                }
            })?;

        if hit.freshness == Freshness::Stale {
            warn!(
                "using stale FX rate for {}/{}",
                from_currency, self.base
            );
        } else {
            debug!(
                "FX rate {}/{} = {} ({:?})",
                from_currency, self.base, hit.value, hit.freshness
            );
        }

        Ok(amount * hit.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedRateSource {
        rate: Decimal,
        calls: AtomicUsize,
        should_fail: bool,
    }

    impl FixedRateSource {
        fn new(rate: Decimal) -> Self {
            Self {
                rate,
                calls: AtomicUsize::new(0),
                should_fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                rate: Decimal::ONE,
                calls: AtomicUsize::new(0),
                should_fail: true,
            }
        }
    }

    #[async_trait]
    impl RateSource for FixedRateSource {
        fn id(&self) -> &'static str {
            "FIXED"
        }

        async fn rate(&self, _from: &str, _to: &str) -> Result<Decimal, PriceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.should_fail {
                Err(PriceError::FetchFailed {
                    provider: "FIXED",
                    message: "unavailable".to_string(),
                })
            } else {
                Ok(self.rate)
            }
        }
    }

    const TTL: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn test_identity_conversion_skips_lookup() {
        let source = Arc::new(FixedRateSource::new(dec!(16250)));
        let fx = FxConverter::new("IDR", Arc::clone(&source) as Arc<dyn RateSource>, TTL, 64);

        let converted = fx.to_base(dec!(1000000), "IDR").await.unwrap();
        assert_eq!(converted, dec!(1000000));
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_conversion_multiplies_by_rate() {
        let source = Arc::new(FixedRateSource::new(dec!(16250)));
        let fx = FxConverter::new("IDR", Arc::clone(&source) as Arc<dyn RateSource>, TTL, 64);

        let converted = fx.to_base(dec!(2500), "USD").await.unwrap();
        assert_eq!(converted, dec!(2500) * dec!(16250));
    }

    #[tokio::test]
    async fn test_rate_is_cached_per_pair() {
        let source = Arc::new(FixedRateSource::new(dec!(16250)));
        let fx = FxConverter::new("IDR", Arc::clone(&source) as Arc<dyn RateSource>, TTL, 64);

        fx.to_base(dec!(1), "USD").await.unwrap();
        fx.to_base(dec!(2), "USD").await.unwrap();
        fx.to_base(dec!(3), "USD").await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rate_unavailable_without_any_cached_rate() {
        let source = Arc::new(FixedRateSource::failing());
        let fx = FxConverter::new("IDR", Arc::clone(&source) as Arc<dyn RateSource>, TTL, 64);

        let error = fx.to_base(dec!(1), "USD").await.unwrap_err();
        assert!(matches!(
            error,
            PriceError::RateUnavailable { from, to } if from == "USD" && to == "IDR"
        ));
    }
}
