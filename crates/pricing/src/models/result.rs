use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{PriceSource, Quote};

/// Message used for the designed manual-pricing skip.
pub(crate) const MANUAL_SKIP_MESSAGE: &str = "manual pricing, not fetched";

/// Per-instrument pricing outcome, serialized directly by the host's API
/// layer.
///
/// Invariant: exactly one of `price` and `error` is set - never both,
/// never neither. A stale-fallback result carries the price with
/// `from_cache = true` and `stale = true`; the failed fetch behind it is
/// logged, not surfaced here.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceResult {
    /// Price in the instrument's native currency.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,

    /// Price converted to the base reporting currency.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_idr: Option<Decimal>,

    /// Which source produced (or failed to produce) the price.
    pub source: PriceSource,

    /// When the underlying quote was fetched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetched_at: Option<DateTime<Utc>>,

    /// Whether the quote was served from the cache.
    pub from_cache: bool,

    /// Staleness marker: the quote came from an expired cache entry
    /// because the fresh fetch failed.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stale: bool,

    /// Why no price is present (fetch failure, misconfiguration, or the
    /// manual-pricing skip message).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PriceResult {
    /// A successfully priced result.
    pub fn priced(
        quote: &Quote,
        price_idr: Decimal,
        source: PriceSource,
        from_cache: bool,
        stale: bool,
    ) -> Self {
        Self {
            price: Some(quote.price),
            price_idr: Some(price_idr),
            source,
            fetched_at: Some(quote.fetched_at),
            from_cache,
            stale,
            error: None,
        }
    }

    /// A failed result carrying the error message.
    pub fn failed(source: PriceSource, error: impl Into<String>) -> Self {
        Self {
            price: None,
            price_idr: None,
            source,
            fetched_at: None,
            from_cache: false,
            stale: false,
            error: Some(error.into()),
        }
    }

    /// The designed skip for manual instruments. Distinct from a failure:
    /// the batch orchestrator counts it as skipped, never failed.
    pub fn skipped(source: PriceSource) -> Self {
        Self::failed(source, MANUAL_SKIP_MESSAGE)
    }

    /// Whether a price is present.
    pub fn is_priced(&self) -> bool {
        self.price.is_some()
    }
}

/// Classification of a resolution, used for batch statistics.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    /// Fetched fresh from the provider (including single-flight joiners).
    Fresh,
    /// Served from a live cache entry.
    Cached,
    /// Served from an expired cache entry because the fresh fetch failed.
    Stale,
    /// Manual source; nothing fetched, by design.
    Skipped,
    /// An error surfaced for this instrument.
    Failed,
}
