//! Engine configuration and defaults.

use std::collections::HashMap;
use std::time::Duration;

use crate::models::PriceSource;

/// Base reporting currency all prices are converted into.
pub const BASE_CURRENCY: &str = "IDR";

/// Default quote TTL for sources without an override.
pub const DEFAULT_QUOTE_TTL: Duration = Duration::from_secs(5 * 60);

/// Crypto moves fast; keep it fresher.
pub const CRYPTO_QUOTE_TTL: Duration = Duration::from_secs(60);

/// NAV updates once a trading day.
pub const MUTUAL_FUND_QUOTE_TTL: Duration = Duration::from_secs(6 * 60 * 60);

/// FX rates can live longer than quotes.
pub const DEFAULT_FX_RATE_TTL: Duration = Duration::from_secs(60 * 60);

/// Default HTTP request timeout for outbound fetches.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Default batch fan-out width.
pub const DEFAULT_BATCH_CONCURRENCY: usize = 8;

/// Default cache entry ceiling (TTL alone does not bound memory).
pub const DEFAULT_MAX_CACHE_ENTRIES: usize = 1024;

/// Quote cache policy.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// TTL applied when no per-source override exists.
    pub default_ttl: Duration,
    /// Per-source TTL overrides.
    pub ttl_overrides: HashMap<PriceSource, Duration>,
    /// Serve an expired entry when a re-fetch fails, instead of surfacing
    /// the failure as the instrument's error.
    pub allow_stale_fallback: bool,
    /// Entry ceiling; expired entries are evicted first, then the oldest.
    pub max_entries: usize,
}

impl CacheConfig {
    /// Effective TTL for a source.
    pub fn ttl_for(&self, source: PriceSource) -> Duration {
        self.ttl_overrides
            .get(&source)
            .copied()
            .unwrap_or(self.default_ttl)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        let mut ttl_overrides = HashMap::new();
        ttl_overrides.insert(PriceSource::Crypto, CRYPTO_QUOTE_TTL);
        ttl_overrides.insert(PriceSource::MutualFund, MUTUAL_FUND_QUOTE_TTL);
        Self {
            default_ttl: DEFAULT_QUOTE_TTL,
            ttl_overrides,
            allow_stale_fallback: false,
            max_entries: DEFAULT_MAX_CACHE_ENTRIES,
        }
    }
}

/// Batch resolution policy.
#[derive(Clone, Debug)]
pub struct BatchConfig {
    /// How many instruments resolve concurrently. Per-source outbound
    /// caps are enforced separately by the registry.
    pub max_concurrency: usize,
    /// Optional wall-clock bound for a whole batch; instruments not
    /// resolved by then are reported as failed, never dropped.
    pub deadline: Option<Duration>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_BATCH_CONCURRENCY,
            deadline: None,
        }
    }
}

/// Top-level engine configuration.
#[derive(Clone, Debug)]
pub struct PricingConfig {
    pub cache: CacheConfig,
    pub batch: BatchConfig,
    /// Timeout applied around every adapter fetch.
    pub fetch_timeout: Duration,
    /// TTL for cached FX rates.
    pub fx_rate_ttl: Duration,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            batch: BatchConfig::default(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            fx_rate_ttl: DEFAULT_FX_RATE_TTL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_overrides() {
        let config = CacheConfig::default();
        assert_eq!(config.ttl_for(PriceSource::Crypto), CRYPTO_QUOTE_TTL);
        assert_eq!(
            config.ttl_for(PriceSource::MutualFund),
            MUTUAL_FUND_QUOTE_TTL
        );
        assert_eq!(config.ttl_for(PriceSource::Stock), DEFAULT_QUOTE_TTL);
    }
}
