//! Single-instrument price resolution.
//!
//! The resolver ties the layers together for one instrument: skip manual
//! instruments, serve or fetch the quote through the single-flight cache,
//! then convert to the base currency. It never returns `Err` - every
//! failure becomes a failed [`PriceResult`] so one bad instrument cannot
//! take down a batch.

use std::sync::Arc;

use log::{debug, warn};

use crate::cache::{Freshness, TtlCache};
use crate::config::CacheConfig;
use crate::errors::PriceError;
use crate::fx::FxConverter;
use crate::models::{InstrumentDescriptor, Outcome, PriceResult, Quote};
use crate::registry::AdapterRegistry;

/// A resolved instrument: the result to hand back, plus how it was
/// obtained for batch statistics.
#[derive(Clone, Debug)]
pub struct Resolution {
    pub result: PriceResult,
    pub outcome: Outcome,
}

impl Resolution {
    fn failed(descriptor: &InstrumentDescriptor, error: &PriceError) -> Self {
        warn!(
            "pricing failed for '{}' via {}: {}",
            descriptor.label(),
            descriptor.price_source,
            error
        );
        Self {
            result: PriceResult::failed(descriptor.price_source, error.to_string()),
            outcome: Outcome::Failed,
        }
    }
}

/// Resolves one instrument at a time; shared by ad-hoc lookups and the
/// batch orchestrator so both hit the same cache.
pub struct PriceResolver {
    registry: Arc<AdapterRegistry>,
    fx: Arc<FxConverter>,
    cache: TtlCache<String, Quote>,
    cache_config: CacheConfig,
}

impl PriceResolver {
    pub fn new(
        registry: Arc<AdapterRegistry>,
        fx: Arc<FxConverter>,
        cache_config: CacheConfig,
    ) -> Self {
        Self {
            registry,
            fx,
            cache: TtlCache::new(cache_config.max_entries, cache_config.allow_stale_fallback),
            cache_config,
        }
    }

    /// Resolve the current price of one instrument.
    pub async fn resolve(&self, descriptor: &InstrumentDescriptor) -> Resolution {
        let source = descriptor.price_source;

        if source.is_manual() {
            debug!("skipping manual instrument '{}'", descriptor.label());
            return Resolution {
                result: PriceResult::skipped(source),
                outcome: Outcome::Skipped,
            };
        }

        let mapping = match descriptor.price_mapping.as_deref() {
            Some(mapping) if !mapping.is_empty() => mapping.to_string(),
            _ => {
                let error = PriceError::InvalidMapping {
                    provider: source.as_str(),
                    mapping: String::new(),
                };
                return Resolution::failed(descriptor, &error);
            }
        };

        // Quotes are cached per (source, mapping), so instruments sharing a
        // mapping share the entry and the in-flight fetch.
        let key = format!("{}:{}", source, mapping);
        let ttl = self.cache_config.ttl_for(source);
        let registry = Arc::clone(&self.registry);
        let fetch = async move { registry.fetch(source, &mapping).await };

        let hit = match self.cache.get_or_fetch(key, ttl, fetch).await {
            Ok(hit) => hit,
            Err(error) => return Resolution::failed(descriptor, &error),
        };

        let price_idr = match self.fx.to_base(hit.value.price, &hit.value.currency).await {
            Ok(price_idr) => price_idr,
            Err(error) => return Resolution::failed(descriptor, &error),
        };

        let (from_cache, stale, outcome) = match hit.freshness {
            Freshness::Fresh => (false, false, Outcome::Fresh),
            Freshness::Cached => (true, false, Outcome::Cached),
            Freshness::Stale => (true, true, Outcome::Stale),
        };

        Resolution {
            result: PriceResult::priced(&hit.value, price_idr, source, from_cache, stale),
            outcome,
        }
    }

    /// Validate an instrument's mapping without fetching anything.
    ///
    /// Manual instruments always validate; they have no mapping to check.
    pub fn validate(&self, descriptor: &InstrumentDescriptor) -> Result<(), PriceError> {
        let source = descriptor.price_source;
        if source.is_manual() {
            return Ok(());
        }
        let mapping = descriptor
            .price_mapping
            .as_deref()
            .filter(|mapping| !mapping.is_empty())
            .ok_or_else(|| PriceError::InvalidMapping {
                provider: source.as_str(),
                mapping: String::new(),
            })?;
        self.registry.validate_mapping(source, mapping)
    }

    #[cfg(test)]
    pub(crate) fn expire_cached(&self, source: crate::models::PriceSource, mapping: &str) {
        self.cache.force_expire(&format!("{}:{}", source, mapping));
    }
}
