//! Engine facade.
//!
//! [`PricingService`] owns the adapter registry, the FX converter, the
//! shared quote cache and the batch orchestrator. Constructed once at
//! process start; misconfiguration (no adapters, duplicate sources) fails
//! fast here instead of per request.

use std::sync::Arc;

use log::{debug, info};

use crate::adapter::SourceAdapter;
use crate::batch::{BatchOrchestrator, BatchOutcome};
use crate::config::{PricingConfig, BASE_CURRENCY};
use crate::errors::PriceError;
use crate::fx::{FxConverter, RateSource};
use crate::models::{AssetType, InstrumentDescriptor, InstrumentRecord, PriceResult, PriceSource};
use crate::registry::AdapterRegistry;
use crate::resolver::{PriceResolver, Resolution};

/// The pricing engine.
pub struct PricingService {
    resolver: Arc<PriceResolver>,
    orchestrator: BatchOrchestrator,
    config: PricingConfig,
}

impl PricingService {
    /// Build the engine from its adapters and FX rate source.
    ///
    /// Fails with [`PriceError::Configuration`] when no adapters are given
    /// or two adapters claim the same source.
    pub fn new(
        adapters: Vec<Arc<dyn SourceAdapter>>,
        rate_source: Arc<dyn RateSource>,
        config: PricingConfig,
    ) -> Result<Self, PriceError> {
        if adapters.is_empty() {
            return Err(PriceError::Configuration(
                "no source adapters registered".to_string(),
            ));
        }

        let mut registry = AdapterRegistry::new(config.fetch_timeout);
        for adapter in adapters {
            registry.register(adapter)?;
        }

        let fx = Arc::new(FxConverter::new(
            BASE_CURRENCY,
            rate_source,
            config.fx_rate_ttl,
            config.cache.max_entries,
        ));
        let resolver = Arc::new(PriceResolver::new(
            Arc::new(registry),
            fx,
            config.cache.clone(),
        ));
        let orchestrator = BatchOrchestrator::new(Arc::clone(&resolver), config.batch.clone());

        info!("pricing engine ready (base currency {})", BASE_CURRENCY);
        Ok(Self {
            resolver,
            orchestrator,
            config,
        })
    }

    pub fn config(&self) -> &PricingConfig {
        &self.config
    }

    /// Ad-hoc quote for an instrument not (yet) stored.
    ///
    /// The symbol is normalized into the default source's mapping format.
    /// Returns `None` when the asset type has no fetchable source - that is
    /// a not-found, not an error.
    pub async fn get_instrument_price(
        &self,
        instrument_id: Option<String>,
        asset_type: AssetType,
        symbol: &str,
    ) -> Option<PriceResult> {
        let source = asset_type.default_source()?;
        let mapping = adhoc_mapping(source, symbol);
        debug!(
            "ad-hoc lookup for '{}' via {} as '{}'",
            symbol, source, mapping
        );

        let descriptor = InstrumentDescriptor {
            id: instrument_id,
            price_source: source,
            price_mapping: Some(mapping),
            asset_type,
            name: None,
            symbol: Some(symbol.to_string()),
        };
        Some(self.resolver.resolve(&descriptor).await.result)
    }

    /// Resolve one stored instrument.
    pub async fn resolve_instrument(&self, descriptor: &InstrumentDescriptor) -> Resolution {
        self.resolver.resolve(descriptor).await
    }

    /// Check a descriptor's mapping against its adapter without fetching.
    pub fn validate_instrument(&self, descriptor: &InstrumentDescriptor) -> Result<(), PriceError> {
        self.resolver.validate(descriptor)
    }

    /// Price a batch of stored instruments.
    ///
    /// Inactive records are left out entirely; the caller persists prices
    /// for the ids in `stats.updated` from the returned results.
    pub async fn batch_get_prices(&self, records: &[InstrumentRecord]) -> BatchOutcome {
        let descriptors: Vec<InstrumentDescriptor> = records
            .iter()
            .filter(|record| record.is_active)
            .map(InstrumentDescriptor::from)
            .collect();
        self.orchestrator.run(descriptors).await
    }
}

/// Normalize an ad-hoc symbol into the mapping format its source expects.
fn adhoc_mapping(source: PriceSource, symbol: &str) -> String {
    let symbol = symbol.trim();
    match source {
        PriceSource::Crypto => {
            // Indodax pair ids are lowercase and quoted in IDR.
            let lower = symbol.to_lowercase();
            if lower.ends_with("idr") {
                lower
            } else {
                format!("{}_idr", lower)
            }
        }
        PriceSource::Stock | PriceSource::Gold | PriceSource::Bond => symbol.to_uppercase(),
        PriceSource::MutualFund | PriceSource::Manual => symbol.to_string(),
    }
}
