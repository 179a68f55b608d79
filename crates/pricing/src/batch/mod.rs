//! Batch price resolution with bounded fan-out.
//!
//! Resolves many instruments concurrently while keeping failures isolated:
//! every instrument ends up in the result map with either a price or an
//! error, and a panic inside one resolution is caught and reported as that
//! instrument's failure instead of aborting the batch.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use futures::FutureExt;
use log::{debug, error, info, warn};
use tokio::time::Instant;

use crate::config::BatchConfig;
use crate::models::{BatchStats, InstrumentDescriptor, Outcome, PriceResult};
use crate::resolver::{PriceResolver, Resolution};

/// Everything a batch run produces: per-instrument results keyed by
/// [`InstrumentDescriptor::key`], plus the aggregate statistics.
#[derive(Clone, Debug)]
pub struct BatchOutcome {
    pub results: HashMap<String, PriceResult>,
    pub stats: BatchStats,
}

/// Fans instrument resolution out over the shared resolver.
pub struct BatchOrchestrator {
    resolver: Arc<PriceResolver>,
    config: BatchConfig,
}

impl BatchOrchestrator {
    pub fn new(resolver: Arc<PriceResolver>, config: BatchConfig) -> Self {
        Self { resolver, config }
    }

    /// Resolve a whole batch of instruments.
    ///
    /// Concurrency is capped at the configured width; per-source outbound
    /// limits are enforced further down by the registry. With a deadline
    /// configured, instruments not resolved in time are reported as failed
    /// rather than dropped.
    pub async fn run(&self, descriptors: Vec<InstrumentDescriptor>) -> BatchOutcome {
        let total = descriptors.len();
        info!(
            "pricing batch of {} instruments (concurrency {})",
            total, self.config.max_concurrency
        );
        let mut by_source: HashMap<&str, usize> = HashMap::new();
        for descriptor in &descriptors {
            *by_source.entry(descriptor.price_source.as_str()).or_default() += 1;
        }
        for (source, count) in &by_source {
            debug!("batch: {} instruments via {}", count, source);
        }
        let deadline = self.config.deadline.map(|limit| Instant::now() + limit);

        let resolutions: Vec<(InstrumentDescriptor, Resolution)> = stream::iter(descriptors)
            .map(|descriptor| {
                let resolver = Arc::clone(&self.resolver);
                async move {
                    let resolution = Self::resolve_guarded(&resolver, &descriptor, deadline).await;
                    (descriptor, resolution)
                }
            })
            .buffer_unordered(self.config.max_concurrency.max(1))
            .collect()
            .await;

        let mut stats = BatchStats {
            total,
            ..Default::default()
        };
        let mut results = HashMap::with_capacity(total);
        for (descriptor, resolution) in resolutions {
            stats.record(&descriptor, resolution.outcome, &resolution.result);
            results.insert(descriptor.key(), resolution.result);
        }

        info!(
            "batch done: {} fresh, {} cached, {} skipped, {} failed of {}",
            stats.success, stats.cached, stats.skipped, stats.failed, stats.total
        );
        BatchOutcome { results, stats }
    }

    /// One resolution, shielded from the rest of the batch.
    async fn resolve_guarded(
        resolver: &PriceResolver,
        descriptor: &InstrumentDescriptor,
        deadline: Option<Instant>,
    ) -> Resolution {
        let resolve = std::panic::AssertUnwindSafe(resolver.resolve(descriptor)).catch_unwind();

        let caught = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, resolve).await {
                Ok(caught) => caught,
                Err(_) => {
                    warn!(
                        "batch deadline exceeded before '{}' resolved",
                        descriptor.label()
                    );
                    return Resolution {
                        result: PriceResult::failed(
                            descriptor.price_source,
                            "batch deadline exceeded",
                        ),
                        outcome: Outcome::Failed,
                    };
                }
            },
            None => resolve.await,
        };

        match caught {
            Ok(resolution) => resolution,
            Err(_) => {
                error!("panic while pricing '{}'", descriptor.label());
                Resolution {
                    result: PriceResult::failed(
                        descriptor.price_source,
                        "internal error while pricing",
                    ),
                    outcome: Outcome::Failed,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::SourceAdapter;
    use crate::config::CacheConfig;
    use crate::errors::PriceError;
    use crate::fx::{FxConverter, RateSource};
    use crate::models::{AssetType, PriceSource, Quote};
    use crate::registry::AdapterRegistry;
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct StaticAdapter {
        source: PriceSource,
        behavior: Behavior,
    }

    enum Behavior {
        Price(Decimal),
        Fail,
        Panic,
        Hang,
    }

    #[async_trait]
    impl SourceAdapter for StaticAdapter {
        fn id(&self) -> &'static str {
            "STATIC"
        }

        fn source(&self) -> PriceSource {
            self.source
        }

        fn validate_mapping(&self, _mapping: &str) -> Result<(), PriceError> {
            Ok(())
        }

        async fn fetch(&self, _mapping: &str) -> Result<Quote, PriceError> {
            match self.behavior {
                Behavior::Price(price) => Ok(Quote::new(price, "IDR", Utc::now())),
                Behavior::Fail => Err(PriceError::FetchFailed {
                    provider: self.id(),
                    message: "HTTP 503".to_string(),
                }),
                Behavior::Panic => panic!("adapter bug"),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    unreachable!()
                }
            }
        }
    }

    struct IdentityRates;

    #[async_trait]
    impl RateSource for IdentityRates {
        fn id(&self) -> &'static str {
            "IDENTITY"
        }

        async fn rate(&self, _from: &str, _to: &str) -> Result<Decimal, PriceError> {
            Ok(Decimal::ONE)
        }
    }

    fn orchestrator(adapters: Vec<StaticAdapter>, config: BatchConfig) -> BatchOrchestrator {
        let mut registry = AdapterRegistry::new(Duration::from_secs(5));
        for adapter in adapters {
            registry.register(Arc::new(adapter)).unwrap();
        }
        let fx = Arc::new(FxConverter::new(
            "IDR",
            Arc::new(IdentityRates),
            Duration::from_secs(3600),
            64,
        ));
        let resolver = Arc::new(PriceResolver::new(
            Arc::new(registry),
            fx,
            CacheConfig::default(),
        ));
        BatchOrchestrator::new(resolver, config)
    }

    fn descriptor(id: &str, source: PriceSource, mapping: Option<&str>) -> InstrumentDescriptor {
        InstrumentDescriptor {
            id: Some(id.to_string()),
            price_source: source,
            price_mapping: mapping.map(str::to_string),
            asset_type: AssetType::Other,
            name: None,
            symbol: Some(id.to_string()),
        }
    }

    #[tokio::test]
    async fn test_partial_failure_is_isolated() {
        let orchestrator = orchestrator(
            vec![
                StaticAdapter {
                    source: PriceSource::Crypto,
                    behavior: Behavior::Price(dec!(950000000)),
                },
                StaticAdapter {
                    source: PriceSource::MutualFund,
                    behavior: Behavior::Fail,
                },
            ],
            BatchConfig::default(),
        );

        let outcome = orchestrator
            .run(vec![
                descriptor("btc", PriceSource::Crypto, Some("btc_idr")),
                descriptor("fund", PriceSource::MutualFund, Some("RD-123")),
                descriptor("house", PriceSource::Manual, None),
            ])
            .await;

        assert_eq!(outcome.stats.total, 3);
        assert_eq!(outcome.stats.success, 1);
        assert_eq!(outcome.stats.failed, 1);
        assert_eq!(outcome.stats.skipped, 1);
        assert_eq!(outcome.results.len(), 3);
        assert!(outcome.results["btc"].is_priced());
        assert!(outcome.results["fund"].error.is_some());
        assert_eq!(outcome.stats.errors.len(), 1);
        assert_eq!(outcome.stats.errors[0].instrument, "fund");
    }

    #[tokio::test]
    async fn test_panic_in_one_resolution_does_not_abort_batch() {
        let orchestrator = orchestrator(
            vec![
                StaticAdapter {
                    source: PriceSource::Stock,
                    behavior: Behavior::Price(dec!(9700)),
                },
                StaticAdapter {
                    source: PriceSource::Bond,
                    behavior: Behavior::Panic,
                },
            ],
            BatchConfig::default(),
        );

        let outcome = orchestrator
            .run(vec![
                descriptor("bbca", PriceSource::Stock, Some("BBCA")),
                descriptor("fr98", PriceSource::Bond, Some("FR0098")),
            ])
            .await;

        assert_eq!(outcome.stats.success, 1);
        assert_eq!(outcome.stats.failed, 1);
        assert!(outcome.results["bbca"].is_priced());
        assert!(outcome.results["fr98"]
            .error
            .as_deref()
            .unwrap()
            .contains("internal error"));
    }

    #[tokio::test]
    async fn test_deadline_reports_unresolved_as_failed() {
        let orchestrator = orchestrator(
            vec![StaticAdapter {
                source: PriceSource::Gold,
                behavior: Behavior::Hang,
            }],
            BatchConfig {
                max_concurrency: 4,
                deadline: Some(Duration::from_millis(50)),
            },
        );

        let outcome = orchestrator
            .run(vec![descriptor("xau", PriceSource::Gold, Some("XAU"))])
            .await;

        assert_eq!(outcome.stats.failed, 1);
        assert!(outcome.results["xau"]
            .error
            .as_deref()
            .unwrap()
            .contains("deadline"));
    }

    struct RecoveringAdapter {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SourceAdapter for RecoveringAdapter {
        fn id(&self) -> &'static str {
            "RECOVERING"
        }

        fn source(&self) -> PriceSource {
            PriceSource::Stock
        }

        fn validate_mapping(&self, _mapping: &str) -> Result<(), PriceError> {
            Ok(())
        }

        async fn fetch(&self, _mapping: &str) -> Result<Quote, PriceError> {
            // First call is slow and fails; later calls succeed instantly.
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(80)).await;
                return Err(PriceError::FetchFailed {
                    provider: self.id(),
                    message: "warming up".to_string(),
                });
            }
            Ok(Quote::new(dec!(9700), "IDR", Utc::now()))
        }
    }

    #[tokio::test]
    async fn test_deadline_abandoned_fetch_does_not_wedge_key() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = AdapterRegistry::new(Duration::from_secs(5));
        registry
            .register(Arc::new(RecoveringAdapter {
                calls: Arc::clone(&calls),
            }))
            .unwrap();
        let fx = Arc::new(FxConverter::new(
            "IDR",
            Arc::new(IdentityRates),
            Duration::from_secs(3600),
            64,
        ));
        let resolver = Arc::new(PriceResolver::new(
            Arc::new(registry),
            fx,
            CacheConfig::default(),
        ));
        let orchestrator = BatchOrchestrator::new(
            resolver,
            BatchConfig {
                max_concurrency: 4,
                deadline: Some(Duration::from_millis(20)),
            },
        );

        let first = orchestrator
            .run(vec![descriptor("bbca", PriceSource::Stock, Some("BBCA"))])
            .await;
        assert_eq!(first.stats.failed, 1);

        // Let the abandoned fetch run out before retrying.
        tokio::time::sleep(Duration::from_millis(120)).await;

        let second = orchestrator
            .run(vec![descriptor("bbca", PriceSource::Stock, Some("BBCA"))])
            .await;
        assert_eq!(second.stats.success, 1);
        assert!(second.results["bbca"].is_priced());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_duplicate_mappings_share_one_result_key() {
        let orchestrator = orchestrator(
            vec![StaticAdapter {
                source: PriceSource::Crypto,
                behavior: Behavior::Price(dec!(1)),
            }],
            BatchConfig::default(),
        );

        // Two stored instruments with distinct ids but the same mapping.
        let outcome = orchestrator
            .run(vec![
                descriptor("a", PriceSource::Crypto, Some("eth_idr")),
                descriptor("b", PriceSource::Crypto, Some("eth_idr")),
            ])
            .await;

        assert_eq!(outcome.results.len(), 2);
        assert!(outcome.results["a"].is_priced());
        assert!(outcome.results["b"].is_priced());
    }
}
