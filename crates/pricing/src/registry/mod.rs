//! Adapter registry with per-source concurrency and rate limiting.
//!
//! The registry owns one adapter per fetchable price source. All fetches go
//! through it so the per-source limits an adapter declares are enforced in
//! one place: a semaphore caps concurrent requests and a token bucket caps
//! request rate, and every fetch runs under a hard timeout.

mod rate_limiter;

pub use rate_limiter::SourceRateLimiter;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::Semaphore;

use crate::adapter::SourceAdapter;
use crate::errors::PriceError;
use crate::models::{PriceSource, Quote};

struct RegisteredSource {
    adapter: Arc<dyn SourceAdapter>,
    concurrency: Arc<Semaphore>,
}

/// One adapter per price source, with shared limit enforcement.
pub struct AdapterRegistry {
    sources: HashMap<PriceSource, RegisteredSource>,
    limiter: SourceRateLimiter,
    fetch_timeout: Duration,
}

impl AdapterRegistry {
    pub fn new(fetch_timeout: Duration) -> Self {
        Self {
            sources: HashMap::new(),
            limiter: SourceRateLimiter::new(),
            fetch_timeout,
        }
    }

    /// Register an adapter for the source it declares.
    ///
    /// Fails with [`PriceError::Configuration`] when the source already has
    /// an adapter, or when the adapter claims the manual source.
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) -> Result<(), PriceError> {
        let source = adapter.source();
        if source.is_manual() {
            return Err(PriceError::Configuration(format!(
                "adapter '{}' cannot register for the manual source",
                adapter.id()
            )));
        }
        if self.sources.contains_key(&source) {
            return Err(PriceError::Configuration(format!(
                "duplicate adapter for source '{}'",
                source
            )));
        }

        let limit = adapter.rate_limit();
        debug!(
            "registering adapter '{}' for source '{}' ({} req/min, {} concurrent)",
            adapter.id(),
            source,
            limit.requests_per_minute,
            limit.max_concurrency
        );
        self.limiter.configure(source, &limit);
        self.sources.insert(
            source,
            RegisteredSource {
                concurrency: Arc::new(Semaphore::new(limit.max_concurrency.max(1))),
                adapter,
            },
        );
        Ok(())
    }

    /// Whether a fetchable adapter exists for `source`.
    pub fn supports(&self, source: PriceSource) -> bool {
        self.sources.contains_key(&source)
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    fn get(&self, source: PriceSource) -> Result<&RegisteredSource, PriceError> {
        self.sources
            .get(&source)
            .ok_or_else(|| PriceError::UnknownSource(source.to_string()))
    }

    /// Check a mapping against the adapter's rules without fetching.
    pub fn validate_mapping(&self, source: PriceSource, mapping: &str) -> Result<(), PriceError> {
        self.get(source)?.adapter.validate_mapping(mapping)
    }

    /// Fetch a quote for `mapping` through the adapter for `source`.
    ///
    /// Waits for a concurrency permit and a rate-limit token, then runs the
    /// adapter fetch under the registry timeout. The returned quote has
    /// already passed [`Quote::validate`].
    pub async fn fetch(&self, source: PriceSource, mapping: &str) -> Result<Quote, PriceError> {
        let registered = self.get(source)?;
        registered.adapter.validate_mapping(mapping)?;

        let _permit = registered
            .concurrency
            .acquire()
            .await
            .map_err(|_| PriceError::Configuration(format!("semaphore closed for '{}'", source)))?;
        self.limiter.acquire(source).await;

        let quote = tokio::time::timeout(self.fetch_timeout, registered.adapter.fetch(mapping))
            .await
            .map_err(|_| {
                warn!(
                    "fetch from '{}' for '{}' timed out after {:?}",
                    registered.adapter.id(),
                    mapping,
                    self.fetch_timeout
                );
                PriceError::FetchFailed {
                    provider: registered.adapter.id(),
                    message: format!("timed out after {:?}", self.fetch_timeout),
                }
            })??;

        quote.validate()?;
        Ok(quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockAdapter {
        source: PriceSource,
        calls: Arc<AtomicUsize>,
        delay: Duration,
    }

    impl MockAdapter {
        fn new(source: PriceSource) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    source,
                    calls: Arc::clone(&calls),
                    delay: Duration::ZERO,
                },
                calls,
            )
        }
    }

    #[async_trait]
    impl SourceAdapter for MockAdapter {
        fn id(&self) -> &'static str {
            "MOCK"
        }

        fn source(&self) -> PriceSource {
            self.source
        }

        fn validate_mapping(&self, mapping: &str) -> Result<(), PriceError> {
            if mapping.is_empty() {
                return Err(PriceError::InvalidMapping {
                    provider: self.id(),
                    mapping: mapping.to_string(),
                });
            }
            Ok(())
        }

        async fn fetch(&self, _mapping: &str) -> Result<Quote, PriceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.delay > Duration::ZERO {
                tokio::time::sleep(self.delay).await;
            }
            Ok(Quote::new(dec!(100), "IDR", Utc::now()))
        }
    }

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_fetch_routes_to_registered_adapter() {
        let mut registry = AdapterRegistry::new(TIMEOUT);
        let (adapter, calls) = MockAdapter::new(PriceSource::Crypto);
        registry.register(Arc::new(adapter)).unwrap();

        let quote = registry.fetch(PriceSource::Crypto, "btc_idr").await.unwrap();
        assert_eq!(quote.price, dec!(100));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_source_is_rejected() {
        let registry = AdapterRegistry::new(TIMEOUT);
        let error = registry.fetch(PriceSource::Stock, "BBCA").await.unwrap_err();
        assert!(matches!(error, PriceError::UnknownSource(_)));
    }

    #[tokio::test]
    async fn test_invalid_mapping_never_reaches_adapter() {
        let mut registry = AdapterRegistry::new(TIMEOUT);
        let (adapter, calls) = MockAdapter::new(PriceSource::Stock);
        registry.register(Arc::new(adapter)).unwrap();

        let error = registry.fetch(PriceSource::Stock, "").await.unwrap_err();
        assert!(matches!(error, PriceError::InvalidMapping { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_duplicate_registration_is_rejected() {
        let mut registry = AdapterRegistry::new(TIMEOUT);
        let (first, _) = MockAdapter::new(PriceSource::Gold);
        let (second, _) = MockAdapter::new(PriceSource::Gold);

        registry.register(Arc::new(first)).unwrap();
        let error = registry.register(Arc::new(second)).unwrap_err();
        assert!(matches!(error, PriceError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_manual_source_cannot_register() {
        let mut registry = AdapterRegistry::new(TIMEOUT);
        let (adapter, _) = MockAdapter::new(PriceSource::Manual);
        let error = registry.register(Arc::new(adapter)).unwrap_err();
        assert!(matches!(error, PriceError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_slow_adapter_times_out() {
        let mut registry = AdapterRegistry::new(Duration::from_millis(20));
        let (mut adapter, _) = MockAdapter::new(PriceSource::Bond);
        adapter.delay = Duration::from_secs(10);
        registry.register(Arc::new(adapter)).unwrap();

        let error = registry.fetch(PriceSource::Bond, "FR0098").await.unwrap_err();
        assert!(matches!(error, PriceError::FetchFailed { .. }));
    }
}
