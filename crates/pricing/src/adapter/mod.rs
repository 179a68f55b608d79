//! Source adapter abstractions and implementations.
//!
//! One adapter per price provider. An adapter translates an instrument's
//! mapping into a provider-specific request and normalizes the raw
//! response into a [`Quote`]. Adapters are single-attempt and
//! side-effect-free on failure; retry policy belongs to the caller.
//!
//! The `manual` source tag has no adapter on purpose - the resolver skips
//! it before ever consulting the registry.

mod bareksa_nav;
mod bond_ibpa;
mod goapi_stock;
mod indodax;
mod metal_price;

pub use bareksa_nav::BareksaNavAdapter;
pub use bond_ibpa::BondIbpaAdapter;
pub use goapi_stock::GoapiStockAdapter;
pub use indodax::IndodaxAdapter;
pub use metal_price::MetalPriceAdapter;

use async_trait::async_trait;

use crate::errors::PriceError;
use crate::models::{PriceSource, Quote};

/// Rate limiting configuration for an adapter.
///
/// Controls how aggressively the registry may call a provider to avoid
/// hitting its limits and getting blocked.
#[derive(Clone, Debug)]
pub struct RateLimit {
    /// Maximum requests allowed per minute.
    pub requests_per_minute: u32,

    /// Maximum concurrent outbound calls to this provider; excess
    /// instruments queue instead of firing unboundedly.
    pub max_concurrency: usize,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            max_concurrency: 4,
        }
    }
}

/// Trait for price source adapters.
///
/// Implement this to add support for a new provider; the registry maps a
/// [`PriceSource`] tag to its adapter, so adding a provider never touches
/// the resolver.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Unique identifier, a constant like "INDODAX". Used for logging and
    /// error attribution.
    fn id(&self) -> &'static str;

    /// The source tag this adapter serves.
    fn source(&self) -> PriceSource;

    /// Rate limits the registry should apply to this provider.
    fn rate_limit(&self) -> RateLimit {
        RateLimit::default()
    }

    /// Check that `mapping` is well-formed for this provider.
    ///
    /// Fails with [`PriceError::InvalidMapping`], a permanent error - the
    /// registry rejects the mapping before any outbound call is made.
    fn validate_mapping(&self, mapping: &str) -> Result<(), PriceError>;

    /// Fetch the current quote for `mapping`.
    ///
    /// One outbound call, bounded by the HTTP client's timeout. Transport
    /// and parse failures surface as [`PriceError::FetchFailed`].
    async fn fetch(&self, mapping: &str) -> Result<Quote, PriceError>;
}
