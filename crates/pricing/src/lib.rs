//! Pundi Pricing Crate
//!
//! On-demand price aggregation for a personal-finance portfolio: fetch the
//! current price of every tracked instrument from its provider, convert to
//! the base reporting currency (IDR), and cache aggressively so a portfolio
//! refresh costs a handful of upstream calls.
//!
//! # Overview
//!
//! The pricing crate supports:
//! - Multiple instrument sources: IDX equities, mutual-fund NAV, crypto,
//!   gold, government bonds, plus user-entered manual prices
//! - Per-source rate limiting and concurrency caps
//! - Single-flight quote caching with per-source TTLs
//! - Batch resolution with per-instrument failure isolation
//!
//! # Architecture
//!
//! ```text
//! +------------------+     +------------------+
//! |  PricingService  | --> | BatchOrchestrator|  (bounded fan-out)
//! +------------------+     +------------------+
//!                                  |
//!                                  v
//!                          +------------------+
//!                          |  PriceResolver   |  (one instrument)
//!                          +------------------+
//!                               |        |
//!                               v        v
//!                      +----------+  +-------------+
//!                      | TtlCache |  | FxConverter |  (to IDR)
//!                      +----------+  +-------------+
//!                               |
//!                               v
//!                          +------------------+
//!                          | AdapterRegistry  |  (limits, timeout)
//!                          +------------------+
//!                                  |
//!                                  v
//!                          +------------------+
//!                          |  SourceAdapter   |  (Indodax, GoAPI, ...)
//!                          +------------------+
//! ```
//!
//! # Core Types
//!
//! - [`PricingService`] - engine facade, constructed once at startup
//! - [`InstrumentDescriptor`] - what to price (source tag + mapping)
//! - [`Quote`] - normalized provider response
//! - [`PriceResult`] - per-instrument outcome, price or error, never both
//! - [`BatchStats`] - aggregate statistics for one batch run

pub mod adapter;
pub mod batch;
pub mod cache;
pub mod config;
pub mod errors;
pub mod fx;
pub mod models;
pub mod registry;
pub mod resolver;
pub mod service;

// Re-export the model types
pub use models::{
    AssetType, BatchError, BatchStats, InstrumentDescriptor, InstrumentRecord, Outcome,
    PriceResult, PriceSource, Quote,
};

// Re-export the error types
pub use errors::{ErrorClass, PriceError};

// Re-export the adapter implementations
pub use adapter::{
    BareksaNavAdapter, BondIbpaAdapter, GoapiStockAdapter, IndodaxAdapter, MetalPriceAdapter,
    RateLimit, SourceAdapter,
};

// Re-export the engine types
pub use batch::{BatchOrchestrator, BatchOutcome};
pub use cache::{Freshness, Hit, TtlCache};
pub use config::{BatchConfig, CacheConfig, PricingConfig, BASE_CURRENCY};
pub use fx::{ExchangeRateHostSource, FxConverter, RateSource};
pub use registry::{AdapterRegistry, SourceRateLimiter};
pub use resolver::{PriceResolver, Resolution};
pub use service::PricingService;
