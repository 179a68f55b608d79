//! Core data model for the pricing engine.
//!
//! This module contains:
//! - [`PriceSource`] / [`AssetType`] - tags identifying providers and asset classes
//! - [`InstrumentDescriptor`] / [`InstrumentRecord`] - engine input shapes
//! - [`Quote`] - the normalized result of one adapter call
//! - [`PriceResult`] / [`Outcome`] - per-instrument output and its classification
//! - [`BatchStats`] / [`BatchError`] - derived batch accounting

mod instrument;
mod quote;
mod result;
mod stats;

pub use instrument::{AssetType, InstrumentDescriptor, InstrumentRecord, PriceSource};
pub use quote::Quote;
pub use result::{Outcome, PriceResult};
pub use stats::{BatchError, BatchStats};
