//! Error types and classification for the pricing crate.
//!
//! This module provides:
//! - [`PriceError`]: The main error enum for all pricing operations
//! - [`ErrorClass`]: Classification separating misconfiguration from transient faults

mod class;

pub use class::ErrorClass;

use thiserror::Error;

/// Errors that can occur while resolving instrument prices.
///
/// Each variant is classified via [`error_class`](Self::error_class), which
/// tells callers whether a retry could ever help. Inside batch resolution all
/// of these are converted into per-instrument error strings; none of them is
/// allowed to escape as a process-level fault.
#[derive(Error, Debug)]
pub enum PriceError {
    /// The price mapping is malformed for the adapter it was handed to.
    /// This is a misconfiguration - retrying won't help.
    ///
    /// The adapter id is named `provider` because `thiserror` reserves a
    /// field called `source` for the error cause chain.
    #[error("Invalid mapping for {provider}: {mapping}")]
    InvalidMapping {
        /// The adapter that rejected the mapping
        provider: &'static str,
        /// The offending mapping value
        mapping: String,
    },

    /// No adapter is registered for the requested price source tag.
    #[error("Unknown price source: {0}")]
    UnknownSource(String),

    /// An outbound call failed: transport error, provider-side error,
    /// unparseable payload, or timeout. Transient from the caller's
    /// point of view; adapters themselves never retry.
    #[error("Fetch failed: {provider} - {message}")]
    FetchFailed {
        /// The adapter that failed
        provider: &'static str,
        /// What went wrong
        message: String,
    },

    /// No FX rate could be obtained for the currency pair and no cached
    /// rate (even a stale one) exists.
    #[error("FX rate unavailable for {from}/{to}")]
    RateUnavailable {
        /// Quote currency of the instrument
        from: String,
        /// Base reporting currency
        to: String,
    },

    /// A provider returned data that failed validation (negative price,
    /// unrecognized currency code, zero rate).
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// The engine was assembled incorrectly (e.g. no adapters registered).
    /// Surfaces at startup, never per-request.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A network error occurred while talking to a provider.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl PriceError {
    /// Returns the classification for this error.
    ///
    /// # Examples
    ///
    /// ```
    /// use pundi_pricing::errors::{ErrorClass, PriceError};
    ///
    /// let error = PriceError::UnknownSource("pegs".to_string());
    /// assert_eq!(error.error_class(), ErrorClass::Permanent);
    ///
    /// let error = PriceError::FetchFailed {
    ///     provider: "INDODAX",
    ///     message: "connection reset".to_string(),
    /// };
    /// assert_eq!(error.error_class(), ErrorClass::Transient);
    /// ```
    pub fn error_class(&self) -> ErrorClass {
        match self {
            Self::InvalidMapping { .. }
            | Self::UnknownSource(_)
            | Self::InvalidData(_)
            | Self::Configuration(_) => ErrorClass::Permanent,

            Self::FetchFailed { .. } | Self::RateUnavailable { .. } | Self::Network(_) => {
                ErrorClass::Transient
            }
        }
    }
}
