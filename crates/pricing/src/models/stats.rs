use serde::{Deserialize, Serialize};

use super::{InstrumentDescriptor, Outcome, PriceResult, PriceSource};

/// One actionable batch error entry: enough context to act on without
/// re-deriving anything from logs.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchError {
    /// Instrument symbol or name.
    pub instrument: String,
    /// Source the fetch was attempted against.
    pub source: PriceSource,
    /// The mapping that was used, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping: Option<String>,
    /// The error message.
    pub error: String,
}

/// Aggregate statistics for one batch run. Purely derived; recomputed per
/// call and never persisted. The host's HTTP layer serializes this
/// directly as the job-run summary.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStats {
    /// Instruments in the batch.
    pub total: usize,
    /// Fetched fresh.
    pub success: usize,
    /// Error surfaced.
    pub failed: usize,
    /// Manual source, designed no-op.
    pub skipped: usize,
    /// Served from cache (live entry or stale fallback).
    pub cached: usize,
    /// Per-instrument error details.
    pub errors: Vec<BatchError>,
    /// Ids of instruments that obtained a price; the caller persists
    /// their `lastPrice`/`lastPriceIDR`/`lastUpdated` from the results.
    pub updated: Vec<String>,
}

impl BatchStats {
    /// Account for one resolved instrument.
    pub fn record(
        &mut self,
        descriptor: &InstrumentDescriptor,
        outcome: Outcome,
        result: &PriceResult,
    ) {
        match outcome {
            Outcome::Fresh => self.success += 1,
            Outcome::Cached | Outcome::Stale => self.cached += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Failed => {
                self.failed += 1;
                self.errors.push(BatchError {
                    instrument: descriptor.label().to_string(),
                    source: descriptor.price_source,
                    mapping: descriptor.price_mapping.clone(),
                    error: result
                        .error
                        .clone()
                        .unwrap_or_else(|| "unknown error".to_string()),
                });
            }
        }
        if result.is_priced() {
            if let Some(id) = &descriptor.id {
                self.updated.push(id.clone());
            }
        }
    }
}
