use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::PriceError;

/// Price source tags.
///
/// Each tag names the external provider an instrument's price comes from.
/// `Manual` is a sentinel meaning "user-entered, never fetched" - it is not
/// backed by an adapter and the resolver skips it by design.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    /// User-entered price; the engine never fetches for this tag.
    Manual,
    /// Crypto market (Indodax, IDR pairs).
    Crypto,
    /// IDX equities.
    Stock,
    /// Mutual-fund NAV.
    MutualFund,
    /// Precious metals (gold).
    Gold,
    /// Government/retail bond reference price.
    Bond,
}

impl PriceSource {
    /// The persisted string form of this tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Crypto => "crypto",
            Self::Stock => "stock",
            Self::MutualFund => "mutual_fund",
            Self::Gold => "gold",
            Self::Bond => "bond",
        }
    }

    /// Whether this is the manual sentinel.
    pub fn is_manual(&self) -> bool {
        matches!(self, Self::Manual)
    }
}

impl fmt::Display for PriceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriceSource {
    type Err = PriceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Self::Manual),
            "crypto" => Ok(Self::Crypto),
            "stock" => Ok(Self::Stock),
            "mutual_fund" => Ok(Self::MutualFund),
            "gold" => Ok(Self::Gold),
            "bond" => Ok(Self::Bond),
            other => Err(PriceError::UnknownSource(other.to_string())),
        }
    }
}

/// Asset classification, used for ad-hoc lookups and attribution.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    Stock,
    MutualFund,
    Crypto,
    Bond,
    Gold,
    Property,
    Other,
}

impl AssetType {
    /// The source an ad-hoc quote for this asset type is fetched from.
    ///
    /// Returns `None` for asset types that have no fetchable source
    /// (property and anything uncategorized are manual-only).
    pub fn default_source(&self) -> Option<PriceSource> {
        match self {
            Self::Stock => Some(PriceSource::Stock),
            Self::MutualFund => Some(PriceSource::MutualFund),
            Self::Crypto => Some(PriceSource::Crypto),
            Self::Bond => Some(PriceSource::Bond),
            Self::Gold => Some(PriceSource::Gold),
            Self::Property | Self::Other => None,
        }
    }
}

/// What the engine is asked to price.
///
/// `price_mapping` is opaque to everything except the adapter matching
/// `price_source`. The descriptive fields are only used for logging and
/// error attribution.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentDescriptor {
    /// Stored instrument id; absent for ad-hoc lookups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Provider tag.
    pub price_source: PriceSource,

    /// Provider-specific key (ticker, fund code, pair id, series code).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_mapping: Option<String>,

    /// Asset classification.
    pub asset_type: AssetType,

    /// Display name, attribution only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Display symbol, attribution only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
}

impl InstrumentDescriptor {
    /// Best human-readable handle for logs and batch error entries.
    pub fn label(&self) -> &str {
        self.symbol
            .as_deref()
            .or(self.name.as_deref())
            .or(self.id.as_deref())
            .unwrap_or("<unnamed>")
    }

    /// Key under which this instrument appears in a batch result map.
    ///
    /// Prefers the stored id; ad-hoc instruments fall back to
    /// `source:mapping` so no result is ever dropped from the output.
    pub fn key(&self) -> String {
        if let Some(id) = &self.id {
            return id.clone();
        }
        format!(
            "{}:{}",
            self.price_source,
            self.price_mapping.as_deref().unwrap_or_default()
        )
    }
}

/// A persisted instrument row, as handed over by the storage layer.
///
/// The engine only reads it; writing `last_price`/`last_price_idr`/
/// `last_updated` back is the caller's job.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentRecord {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub asset_type: AssetType,
    pub price_source: PriceSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_mapping: Option<String>,
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_price_idr: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl From<&InstrumentRecord> for InstrumentDescriptor {
    fn from(record: &InstrumentRecord) -> Self {
        Self {
            id: Some(record.id.clone()),
            price_source: record.price_source,
            price_mapping: record.price_mapping.clone(),
            asset_type: record.asset_type,
            name: Some(record.name.clone()),
            symbol: Some(record.symbol.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_source_round_trip() {
        for source in [
            PriceSource::Manual,
            PriceSource::Crypto,
            PriceSource::Stock,
            PriceSource::MutualFund,
            PriceSource::Gold,
            PriceSource::Bond,
        ] {
            assert_eq!(source.as_str().parse::<PriceSource>().unwrap(), source);
        }
    }

    #[test]
    fn test_price_source_unknown_tag() {
        let err = "pegs".parse::<PriceSource>().unwrap_err();
        assert!(matches!(err, PriceError::UnknownSource(tag) if tag == "pegs"));
    }

    #[test]
    fn test_asset_type_default_source() {
        assert_eq!(
            AssetType::Crypto.default_source(),
            Some(PriceSource::Crypto)
        );
        assert_eq!(AssetType::Property.default_source(), None);
        assert_eq!(AssetType::Other.default_source(), None);
    }

    #[test]
    fn test_descriptor_key_prefers_id() {
        let descriptor = InstrumentDescriptor {
            id: Some("inst-1".to_string()),
            price_source: PriceSource::Crypto,
            price_mapping: Some("btcidr".to_string()),
            asset_type: AssetType::Crypto,
            name: None,
            symbol: Some("BTC".to_string()),
        };
        assert_eq!(descriptor.key(), "inst-1");
        assert_eq!(descriptor.label(), "BTC");
    }

    #[test]
    fn test_descriptor_key_fallback_for_adhoc() {
        let descriptor = InstrumentDescriptor {
            id: None,
            price_source: PriceSource::Stock,
            price_mapping: Some("BBCA".to_string()),
            asset_type: AssetType::Stock,
            name: None,
            symbol: None,
        };
        assert_eq!(descriptor.key(), "stock:BBCA");
        assert_eq!(descriptor.label(), "<unnamed>");
    }
}
