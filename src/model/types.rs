//! Normalized entity structs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The three input datasets a run consumes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Dataset {
    Pharmacy,
    Claims,
    Reverts,
}

impl std::fmt::Display for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dataset::Pharmacy => write!(f, "pharmacy"),
            Dataset::Claims => write!(f, "claims"),
            Dataset::Reverts => write!(f, "reverts"),
        }
    }
}

/// Where a raw record came from.
///
/// `entry` is the CSV line number for pharmacy rows and the 1-based array
/// position for JSON rows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Origin {
    pub file: PathBuf,
    pub entry: u64,
}

impl Origin {
    pub fn new(file: impl Into<PathBuf>, entry: u64) -> Self {
        Self {
            file: file.into(),
            entry,
        }
    }
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.entry)
    }
}

/// A decoded but unvalidated input row.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub origin: Origin,
    pub value: serde_json::Value,
}

impl RawRecord {
    pub fn new(origin: Origin, value: serde_json::Value) -> Self {
        Self { origin, value }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PharmacyRecord {
    pub npi: String,
    pub chain: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClaimRecord {
    pub id: String,
    pub npi: String,
    pub ndc: String,
    pub price: f64,
    /// Always strictly positive once validated.
    pub quantity: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RevertRecord {
    pub id: String,
    pub claim_id: String,
    pub timestamp: DateTime<Utc>,
}

/// A claim that survived the pharmacy join.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedClaim {
    pub id: String,
    pub npi: String,
    pub ndc: String,
    pub chain: String,
    pub price: f64,
    pub quantity: f64,
    pub unit_price: f64,
    pub reverted: bool,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{from_value, json, to_value};

    #[test]
    fn dataset_display_matches_serde_name() {
        for dataset in [Dataset::Pharmacy, Dataset::Claims, Dataset::Reverts] {
            let serialized = to_value(dataset).unwrap();
            assert_eq!(serialized, json!(dataset.to_string()));
            let back: Dataset = from_value(serialized).unwrap();
            assert_eq!(back, dataset);
        }
    }

    #[test]
    fn origin_display_is_file_colon_entry() {
        let origin = Origin::new("data/claims/a.json", 7);
        assert_eq!(origin.to_string(), "data/claims/a.json:7");
    }

    #[test]
    fn claim_record_serializes_timestamp_as_rfc3339() {
        let claim = ClaimRecord {
            id: "c1".into(),
            npi: "0000000000".into(),
            ndc: "D1".into(),
            price: 10.0,
            quantity: 2.0,
            timestamp: "2024-03-11T14:07:27Z".parse().unwrap(),
        };
        let value = to_value(&claim).unwrap();
        assert_eq!(value["timestamp"], json!("2024-03-11T14:07:27Z"));
    }
}
