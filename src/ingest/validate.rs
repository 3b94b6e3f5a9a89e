//! Record validation.
//!
//! Turns decoded [`RawRecord`]s into typed pharmacy, claim and revert sets.
//! A record that fails any field check is dropped and reported as a
//! [`Rejection`]; nothing in here aborts the run.
//!
//! Duplicate identifiers within a dataset resolve to the last record seen.
//! The replacement keeps the slot of the first occurrence so iteration order
//! is the order in which identifiers first appeared.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::{ClaimRecord, Dataset, Origin, PharmacyRecord, RawRecord, RevertRecord};

use super::RawBatches;

// ---------------------------------------------------------------------------
// Rejections
// ---------------------------------------------------------------------------

/// Why a single record was dropped.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RejectReason {
    #[error("record is not an object")]
    NotAnObject,

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` must be {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("field `{0}` is empty")]
    EmptyField(&'static str),

    #[error("field `{0}` is not a finite number")]
    NotFinite(&'static str),

    #[error("price {0} is negative")]
    NegativePrice(f64),

    /// Would make the unit price undefined.
    #[error("quantity {0} is not positive")]
    NonPositiveQuantity(f64),

    /// Large enough to overflow the derived unit price or group sums.
    #[error("field `{field}` value {value} is outside the accepted range")]
    OutOfRange { field: &'static str, value: f64 },

    #[error("unparseable timestamp `{0}`")]
    BadTimestamp(String),
}

/// A dropped record together with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub dataset: Dataset,
    pub origin: Origin,
    pub reason: RejectReason,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} record at {}: {}", self.dataset, self.origin, self.reason)
    }
}

// ---------------------------------------------------------------------------
// Keyed record sets
// ---------------------------------------------------------------------------

/// Insertion-ordered set of records keyed by identifier, last write wins.
#[derive(Debug, Clone)]
pub struct RecordSet<T> {
    items: Vec<T>,
    index: HashMap<String, usize>,
}

impl<T> Default for RecordSet<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T> RecordSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `item` under `key`. Returns `true` when an earlier record with
    /// the same key was replaced.
    pub fn upsert(&mut self, key: String, item: T) -> bool {
        match self.index.get(&key) {
            Some(&slot) => {
                self.items[slot] = item;
                true
            }
            None => {
                self.index.insert(key, self.items.len());
                self.items.push(item);
                false
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.index.get(key).map(|&slot| &self.items[slot])
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<'a, T> IntoIterator for &'a RecordSet<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// Per-dataset validation counters.
///
/// `accepted` counts every record that passed validation, including the
/// ones that later replaced an earlier duplicate, so the resulting set holds
/// `accepted - duplicates` records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DatasetStats {
    pub seen: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub duplicates: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ValidationStats {
    pub pharmacy: DatasetStats,
    pub claims: DatasetStats,
    pub reverts: DatasetStats,
}

impl ValidationStats {
    pub fn total_rejected(&self) -> usize {
        self.pharmacy.rejected + self.claims.rejected + self.reverts.rejected
    }
}

/// Everything the validator hands to the joiner.
#[derive(Debug, Clone, Default)]
pub struct ValidatedInputs {
    pub pharmacies: RecordSet<PharmacyRecord>,
    pub claims: RecordSet<ClaimRecord>,
    pub reverts: RecordSet<RevertRecord>,
    pub rejections: Vec<Rejection>,
    pub stats: ValidationStats,
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Validate all three datasets.
pub fn validate_all(batches: &RawBatches) -> ValidatedInputs {
    let mut rejections = Vec::new();

    let (pharmacies, pharmacy) = validate_batch(
        Dataset::Pharmacy,
        &batches.pharmacies,
        validate_pharmacy,
        |p| p.npi.clone(),
        &mut rejections,
    );
    let (claims, claim_stats) = validate_batch(
        Dataset::Claims,
        &batches.claims,
        validate_claim,
        |c| c.id.clone(),
        &mut rejections,
    );
    let (reverts, revert_stats) = validate_batch(
        Dataset::Reverts,
        &batches.reverts,
        validate_revert,
        |r| r.id.clone(),
        &mut rejections,
    );

    ValidatedInputs {
        pharmacies,
        claims,
        reverts,
        rejections,
        stats: ValidationStats {
            pharmacy,
            claims: claim_stats,
            reverts: revert_stats,
        },
    }
}

/// Validate one dataset, appending every dropped record to `rejections`.
pub fn validate_batch<T>(
    dataset: Dataset,
    records: &[RawRecord],
    parse: impl Fn(&Value) -> Result<T, RejectReason>,
    key_of: impl Fn(&T) -> String,
    rejections: &mut Vec<Rejection>,
) -> (RecordSet<T>, DatasetStats) {
    let mut set = RecordSet::new();
    let mut stats = DatasetStats {
        seen: records.len(),
        ..Default::default()
    };

    for raw in records {
        match parse(&raw.value) {
            Ok(record) => {
                stats.accepted += 1;
                let key = key_of(&record);
                if set.upsert(key.clone(), record) {
                    stats.duplicates += 1;
                    debug!(%dataset, origin = %raw.origin, %key, "duplicate identifier, later record wins");
                }
            }
            Err(reason) => {
                stats.rejected += 1;
                warn!(%dataset, origin = %raw.origin, %reason, "dropping malformed record");
                rejections.push(Rejection {
                    dataset,
                    origin: raw.origin.clone(),
                    reason,
                });
            }
        }
    }

    info!(
        %dataset,
        seen = stats.seen,
        kept = set.len(),
        rejected = stats.rejected,
        duplicates = stats.duplicates,
        "validated dataset"
    );
    (set, stats)
}

pub fn validate_pharmacy(value: &Value) -> Result<PharmacyRecord, RejectReason> {
    let obj = as_object(value)?;
    Ok(PharmacyRecord {
        npi: identifier(obj, "npi")?,
        chain: identifier(obj, "chain")?,
    })
}

/// Largest accepted claim price.
pub const MAX_PRICE: f64 = 1e12;
/// Accepted claim quantities lie in `[MIN_QUANTITY, MAX_QUANTITY]`.
pub const MIN_QUANTITY: f64 = 1e-6;
pub const MAX_QUANTITY: f64 = 1e12;

pub fn validate_claim(value: &Value) -> Result<ClaimRecord, RejectReason> {
    let obj = as_object(value)?;
    let id = identifier(obj, "id")?;
    let npi = identifier(obj, "npi")?;
    let ndc = identifier(obj, "ndc")?;

    let price = decimal(obj, "price")?;
    if price < 0.0 {
        return Err(RejectReason::NegativePrice(price));
    }
    if price > MAX_PRICE {
        return Err(RejectReason::OutOfRange {
            field: "price",
            value: price,
        });
    }
    let quantity = decimal(obj, "quantity")?;
    if quantity <= 0.0 {
        return Err(RejectReason::NonPositiveQuantity(quantity));
    }
    if !(MIN_QUANTITY..=MAX_QUANTITY).contains(&quantity) {
        return Err(RejectReason::OutOfRange {
            field: "quantity",
            value: quantity,
        });
    }

    Ok(ClaimRecord {
        id,
        npi,
        ndc,
        price,
        quantity,
        timestamp: timestamp(obj, "timestamp")?,
    })
}

pub fn validate_revert(value: &Value) -> Result<RevertRecord, RejectReason> {
    let obj = as_object(value)?;
    Ok(RevertRecord {
        id: identifier(obj, "id")?,
        claim_id: identifier(obj, "claim_id")?,
        timestamp: timestamp(obj, "timestamp")?,
    })
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

fn as_object(value: &Value) -> Result<&Map<String, Value>, RejectReason> {
    value.as_object().ok_or(RejectReason::NotAnObject)
}

/// Present and non-null.
fn required<'a>(obj: &'a Map<String, Value>, field: &'static str) -> Result<&'a Value, RejectReason> {
    match obj.get(field) {
        None | Some(Value::Null) => Err(RejectReason::MissingField(field)),
        Some(v) => Ok(v),
    }
}

fn identifier(obj: &Map<String, Value>, field: &'static str) -> Result<String, RejectReason> {
    let raw = required(obj, field)?
        .as_str()
        .ok_or(RejectReason::WrongType {
            field,
            expected: "a string",
        })?
        .trim();
    if raw.is_empty() {
        return Err(RejectReason::EmptyField(field));
    }
    Ok(raw.to_string())
}

fn decimal(obj: &Map<String, Value>, field: &'static str) -> Result<f64, RejectReason> {
    let wrong_type = RejectReason::WrongType {
        field,
        expected: "a number",
    };
    let parsed = match required(obj, field)? {
        Value::Number(n) => n.as_f64().ok_or(wrong_type)?,
        Value::String(s) => s.trim().parse::<f64>().map_err(|_| wrong_type)?,
        _ => return Err(wrong_type),
    };
    if !parsed.is_finite() {
        return Err(RejectReason::NotFinite(field));
    }
    Ok(parsed)
}

fn timestamp(obj: &Map<String, Value>, field: &'static str) -> Result<DateTime<Utc>, RejectReason> {
    let raw = required(obj, field)?.as_str().ok_or(RejectReason::WrongType {
        field,
        expected: "a date-time string",
    })?;
    parse_timestamp(raw).ok_or_else(|| RejectReason::BadTimestamp(raw.to_string()))
}

const NAIVE_DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse the timestamp shapes seen in the claim feeds. Values without an
/// offset are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
