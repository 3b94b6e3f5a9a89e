//! Consistency checks over a finished run.
//!
//! Verifies that the result tables agree with the joined claims they were
//! built from:
//! - **metrics** — `reverted <= fills`, fills per drug add up to the joined
//!   claim count for that drug.
//! - **chains** — ranking length is `min(2, distinct chains)` and sorted.
//! - **tables** — every emitted price is finite.
//! - **quantities** — each distinct quantity listed once, by descending
//!   frequency.
//!
//! Output is a list of [`Check`]s that serialises into the run summary.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use super::chains::CHAIN_RANK_LIMIT;
use super::types::ResultTables;
use crate::ingest::ValidationStats;
use crate::model::JoinedClaim;

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// Severity level for a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A single check result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Check {
    pub id: String,
    pub ok: bool,
    pub severity: Severity,
    pub details: String,
}

impl Check {
    fn pass(id: &str, details: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ok: true,
            severity: Severity::Info,
            details: details.into(),
        }
    }

    fn fail(id: &str, severity: Severity, details: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ok: false,
            severity,
            details: details.into(),
        }
    }
}

/// True if every check passed.
pub fn all_ok(checks: &[Check]) -> bool {
    checks.iter().all(|c| c.ok)
}

/// Count of checks that failed with a given severity.
pub fn count_failures(checks: &[Check], sev: Severity) -> usize {
    checks.iter().filter(|c| !c.ok && c.severity == sev).count()
}

// ---------------------------------------------------------------------------
// Main entry points
// ---------------------------------------------------------------------------

/// Run every table check.
pub fn check_invariants(claims: &[JoinedClaim], tables: &ResultTables) -> Vec<Check> {
    vec![
        check_reverted_le_fills(tables),
        check_fills_match_claims(claims, tables),
        check_prices_finite(tables),
        check_chain_lengths(claims, tables),
        check_chain_order(tables),
        check_quantity_profiles(claims, tables),
    ]
}

/// Input-side checks: dropped records and empty inputs are worth flagging
/// but never fail a run.
pub fn check_inputs(stats: &ValidationStats, joined_claims: usize) -> Vec<Check> {
    let mut checks = Vec::new();

    let rejected = stats.total_rejected();
    checks.push(if rejected == 0 {
        Check::pass("input.rejected_records", "no malformed records")
    } else {
        Check::fail(
            "input.rejected_records",
            Severity::Warning,
            format!(
                "{rejected} malformed records dropped (pharmacy {}, claims {}, reverts {})",
                stats.pharmacy.rejected, stats.claims.rejected, stats.reverts.rejected
            ),
        )
    });

    checks.push(if joined_claims > 0 {
        Check::pass("input.joined_claims", format!("{joined_claims} claims joined"))
    } else {
        Check::fail(
            "input.joined_claims",
            Severity::Info,
            "no claims matched a known pharmacy; all tables are empty",
        )
    });

    checks
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

fn check_reverted_le_fills(tables: &ResultTables) -> Check {
    let bad: Vec<String> = tables
        .metrics
        .iter()
        .filter(|row| row.reverted > row.fills)
        .map(|row| format!("{}/{}", row.npi, row.ndc))
        .collect();
    if bad.is_empty() {
        Check::pass(
            "metrics.reverted_le_fills",
            format!("{} rows checked", tables.metrics.len()),
        )
    } else {
        Check::fail(
            "metrics.reverted_le_fills",
            Severity::Error,
            format!("reverted exceeds fills for {}", bad.join(", ")),
        )
    }
}

fn check_fills_match_claims(claims: &[JoinedClaim], tables: &ResultTables) -> Check {
    let mut expected: BTreeMap<&str, usize> = BTreeMap::new();
    for claim in claims {
        *expected.entry(claim.ndc.as_str()).or_default() += 1;
    }
    let mut actual: BTreeMap<&str, usize> = BTreeMap::new();
    for row in &tables.metrics {
        *actual.entry(row.ndc.as_str()).or_default() += row.fills;
    }

    if expected == actual {
        Check::pass(
            "metrics.fills_match_claims",
            format!("{} drugs checked", expected.len()),
        )
    } else {
        let drift: Vec<String> = expected
            .keys()
            .chain(actual.keys())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .filter(|ndc| expected.get(*ndc) != actual.get(*ndc))
            .map(|ndc| {
                format!(
                    "{ndc}: claims {} vs fills {}",
                    expected.get(ndc).copied().unwrap_or(0),
                    actual.get(ndc).copied().unwrap_or(0)
                )
            })
            .collect();
        Check::fail(
            "metrics.fills_match_claims",
            Severity::Error,
            drift.join("; "),
        )
    }
}

/// Non-finite floats serialize as JSON `null`.
fn check_prices_finite(tables: &ResultTables) -> Check {
    let metric_bad = tables
        .metrics
        .iter()
        .filter(|row| !row.avg_price.is_finite() || !row.total_price.is_finite())
        .map(|row| format!("metrics {}/{}", row.npi, row.ndc));
    let chain_bad = tables
        .chains
        .iter()
        .filter(|r| r.chain.iter().any(|c| !c.avg_price.is_finite()))
        .map(|r| format!("chains {}", r.ndc));
    let bad: Vec<String> = metric_bad.chain(chain_bad).collect();

    if bad.is_empty() {
        Check::pass("tables.finite_prices", "all emitted prices are finite")
    } else {
        Check::fail(
            "tables.finite_prices",
            Severity::Error,
            format!("non-finite price in {}", bad.join(", ")),
        )
    }
}

// ---------------------------------------------------------------------------
// Chains
// ---------------------------------------------------------------------------

fn check_chain_lengths(claims: &[JoinedClaim], tables: &ResultTables) -> Check {
    let mut chains_per_drug: HashMap<&str, BTreeSet<&str>> = HashMap::new();
    for claim in claims {
        chains_per_drug
            .entry(claim.ndc.as_str())
            .or_default()
            .insert(claim.chain.as_str());
    }

    let mut bad = Vec::new();
    if tables.chains.len() != chains_per_drug.len() {
        bad.push(format!(
            "{} rankings for {} drugs",
            tables.chains.len(),
            chains_per_drug.len()
        ));
    }
    for ranking in &tables.chains {
        let distinct = chains_per_drug
            .get(ranking.ndc.as_str())
            .map_or(0, BTreeSet::len);
        let want = distinct.min(CHAIN_RANK_LIMIT);
        if ranking.chain.len() != want {
            bad.push(format!(
                "{}: {} entries, expected {want}",
                ranking.ndc,
                ranking.chain.len()
            ));
        }
    }

    if bad.is_empty() {
        Check::pass(
            "chains.length",
            format!("{} rankings checked", tables.chains.len()),
        )
    } else {
        Check::fail("chains.length", Severity::Error, bad.join("; "))
    }
}

fn check_chain_order(tables: &ResultTables) -> Check {
    let bad: Vec<&str> = tables
        .chains
        .iter()
        .filter(|ranking| {
            ranking.chain.windows(2).any(|pair| {
                pair[0].avg_price > pair[1].avg_price
                    || (pair[0].avg_price == pair[1].avg_price && pair[0].name > pair[1].name)
            })
        })
        .map(|ranking| ranking.ndc.as_str())
        .collect();

    if bad.is_empty() {
        Check::pass("chains.sorted", "all rankings ascending by price")
    } else {
        Check::fail(
            "chains.sorted",
            Severity::Error,
            format!("out of order: {}", bad.join(", ")),
        )
    }
}

// ---------------------------------------------------------------------------
// Quantities
// ---------------------------------------------------------------------------

fn check_quantity_profiles(claims: &[JoinedClaim], tables: &ResultTables) -> Check {
    let mut counts: HashMap<&str, HashMap<u64, usize>> = HashMap::new();
    for claim in claims {
        *counts
            .entry(claim.ndc.as_str())
            .or_default()
            .entry(claim.quantity.to_bits())
            .or_default() += 1;
    }

    let mut bad = Vec::new();
    for profile in &tables.quantities {
        let Some(drug) = counts.get(profile.ndc.as_str()) else {
            bad.push(format!("{}: no joined claims", profile.ndc));
            continue;
        };
        let listed: Vec<u64> = profile
            .most_prescribed_quantity
            .iter()
            .map(|q| q.to_bits())
            .collect();
        let unique: BTreeSet<u64> = listed.iter().copied().collect();
        if unique.len() != listed.len() || listed.len() != drug.len() {
            bad.push(format!(
                "{}: {} listed, {} distinct in claims",
                profile.ndc,
                listed.len(),
                drug.len()
            ));
            continue;
        }
        let frequencies: Vec<usize> = listed
            .iter()
            .map(|bits| drug.get(bits).copied().unwrap_or(0))
            .collect();
        if frequencies.windows(2).any(|pair| pair[0] < pair[1]) {
            bad.push(format!("{}: not ordered by frequency", profile.ndc));
        }
    }

    if bad.is_empty() {
        Check::pass(
            "quantities.distinct_by_frequency",
            format!("{} profiles checked", tables.quantities.len()),
        )
    } else {
        Check::fail(
            "quantities.distinct_by_frequency",
            Severity::Error,
            bad.join("; "),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::types::{ChainPrice, ChainRanking, MetricRow, QuantityProfile};
    use chrono::Utc;

    fn claim(id: &str, ndc: &str, chain: &str, quantity: f64) -> JoinedClaim {
        JoinedClaim {
            id: id.into(),
            npi: "A".into(),
            ndc: ndc.into(),
            chain: chain.into(),
            price: 10.0,
            quantity,
            unit_price: 10.0 / quantity,
            reverted: false,
            timestamp: Utc::now(),
        }
    }

    fn consistent() -> (Vec<JoinedClaim>, ResultTables) {
        let claims = vec![
            claim("c1", "D1", "health", 2.0),
            claim("c2", "D1", "saint", 5.0),
            claim("c3", "D1", "saint", 5.0),
        ];
        let tables = ResultTables {
            metrics: vec![MetricRow {
                npi: "A".into(),
                ndc: "D1".into(),
                fills: 3,
                reverted: 0,
                avg_price: 3.0,
                total_price: 30.0,
            }],
            chains: vec![ChainRanking {
                ndc: "D1".into(),
                chain: vec![
                    ChainPrice {
                        name: "saint".into(),
                        avg_price: 2.0,
                    },
                    ChainPrice {
                        name: "health".into(),
                        avg_price: 5.0,
                    },
                ],
            }],
            quantities: vec![QuantityProfile {
                ndc: "D1".into(),
                most_prescribed_quantity: vec![5.0, 2.0],
            }],
        };
        (claims, tables)
    }

    #[test]
    fn consistent_tables_pass() {
        let (claims, tables) = consistent();
        let checks = check_invariants(&claims, &tables);
        assert_eq!(checks.len(), 6);
        assert!(all_ok(&checks), "{checks:?}");
    }

    #[test]
    fn reverted_above_fills_fails() {
        let (claims, mut tables) = consistent();
        tables.metrics[0].reverted = 4;
        let checks = check_invariants(&claims, &tables);
        assert_eq!(count_failures(&checks, Severity::Error), 1);
        assert!(!checks[0].ok);
    }

    #[test]
    fn missing_fills_are_detected() {
        let (claims, mut tables) = consistent();
        tables.metrics[0].fills = 2;
        let checks = check_invariants(&claims, &tables);
        let check = checks
            .iter()
            .find(|c| c.id == "metrics.fills_match_claims")
            .unwrap();
        assert!(!check.ok);
        assert_eq!(check.details, "D1: claims 3 vs fills 2");
    }

    #[test]
    fn infinite_price_fails() {
        let (claims, mut tables) = consistent();
        tables.metrics[0].total_price = f64::INFINITY;
        let checks = check_invariants(&claims, &tables);
        let check = checks.iter().find(|c| c.id == "tables.finite_prices").unwrap();
        assert!(!check.ok);
        assert_eq!(check.severity, Severity::Error);
        assert_eq!(check.details, "non-finite price in metrics A/D1");
    }

    #[test]
    fn unsorted_or_short_chain_ranking_fails() {
        let (claims, mut tables) = consistent();
        tables.chains[0].chain.swap(0, 1);
        let checks = check_invariants(&claims, &tables);
        assert!(!checks.iter().find(|c| c.id == "chains.sorted").unwrap().ok);

        tables.chains[0].chain.pop();
        let checks = check_invariants(&claims, &tables);
        assert!(!checks.iter().find(|c| c.id == "chains.length").unwrap().ok);
    }

    #[test]
    fn quantity_profile_order_is_checked() {
        let (claims, mut tables) = consistent();
        tables.quantities[0].most_prescribed_quantity = vec![2.0, 5.0];
        let checks = check_invariants(&claims, &tables);
        let check = checks
            .iter()
            .find(|c| c.id == "quantities.distinct_by_frequency")
            .unwrap();
        assert!(!check.ok);
        assert_eq!(check.details, "D1: not ordered by frequency");
    }

    #[test]
    fn input_checks_warn_but_do_not_error() {
        let mut stats = ValidationStats::default();
        stats.claims.rejected = 2;
        let checks = check_inputs(&stats, 0);
        assert_eq!(count_failures(&checks, Severity::Warning), 1);
        assert_eq!(count_failures(&checks, Severity::Info), 1);
        assert_eq!(count_failures(&checks, Severity::Error), 0);
    }
}
