//! Analysis passes over joined claims.
//!
//! # Module structure
//!
//! - [`join`] — claims ↔ pharmacy / revert join
//! - [`metrics`] — per (npi, ndc) fill metrics
//! - [`chains`] — cheapest chains per drug
//! - [`quantity`] — most-prescribed quantities per drug
//! - [`derive`] — rounding and mean helpers
//! - [`types`] — result table rows
//! - [`invariants`] — consistency checks over a finished run
//!
//! Every pass is a pure function of the joined-claims slice, so the three
//! aggregations can run in any order or in parallel.

pub mod chains;
pub mod derive;
pub mod invariants;
pub mod join;
pub mod metrics;
pub mod quantity;
pub mod types;

use crate::model::JoinedClaim;

pub use chains::{CHAIN_RANK_LIMIT, rank_chains};
pub use invariants::{Check, Severity, check_inputs, check_invariants};
pub use join::{JoinOutcome, join_claims};
pub use metrics::compute_metrics;
pub use quantity::profile_quantities;
pub use types::{ChainPrice, ChainRanking, MetricRow, QuantityProfile, ResultTables, TableCounts};

/// Run the three aggregations over one immutable snapshot of joined claims.
pub fn analyze(claims: &[JoinedClaim]) -> ResultTables {
    let (metrics, (chains, quantities)) = rayon::join(
        || compute_metrics(claims),
        || rayon::join(|| rank_chains(claims), || profile_quantities(claims)),
    );
    ResultTables {
        metrics,
        chains,
        quantities,
    }
}
