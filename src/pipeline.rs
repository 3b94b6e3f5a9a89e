//! One batch run over in-memory records: validate, join, analyze.
//!
//! No I/O happens here. The caller decodes input files into [`RawBatches`]
//! and serializes the returned tables.

use std::path::PathBuf;
use std::time::Instant;

use serde::Serialize;
use tracing::info;

use crate::analytics::{
    self, Check, ResultTables, TableCounts, check_inputs, check_invariants, join_claims,
};
use crate::ingest::{RawBatches, Rejection, ValidationStats, validate_all};
use crate::model::Dataset;

/// Rejections kept verbatim in the summary; the rest are only counted.
pub const REJECTION_SAMPLE_LIMIT: usize = 20;

/// A rejected record as it appears in the summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectionSample {
    pub dataset: Dataset,
    pub origin: String,
    pub reason: String,
}

impl From<&Rejection> for RejectionSample {
    fn from(r: &Rejection) -> Self {
        Self {
            dataset: r.dataset,
            origin: r.origin.to_string(),
            reason: r.reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryMeta {
    pub elapsed_ms: u64,
}

/// Diagnostics for one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub validation: ValidationStats,
    pub unknown_pharmacy: usize,
    pub joined_claims: usize,
    pub reverted_claims: usize,
    /// Filled in by the loader; the core never sees files.
    pub unreadable_files: Vec<PathBuf>,
    pub tables: TableCounts,
    pub rejection_samples: Vec<RejectionSample>,
    pub checks: Vec<Check>,
    pub _meta: SummaryMeta,
}

impl RunSummary {
    /// True if no error-severity check failed.
    pub fn is_consistent(&self) -> bool {
        analytics::invariants::count_failures(&self.checks, analytics::Severity::Error) == 0
    }

    pub fn dropped_records(&self) -> usize {
        self.validation.total_rejected()
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub tables: ResultTables,
    pub summary: RunSummary,
}

/// Run validation, the pharmacy/revert join and the three analysis passes.
///
/// Never fails: malformed records are dropped, empty inputs give empty
/// tables.
pub fn run_pipeline(batches: &RawBatches) -> PipelineOutput {
    let start = Instant::now();

    let validated = validate_all(batches);
    let joined = join_claims(&validated.claims, &validated.pharmacies, &validated.reverts);
    let tables = analytics::analyze(&joined.claims);

    let mut checks = check_inputs(&validated.stats, joined.claims.len());
    checks.extend(check_invariants(&joined.claims, &tables));

    let summary = RunSummary {
        validation: validated.stats,
        unknown_pharmacy: joined.unknown_pharmacy,
        joined_claims: joined.claims.len(),
        reverted_claims: joined.reverted_count(),
        unreadable_files: Vec::new(),
        tables: tables.counts(),
        rejection_samples: validated
            .rejections
            .iter()
            .take(REJECTION_SAMPLE_LIMIT)
            .map(RejectionSample::from)
            .collect(),
        checks,
        _meta: SummaryMeta {
            elapsed_ms: start.elapsed().as_millis() as u64,
        },
    };

    info!(
        metrics = summary.tables.metrics,
        chains = summary.tables.chains,
        quantities = summary.tables.quantities,
        dropped = summary.dropped_records(),
        elapsed_ms = summary._meta.elapsed_ms,
        "pipeline finished"
    );

    PipelineOutput { tables, summary }
}
