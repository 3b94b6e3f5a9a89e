//! Result table rows produced by the analysis passes.
//!
//! Field names are the wire contract of the JSON output files.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Fill metrics for one (npi, ndc) pair.
///
/// Note: `Eq` is not derived because the price fields are `f64`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRow {
    pub npi: String,
    pub ndc: String,
    pub fills: usize,
    pub reverted: usize,
    /// Mean unit price over the group, rounded to cents.
    pub avg_price: f64,
    /// Sum of the raw claim prices, rounded to cents.
    pub total_price: f64,
}

// ---------------------------------------------------------------------------
// Chain ranking
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainPrice {
    pub name: String,
    pub avg_price: f64,
}

/// Cheapest chains for one drug, cheapest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainRanking {
    pub ndc: String,
    pub chain: Vec<ChainPrice>,
}

// ---------------------------------------------------------------------------
// Quantity profile
// ---------------------------------------------------------------------------

/// Distinct dispensed quantities for one drug, most frequent first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantityProfile {
    pub ndc: String,
    pub most_prescribed_quantity: Vec<f64>,
}

impl QuantityProfile {
    /// Copy keeping at most `limit` quantities.
    pub fn truncated(&self, limit: usize) -> Self {
        Self {
            ndc: self.ndc.clone(),
            most_prescribed_quantity: self
                .most_prescribed_quantity
                .iter()
                .copied()
                .take(limit)
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

/// The three tables a run produces.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultTables {
    pub metrics: Vec<MetricRow>,
    pub chains: Vec<ChainRanking>,
    pub quantities: Vec<QuantityProfile>,
}

/// Row counts per table, for the run summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableCounts {
    pub metrics: usize,
    pub chains: usize,
    pub quantities: usize,
}

impl ResultTables {
    pub fn counts(&self) -> TableCounts {
        TableCounts {
            metrics: self.metrics.len(),
            chains: self.chains.len(),
            quantities: self.quantities.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty() && self.chains.is_empty() && self.quantities.is_empty()
    }
}
