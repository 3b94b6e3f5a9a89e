//! Input side of a run.
//!
//! - [`loader`] — directory traversal and CSV / JSON decoding
//! - [`validate`] — field checks, timestamp parsing, last-write-wins dedup

use std::path::PathBuf;

use thiserror::Error;

use crate::model::{Dataset, RawRecord};

pub mod loader;
pub mod validate;

pub use loader::{InputDirs, LoadedBatch, load_all, load_dataset};
pub use validate::{
    DatasetStats, RecordSet, RejectReason, Rejection, ValidatedInputs, ValidationStats,
    validate_all,
};

/// Raw rows for each dataset, as handed over by the loader.
#[derive(Debug, Clone, Default)]
pub struct RawBatches {
    pub pharmacies: Vec<RawRecord>,
    pub claims: Vec<RawRecord>,
    pub reverts: Vec<RawRecord>,
}

/// Errors raised while reading input files.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("{dataset} directory not found: {}", path.display())]
    MissingDirectory { dataset: Dataset, path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid CSV in {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}
