//! JSON output files.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::analytics::{QuantityProfile, ResultTables};
use crate::pipeline::RunSummary;

pub const METRICS_FILE: &str = "metrics.json";
pub const CHAINS_FILE: &str = "chain_recommendations.json";
pub const QUANTITIES_FILE: &str = "quantity_profiles.json";
pub const SUMMARY_FILE: &str = "run_summary.json";

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("failed to create output directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize {}: {source}", path.display())]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Paths of the files written by [`write_outputs`].
#[derive(Debug, Clone, Serialize)]
pub struct WrittenFiles {
    pub metrics: PathBuf,
    pub chains: PathBuf,
    pub quantities: PathBuf,
    pub summary: PathBuf,
}

/// Apply the optional per-drug quantity cap.
pub fn present_quantities(profiles: &[QuantityProfile], limit: Option<usize>) -> Vec<QuantityProfile> {
    match limit {
        Some(limit) => profiles.iter().map(|p| p.truncated(limit)).collect(),
        None => profiles.to_vec(),
    }
}

/// Write the three tables and the run summary into `dir`, creating it if
/// needed.
pub fn write_outputs(
    dir: &Path,
    tables: &ResultTables,
    summary: &RunSummary,
    quantity_limit: Option<usize>,
) -> Result<WrittenFiles, OutputError> {
    fs::create_dir_all(dir).map_err(|source| OutputError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let files = WrittenFiles {
        metrics: dir.join(METRICS_FILE),
        chains: dir.join(CHAINS_FILE),
        quantities: dir.join(QUANTITIES_FILE),
        summary: dir.join(SUMMARY_FILE),
    };

    write_json(&files.metrics, &tables.metrics)?;
    write_json(&files.chains, &tables.chains)?;
    write_json(
        &files.quantities,
        &present_quantities(&tables.quantities, quantity_limit),
    )?;
    write_json(&files.summary, summary)?;

    info!(dir = %dir.display(), "results saved");
    Ok(files)
}

/// Pretty-print `value` to `path` with a trailing newline.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), OutputError> {
    let write_err = |source: std::io::Error| OutputError::Write {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(write_err)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value).map_err(|source| OutputError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;
    writer.write_all(b"\n").map_err(write_err)?;
    writer.flush().map_err(write_err)?;
    Ok(())
}
