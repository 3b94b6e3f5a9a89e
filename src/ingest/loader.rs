//! Directory loaders for the three input datasets.
//!
//! Pharmacy rows come from `*.csv` files, claims and reverts from `*.json`
//! files holding either an array of objects or a single object. Only files
//! directly inside the configured directory are read, in file-name order.
//!
//! A file that cannot be read or decoded is logged and skipped; a missing
//! directory is an error.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{error, info};
use walkdir::WalkDir;

use crate::model::{Dataset, Origin, RawRecord};

use super::{IngestError, RawBatches};

/// Decoded rows for one dataset plus the files that had to be skipped.
#[derive(Debug, Default)]
pub struct LoadedBatch {
    pub records: Vec<RawRecord>,
    pub files_read: usize,
    pub unreadable_files: Vec<PathBuf>,
}

/// Directories holding the three datasets.
#[derive(Debug, Clone)]
pub struct InputDirs {
    pub pharmacy: PathBuf,
    pub claims: PathBuf,
    pub reverts: PathBuf,
}

/// Load all three datasets. Fails only when a directory is missing.
pub fn load_all(dirs: &InputDirs) -> Result<(RawBatches, Vec<PathBuf>), IngestError> {
    let pharmacies = load_dataset(Dataset::Pharmacy, &dirs.pharmacy)?;
    let claims = load_dataset(Dataset::Claims, &dirs.claims)?;
    let reverts = load_dataset(Dataset::Reverts, &dirs.reverts)?;

    let mut unreadable = pharmacies.unreadable_files;
    unreadable.extend(claims.unreadable_files);
    unreadable.extend(reverts.unreadable_files);

    Ok((
        RawBatches {
            pharmacies: pharmacies.records,
            claims: claims.records,
            reverts: reverts.records,
        },
        unreadable,
    ))
}

/// Load every file of the dataset's format from `dir`.
pub fn load_dataset(dataset: Dataset, dir: &Path) -> Result<LoadedBatch, IngestError> {
    if !dir.is_dir() {
        return Err(IngestError::MissingDirectory {
            dataset,
            path: dir.to_path_buf(),
        });
    }
    info!(%dataset, dir = %dir.display(), "loading dataset");

    let extension = match dataset {
        Dataset::Pharmacy => "csv",
        Dataset::Claims | Dataset::Reverts => "json",
    };

    let mut batch = LoadedBatch::default();
    for path in list_files(dir, extension) {
        let decoded = match dataset {
            Dataset::Pharmacy => read_csv_rows(&path),
            Dataset::Claims | Dataset::Reverts => read_json_rows(&path),
        };
        match decoded {
            Ok(rows) => {
                info!(%dataset, file = %path.display(), rows = rows.len(), "read file");
                batch.files_read += 1;
                batch.records.extend(rows);
            }
            Err(err) => {
                error!(%dataset, file = %path.display(), error = %err, "skipping unreadable file");
                batch.unreadable_files.push(path);
            }
        }
    }

    info!(
        %dataset,
        files = batch.files_read,
        records = batch.records.len(),
        "loaded dataset"
    );
    Ok(batch)
}

/// Regular files directly under `dir` with the given extension, sorted.
fn list_files(dir: &Path, extension: &str) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .flatten()
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|s| s.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
        })
        .map(|entry| entry.into_path())
        .collect()
}

/// Decode a headed CSV file into one JSON object of string cells per row.
pub fn read_csv_rows(path: &Path) -> Result<Vec<RawRecord>, IngestError> {
    let csv_err = |source: csv::Error| IngestError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_path(path)
        .map_err(csv_err)?;
    let headers = reader.headers().map_err(csv_err)?.clone();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(csv_err)?;
        let line = record.position().map_or(0, |p| p.line());
        let mut obj = Map::new();
        for (name, cell) in headers.iter().zip(record.iter()) {
            obj.insert(name.to_string(), Value::String(cell.to_string()));
        }
        rows.push(RawRecord::new(Origin::new(path, line), Value::Object(obj)));
    }
    Ok(rows)
}

/// Decode a JSON file holding an array of rows or a single row.
pub fn read_json_rows(path: &Path) -> Result<Vec<RawRecord>, IngestError> {
    let data = fs::read_to_string(path).map_err(|source| IngestError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = serde_json::from_str(&data).map_err(|source| IngestError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    let items = match value {
        Value::Array(items) => items,
        single => vec![single],
    };
    Ok(items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| RawRecord::new(Origin::new(path, idx as u64 + 1), item))
        .collect())
}
