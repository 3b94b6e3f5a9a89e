//! Run configuration.
//!
//! Settings are layered, later layers winning:
//!
//! 1. built-in defaults (`data/pharmacies`, `data/claims`, `data/reverts`,
//!    `output`, no quantity cap)
//! 2. a TOML file: `--config <path>`, else `./rxclaims.toml`, else
//!    `<config dir>/rxclaims/config.toml`
//! 3. `RXCLAIMS_*` environment variables (a `.env` file is loaded first)
//! 4. command-line flags
//!
//! # Example Configuration
//!
//! ```toml
//! pharmacy_dir = "/lake/pharmacies"
//! claims_dir = "/lake/claims"
//! reverts_dir = "/lake/reverts"
//! output_dir = "/lake/out"
//! quantity_limit = 5
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ingest::InputDirs;

pub const LOCAL_CONFIG_FILE: &str = "rxclaims.toml";
pub const ENV_PHARMACY_DIR: &str = "RXCLAIMS_PHARMACY_DIR";
pub const ENV_CLAIMS_DIR: &str = "RXCLAIMS_CLAIMS_DIR";
pub const ENV_REVERTS_DIR: &str = "RXCLAIMS_REVERTS_DIR";
pub const ENV_OUTPUT_DIR: &str = "RXCLAIMS_OUTPUT_DIR";
pub const ENV_QUANTITY_LIMIT: &str = "RXCLAIMS_QUANTITY_LIMIT";

/// Errors that can occur when resolving configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("Validation error: {0}")]
    Validation(String),
}

/// One partial layer of settings; unset fields fall through.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
    #[serde(default)]
    pub pharmacy_dir: Option<PathBuf>,
    #[serde(default)]
    pub claims_dir: Option<PathBuf>,
    #[serde(default)]
    pub reverts_dir: Option<PathBuf>,
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    /// Maximum quantities listed per drug in the output file.
    #[serde(default)]
    pub quantity_limit: Option<usize>,
}

impl ConfigLayer {
    /// Parse a TOML config file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read the `RXCLAIMS_*` variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let path = |var: &str| {
            lookup(var)
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
        };
        let quantity_limit = match lookup(ENV_QUANTITY_LIMIT) {
            Some(raw) if !raw.trim().is_empty() => Some(raw.trim().parse::<usize>().map_err(
                |_| ConfigError::InvalidEnv {
                    var: ENV_QUANTITY_LIMIT,
                    value: raw.clone(),
                },
            )?),
            _ => None,
        };
        Ok(Self {
            pharmacy_dir: path(ENV_PHARMACY_DIR),
            claims_dir: path(ENV_CLAIMS_DIR),
            reverts_dir: path(ENV_REVERTS_DIR),
            output_dir: path(ENV_OUTPUT_DIR),
            quantity_limit,
        })
    }
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    pub pharmacy_dir: PathBuf,
    pub claims_dir: PathBuf,
    pub reverts_dir: PathBuf,
    pub output_dir: PathBuf,
    pub quantity_limit: Option<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pharmacy_dir: PathBuf::from("data/pharmacies"),
            claims_dir: PathBuf::from("data/claims"),
            reverts_dir: PathBuf::from("data/reverts"),
            output_dir: PathBuf::from("output"),
            quantity_limit: None,
        }
    }
}

impl Settings {
    /// Resolve defaults, config file, environment and `flags`, in that order.
    pub fn resolve(config_path: Option<&Path>, flags: ConfigLayer) -> Result<Self, ConfigError> {
        let mut settings = Self::default();
        if let Some(path) = find_config_file(config_path) {
            tracing::debug!(path = %path.display(), "loading config file");
            settings.apply(ConfigLayer::load_from(&path)?);
        }
        settings.apply(ConfigLayer::from_env()?);
        settings.apply(flags);
        settings.validate()?;
        Ok(settings)
    }

    /// Overwrite every field the layer sets.
    pub fn apply(&mut self, layer: ConfigLayer) {
        if let Some(dir) = layer.pharmacy_dir {
            self.pharmacy_dir = dir;
        }
        if let Some(dir) = layer.claims_dir {
            self.claims_dir = dir;
        }
        if let Some(dir) = layer.reverts_dir {
            self.reverts_dir = dir;
        }
        if let Some(dir) = layer.output_dir {
            self.output_dir = dir;
        }
        if layer.quantity_limit.is_some() {
            self.quantity_limit = layer.quantity_limit;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.quantity_limit == Some(0) {
            return Err(ConfigError::Validation(
                "quantity_limit must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn input_dirs(&self) -> InputDirs {
        InputDirs {
            pharmacy: self.pharmacy_dir.clone(),
            claims: self.claims_dir.clone(),
            reverts: self.reverts_dir.clone(),
        }
    }
}

/// An explicit path always wins (and must exist); otherwise the first of
/// `./rxclaims.toml` and the per-user config file that exists.
pub fn find_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.is_file() {
        return Some(local);
    }
    dirs::config_dir()
        .map(|dir| dir.join("rxclaims").join("config.toml"))
        .filter(|path| path.is_file())
}
