//! Store configuration.
//!
//! Resolution order: built-in defaults, then the TOML file named by
//! `GEOTRACK_CONFIG` (if set), then the `GEOTRACK_BACKEND`,
//! `GEOTRACK_DATA_DIR` and `GEOTRACK_ID_POLICY` environment variables.
//!
//! ```toml
//! backend = "document"
//! data_dir = "/var/lib/geotrack"
//! id_policy = "preserve"
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Environment variable naming an optional TOML config file.
pub const CONFIG_PATH_VAR: &str = "GEOTRACK_CONFIG";
/// Environment override for [`StoreConfig::backend`].
pub const BACKEND_VAR: &str = "GEOTRACK_BACKEND";
/// Environment override for [`StoreConfig::data_dir`].
pub const DATA_DIR_VAR: &str = "GEOTRACK_DATA_DIR";
/// Environment override for [`StoreConfig::id_policy`].
pub const ID_POLICY_VAR: &str = "GEOTRACK_ID_POLICY";

/// Default data directory, relative to the working directory.
pub const DEFAULT_DATA_DIR: &str = "data";

/// Errors from resolving a [`StoreConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Io {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML for a [`StoreConfig`].
    #[error("Invalid config file: {0}")]
    Toml(#[from] toml::de::Error),

    /// An environment override had an unrecognized value.
    #[error("Invalid value {value:?} for {key}")]
    InvalidValue {
        /// Variable name.
        key: &'static str,
        /// Rejected value.
        value: String,
    },
}

/// Storage backend holding the track records.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Backend {
    /// Flat `tracks.csv` table.
    #[default]
    Csv,
    /// Embedded `sled` document database.
    Document,
}

/// What happens to the id sequence when every record is deleted.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum IdPolicy {
    /// The next append after a delete-all gets id 1.
    #[default]
    Reset,
    /// Ids continue from the largest ever assigned.
    Preserve,
}

/// Which backend to open, where, and with which id policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Storage backend.
    pub backend: Backend,
    /// Directory holding the backend's files.
    pub data_dir: PathBuf,
    /// Delete-all id policy.
    pub id_policy: IdPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            id_policy: IdPolicy::default(),
        }
    }
}

impl StoreConfig {
    /// Parses a TOML document. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Toml`] if the document is invalid.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Reads and parses a TOML config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Resolves the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file or an override is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::resolve(|key| std::env::var(key).ok())
    }

    /// Resolves the configuration using `lookup` for variable values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file or an override is invalid.
    pub fn resolve(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match lookup(CONFIG_PATH_VAR) {
            Some(path) => Self::from_toml_file(Path::new(&path))?,
            None => Self::default(),
        };

        if let Some(value) = lookup(BACKEND_VAR) {
            config.backend = parse_override(BACKEND_VAR, &value)?;
        }
        if let Some(value) = lookup(DATA_DIR_VAR) {
            config.data_dir = PathBuf::from(value);
        }
        if let Some(value) = lookup(ID_POLICY_VAR) {
            config.id_policy = parse_override(ID_POLICY_VAR, &value)?;
        }

        Ok(config)
    }
}

fn parse_override<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .to_ascii_lowercase()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        })
}
