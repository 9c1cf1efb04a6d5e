#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Track record storage for geotrack.
//!
//! [`TrackStore`] owns record identity, ordering and durability. Two
//! backends implement it with an identical contract:
//!
//! * [`CsvTrackStore`]: a flat `tracks.csv` table rewritten atomically on
//!   every mutation
//! * [`DocumentTrackStore`]: JSON documents in an embedded `sled` database
//!
//! Both are a [`GuardedStore`] around a backend-specific [`Collection`], so
//! predecessor selection, id assignment and ordering live in one place.
//! The backend is chosen once at startup via [`open_store`].

pub mod collection;
pub mod config;
pub mod csv_store;
pub mod document_store;
pub mod paths;

#[cfg(test)]
mod contract_tests;

use std::sync::Arc;

use async_trait::async_trait;
use geotrack_track_models::{LocationReport, ReportError, SortOrder, TrackRecord};

pub use collection::{Collection, GuardedStore, most_recent, next_id, sort_records};
pub use config::{Backend, ConfigError, IdPolicy, StoreConfig};
pub use csv_store::{CsvCollection, CsvTrackStore};
pub use document_store::{DocumentCollection, DocumentTrackStore};

/// Errors that can occur during track store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The submitted report was invalid. Nothing was stored.
    #[error(transparent)]
    Report(#[from] ReportError),

    /// The backing file or database could not be read or written.
    #[error("Storage unavailable: {message}")]
    StorageUnavailable {
        /// Description of the underlying failure.
        message: String,
    },

    /// Persisted data could not be decoded.
    #[error("Corrupt track data: {message}")]
    Corrupt {
        /// Description of what failed to decode.
        message: String,
    },

    /// No record exists with the requested id.
    #[error("Track record {id} not found")]
    NotFound {
        /// The requested id.
        id: u64,
    },
}

impl StoreError {
    /// Whether the error was caused by the caller's input rather than the
    /// store.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::Report(_))
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::StorageUnavailable {
            message: err.to_string(),
        }
    }
}

impl From<csv::Error> for StoreError {
    fn from(err: csv::Error) -> Self {
        if err.is_io_error() {
            Self::StorageUnavailable {
                message: err.to_string(),
            }
        } else {
            Self::Corrupt {
                message: err.to_string(),
            }
        }
    }
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        match err {
            sled::Error::Corruption { .. } => Self::Corrupt {
                message: err.to_string(),
            },
            _ => Self::StorageUnavailable {
                message: err.to_string(),
            },
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Corrupt {
            message: err.to_string(),
        }
    }
}

/// Durable, ordered storage of [`TrackRecord`]s.
///
/// Mutating operations are mutually exclusive with each other and with the
/// predecessor lookup performed by [`TrackStore::append`]. Reads may run
/// concurrently but never observe a half-written record.
#[async_trait]
pub trait TrackStore: Send + Sync {
    /// Which backend holds the data.
    fn backend(&self) -> Backend;

    /// Validates `report`, derives its motion metrics against the current
    /// most recent record and stores it under a fresh id.
    ///
    /// # Errors
    ///
    /// * [`StoreError::Report`] if the report is invalid
    /// * [`StoreError::StorageUnavailable`] if the backend cannot be written
    async fn append(&self, report: &LocationReport) -> Result<TrackRecord, StoreError>;

    /// Returns the record with the greatest timestamp (highest id on ties).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend cannot be read.
    async fn most_recent(&self) -> Result<Option<TrackRecord>, StoreError>;

    /// Returns every record ordered by `(timestamp, id)` per `order`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend cannot be read.
    async fn list(&self, order: SortOrder) -> Result<Vec<TrackRecord>, StoreError>;

    /// Returns the record with the given id.
    ///
    /// # Errors
    ///
    /// * [`StoreError::NotFound`] if no such record exists
    /// * [`StoreError::StorageUnavailable`] if the backend cannot be read
    async fn get(&self, id: u64) -> Result<TrackRecord, StoreError>;

    /// Removes the record with the given id. Returns `false` if it did not
    /// exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend cannot be written.
    async fn delete_one(&self, id: u64) -> Result<bool, StoreError>;

    /// Removes every record. Whether the id sequence restarts at 1 depends
    /// on the store's [`IdPolicy`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend cannot be written.
    async fn delete_all(&self) -> Result<(), StoreError>;
}

/// Opens the backend selected by `config`.
///
/// # Errors
///
/// Returns [`StoreError`] if the data directory or database cannot be
/// opened.
pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn TrackStore>, StoreError> {
    log::info!(
        "Opening {} track store in {} (id policy: {})",
        config.backend,
        config.data_dir.display(),
        config.id_policy
    );

    let store: Arc<dyn TrackStore> = match config.backend {
        Backend::Csv => Arc::new(GuardedStore::new(
            CsvCollection::open(&config.data_dir)?,
            config.id_policy,
        )),
        Backend::Document => Arc::new(GuardedStore::new(
            DocumentCollection::open(&paths::document_db_path(&config.data_dir))?,
            config.id_policy,
        )),
    };

    Ok(store)
}
