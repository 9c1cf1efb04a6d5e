//! Backend-independent store logic.
//!
//! A [`Collection`] only knows how to persist and read back records. The
//! [`GuardedStore`] wrapping it serializes access, picks the predecessor,
//! runs the motion analyzer and assigns ids, so every backend behaves the
//! same way.

use std::cmp::Ordering;

use async_trait::async_trait;
use geotrack_track_models::{LocationReport, ReportError, SortOrder, TrackRecord};
use tokio::sync::RwLock;

use crate::{Backend, IdPolicy, StoreError, TrackStore};

/// Raw persistence for track records.
///
/// Implementations do no locking of their own; [`GuardedStore`] hands out
/// `&mut self` only to one mutation at a time. Every mutation must be
/// all-or-nothing.
///
/// Methods do synchronous file or database I/O and block the calling
/// worker thread while the store lock is held.
pub trait Collection: Send + Sync + 'static {
    /// Backend identifier reported by the owning store.
    const BACKEND: Backend;

    /// Reads every stored record, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend cannot be read or decoded.
    fn load(&self) -> Result<Vec<TrackRecord>, StoreError>;

    /// Largest id ever assigned since the last reset, or `0`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend cannot be read or decoded.
    fn high_water(&self) -> Result<u64, StoreError>;

    /// Reads a single record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend cannot be read or decoded.
    fn find(&self, id: u64) -> Result<Option<TrackRecord>, StoreError> {
        Ok(self.load()?.into_iter().find(|record| record.id == id))
    }

    /// Persists `record` and raises the high-water mark to its id in one
    /// step.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails. The collection is left as
    /// it was before the call.
    fn insert(&mut self, record: &TrackRecord) -> Result<(), StoreError>;

    /// Removes a record, returning whether it existed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails.
    fn remove(&mut self, id: u64) -> Result<bool, StoreError>;

    /// Removes every record. Under [`IdPolicy::Reset`] the high-water mark
    /// is cleared as well.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails.
    fn clear(&mut self, policy: IdPolicy) -> Result<(), StoreError>;
}

fn chronological(a: &TrackRecord, b: &TrackRecord) -> Ordering {
    a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id))
}

/// Sorts by `(timestamp, id)`; [`SortOrder::Desc`] is the exact reverse of
/// [`SortOrder::Asc`].
pub fn sort_records(records: &mut [TrackRecord], order: SortOrder) {
    records.sort_by(chronological);
    if order == SortOrder::Desc {
        records.reverse();
    }
}

/// The record with the greatest timestamp, highest id on ties.
#[must_use]
pub fn most_recent(records: &[TrackRecord]) -> Option<&TrackRecord> {
    records.iter().max_by(|a, b| chronological(a, b))
}

/// Next id to assign: one past both the high-water mark and every stored id.
#[must_use]
pub fn next_id(high_water: u64, records: &[TrackRecord]) -> u64 {
    records
        .iter()
        .map(|record| record.id)
        .fold(high_water, u64::max)
        + 1
}

/// A [`TrackStore`] over any [`Collection`], guarded by a single
/// reader-writer lock.
pub struct GuardedStore<C: Collection> {
    collection: RwLock<C>,
    id_policy: IdPolicy,
}

impl<C: Collection> GuardedStore<C> {
    /// Wraps `collection`, applying `id_policy` on [`TrackStore::delete_all`].
    #[must_use]
    pub fn new(collection: C, id_policy: IdPolicy) -> Self {
        Self {
            collection: RwLock::new(collection),
            id_policy,
        }
    }
}

#[async_trait]
impl<C: Collection> TrackStore for GuardedStore<C> {
    fn backend(&self) -> Backend {
        C::BACKEND
    }

    async fn append(&self, report: &LocationReport) -> Result<TrackRecord, StoreError> {
        let parsed = report.parse()?;

        let mut collection = self.collection.write().await;
        let records = collection.load()?;
        let previous = most_recent(&records);
        let metrics = geotrack_motion::analyze(previous, &parsed);
        if let Some(field) = metrics.non_finite_field() {
            return Err(ReportError::NonFiniteValue { field }.into());
        }
        let id = next_id(collection.high_water()?, &records);

        let record = TrackRecord::new(id, parsed, metrics);
        collection.insert(&record)?;

        if record.anomaly {
            log::warn!(
                "Stored anomalous track record {} ({}, speed {:?} km/h)",
                record.id,
                record.from_to.as_deref().unwrap_or("no predecessor"),
                record.speed_kmh
            );
        } else {
            log::debug!("Stored track record {}", record.id);
        }

        Ok(record)
    }

    async fn most_recent(&self) -> Result<Option<TrackRecord>, StoreError> {
        let records = self.collection.read().await.load()?;
        Ok(most_recent(&records).cloned())
    }

    async fn list(&self, order: SortOrder) -> Result<Vec<TrackRecord>, StoreError> {
        let mut records = self.collection.read().await.load()?;
        sort_records(&mut records, order);
        Ok(records)
    }

    async fn get(&self, id: u64) -> Result<TrackRecord, StoreError> {
        self.collection
            .read()
            .await
            .find(id)?
            .ok_or(StoreError::NotFound { id })
    }

    async fn delete_one(&self, id: u64) -> Result<bool, StoreError> {
        let removed = self.collection.write().await.remove(id)?;
        if removed {
            log::debug!("Deleted track record {id}");
        } else {
            log::debug!("Track record {id} not present, nothing deleted");
        }
        Ok(removed)
    }

    async fn delete_all(&self) -> Result<(), StoreError> {
        self.collection.write().await.clear(self.id_policy)?;
        log::info!("Deleted all track records (id policy: {})", self.id_policy);
        Ok(())
    }
}
