//! Document backend.
//!
//! Each record is a JSON document in the `tracks` tree of an embedded
//! `sled` database, keyed by its big-endian id. The `meta` tree holds the
//! high-water mark, written in the same transaction as the document.

use std::path::Path;

use geotrack_track_models::TrackRecord;
use sled::Transactional as _;
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionResult};

use crate::collection::{Collection, GuardedStore};
use crate::paths;
use crate::{Backend, IdPolicy, StoreError};

const TRACKS_TREE: &str = "tracks";
const META_TREE: &str = "meta";
const HIGH_WATER_KEY: &[u8] = b"high_water";

/// A document-backed [`TrackStore`](crate::TrackStore).
pub type DocumentTrackStore = GuardedStore<DocumentCollection>;

/// Track records as JSON documents in a `sled` database.
pub struct DocumentCollection {
    db: sled::Db,
    tracks: sled::Tree,
    meta: sled::Tree,
}

impl DocumentCollection {
    /// Opens (or creates) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the database cannot be opened.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            paths::ensure_dir(parent)?;
        }
        let collection = Self::from_db(sled::open(path)?)?;
        log::info!(
            "Using document track store {} ({} records)",
            path.display(),
            collection.tracks.len()
        );
        Ok(collection)
    }

    /// Opens a throwaway in-memory database that is removed on drop.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the database cannot be created.
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self, StoreError> {
        let tracks = db.open_tree(TRACKS_TREE)?;
        let meta = db.open_tree(META_TREE)?;
        Ok(Self { db, tracks, meta })
    }

    /// Flushes an already committed write to disk.
    ///
    /// A committed write is visible to every later read, so a failed flush
    /// only means durability is unconfirmed. It is logged rather than
    /// returned, since reporting the write as failed would make a retrying
    /// caller store it twice.
    fn flush_committed(&self, action: &str) {
        if let Err(e) = self.db.flush() {
            log::warn!("Committed {action} but could not flush the document store: {e}");
        }
    }
}

fn committed(result: TransactionResult<()>, action: &str) -> Result<(), StoreError> {
    result.map_err(|err| match err {
        TransactionError::Abort(()) => StoreError::StorageUnavailable {
            message: format!("{action} transaction aborted"),
        },
        TransactionError::Storage(e) => e.into(),
    })
}

fn decode_id(bytes: &[u8]) -> Result<u64, StoreError> {
    let array: [u8; 8] = bytes.try_into().map_err(|_| StoreError::Corrupt {
        message: format!("expected an 8-byte id, found {} bytes", bytes.len()),
    })?;
    Ok(u64::from_be_bytes(array))
}

impl Collection for DocumentCollection {
    const BACKEND: Backend = Backend::Document;

    fn load(&self) -> Result<Vec<TrackRecord>, StoreError> {
        self.tracks
            .iter()
            .values()
            .map(|document| -> Result<TrackRecord, StoreError> {
                Ok(serde_json::from_slice(&document?)?)
            })
            .collect()
    }

    fn high_water(&self) -> Result<u64, StoreError> {
        self.meta
            .get(HIGH_WATER_KEY)?
            .map_or(Ok(0), |bytes| decode_id(&bytes))
    }

    fn find(&self, id: u64) -> Result<Option<TrackRecord>, StoreError> {
        self.tracks
            .get(id.to_be_bytes())?
            .map(|document| serde_json::from_slice(&document))
            .transpose()
            .map_err(StoreError::from)
    }

    fn insert(&mut self, record: &TrackRecord) -> Result<(), StoreError> {
        let key = record.id.to_be_bytes();
        let document = serde_json::to_vec(record)?;

        let result: TransactionResult<()> =
            (&self.tracks, &self.meta).transaction(|(tracks, meta)| {
                tracks.insert(&key[..], document.as_slice())?;
                meta.insert(HIGH_WATER_KEY, &key[..])?;
                Ok::<(), ConflictableTransactionError<()>>(())
            });

        committed(result, "insert")?;
        self.flush_committed("insert");
        Ok(())
    }

    fn remove(&mut self, id: u64) -> Result<bool, StoreError> {
        let removed = self.tracks.remove(id.to_be_bytes())?.is_some();
        if removed {
            self.flush_committed("delete");
        }
        Ok(removed)
    }

    fn clear(&mut self, policy: IdPolicy) -> Result<(), StoreError> {
        // No other mutation runs while `&mut self` is held, so the key
        // snapshot is complete.
        let keys = self.tracks.iter().keys().collect::<Result<Vec<_>, _>>()?;
        let reset = policy == IdPolicy::Reset;

        let result: TransactionResult<()> =
            (&self.tracks, &self.meta).transaction(|(tracks, meta)| {
                for key in &keys {
                    tracks.remove(key.clone())?;
                }
                if reset {
                    meta.remove(HIGH_WATER_KEY)?;
                }
                Ok::<(), ConflictableTransactionError<()>>(())
            });

        committed(result, "delete-all")?;
        self.flush_committed("delete-all");
        Ok(())
    }
}
