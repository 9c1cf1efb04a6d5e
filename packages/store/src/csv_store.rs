//! Flat-file backend.
//!
//! Records live in `tracks.csv` under the data directory, one row per
//! record with the header
//! `id,latitude,longitude,accuracy,timestamp,delta_time,distance,speed,ip,label,anomaly,from_to`.
//! The largest id ever assigned is kept in `tracks.seq` so ids are not
//! reused after deletions.
//!
//! Every mutation writes a complete replacement file next to the target and
//! renames it into place, so readers see either the old or the new table.

use std::fs::{self, File};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use geotrack_track_models::{TrackRecord, parse_timestamp};
use serde::{Deserialize, Serialize};

use crate::collection::{Collection, GuardedStore};
use crate::paths;
use crate::{Backend, IdPolicy, StoreError};

/// Column order of the flat-file table.
pub const HEADER: [&str; 12] = [
    "id",
    "latitude",
    "longitude",
    "accuracy",
    "timestamp",
    "delta_time",
    "distance",
    "speed",
    "ip",
    "label",
    "anomaly",
    "from_to",
];

/// Placeholder some older tables carry instead of an empty `from_to`.
const NO_TRANSITION: &str = "N/A";

/// A flat-file [`TrackStore`](crate::TrackStore).
pub type CsvTrackStore = GuardedStore<CsvCollection>;

/// One table row. Kept separate from [`TrackRecord`] so older tables with
/// empty `distance` cells, `N/A` transitions or Python-style booleans still
/// load.
#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    id: u64,
    latitude: f64,
    longitude: f64,
    accuracy: f64,
    timestamp: String,
    delta_time: Option<f64>,
    distance: Option<f64>,
    speed: Option<f64>,
    ip: String,
    label: String,
    anomaly: String,
    from_to: Option<String>,
}

impl From<&TrackRecord> for CsvRow {
    fn from(record: &TrackRecord) -> Self {
        Self {
            id: record.id,
            latitude: record.latitude,
            longitude: record.longitude,
            accuracy: record.accuracy,
            timestamp: format_timestamp(&record.timestamp),
            delta_time: record.delta_time_seconds,
            distance: Some(record.distance_km),
            speed: record.speed_kmh,
            ip: record.source_ip.clone(),
            label: record.label.clone(),
            anomaly: record.anomaly.to_string(),
            from_to: record.from_to.clone(),
        }
    }
}

impl TryFrom<CsvRow> for TrackRecord {
    type Error = StoreError;

    fn try_from(row: CsvRow) -> Result<Self, Self::Error> {
        let timestamp = parse_timestamp(&row.timestamp).map_err(|_| StoreError::Corrupt {
            message: format!("row {} has unparseable timestamp {:?}", row.id, row.timestamp),
        })?;

        let anomaly = match row.anomaly.trim() {
            "true" | "True" | "TRUE" | "1" => true,
            "false" | "False" | "FALSE" | "0" | "" => false,
            other => {
                return Err(StoreError::Corrupt {
                    message: format!("row {} has invalid anomaly flag {other:?}", row.id),
                });
            }
        };

        Ok(Self {
            id: row.id,
            latitude: row.latitude,
            longitude: row.longitude,
            accuracy: row.accuracy,
            timestamp,
            delta_time_seconds: row.delta_time,
            distance_km: row.distance.unwrap_or(0.0),
            speed_kmh: row.speed,
            source_ip: row.ip,
            label: row.label,
            anomaly,
            from_to: row.from_to.filter(|s| !s.is_empty() && s != NO_TRANSITION),
        })
    }
}

fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Track records in a `tracks.csv` table plus a `tracks.seq` high-water
/// mark.
#[derive(Debug, Clone)]
pub struct CsvCollection {
    table: PathBuf,
    sequence: PathBuf,
}

impl CsvCollection {
    /// Opens the table under `data_dir`, creating the directory if needed.
    /// The table itself is created on the first append.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::StorageUnavailable`] if the directory cannot be
    /// created.
    pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
        paths::ensure_dir(data_dir)?;
        let collection = Self {
            table: paths::table_path(data_dir),
            sequence: paths::sequence_path(data_dir),
        };
        log::info!("Using flat-file track table {}", collection.table.display());
        Ok(collection)
    }

    fn write_table(&self, records: &[TrackRecord]) -> Result<(), StoreError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        writer.write_record(HEADER)?;
        for record in records {
            writer.serialize(CsvRow::from(record))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| StoreError::StorageUnavailable {
                message: e.to_string(),
            })?;

        replace_file(&self.table, &bytes)
    }

    fn write_sequence(&self, high_water: u64) -> Result<(), StoreError> {
        replace_file(&self.sequence, format!("{high_water}\n").as_bytes())
    }
}

/// Writes `bytes` to a staging file, syncs it, then renames it over `path`.
fn replace_file(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let staging = paths::staging_path(path);

    let result = File::create(&staging)
        .and_then(|mut file| {
            file.write_all(bytes)?;
            file.sync_all()
        })
        .and_then(|()| fs::rename(&staging, path));

    if let Err(e) = result {
        // Best effort; the original file is untouched either way.
        let _ = fs::remove_file(&staging);
        return Err(StoreError::StorageUnavailable {
            message: format!("failed to write {}: {e}", path.display()),
        });
    }

    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

impl Collection for CsvCollection {
    const BACKEND: Backend = Backend::Csv;

    fn load(&self) -> Result<Vec<TrackRecord>, StoreError> {
        let file = match File::open(&self.table) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(file);
        reader
            .deserialize::<CsvRow>()
            .map(|row| TrackRecord::try_from(row?))
            .collect()
    }

    fn high_water(&self) -> Result<u64, StoreError> {
        let contents = match fs::read_to_string(&self.sequence) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        contents.trim().parse().map_err(|_| StoreError::Corrupt {
            message: format!(
                "{} holds {:?}, expected an id",
                self.sequence.display(),
                contents.trim()
            ),
        })
    }

    fn insert(&mut self, record: &TrackRecord) -> Result<(), StoreError> {
        let mut records = self.load()?;
        records.push(record.clone());

        // Sequence first: a failed table write then only leaves an id gap.
        self.write_sequence(record.id.max(self.high_water()?))?;
        self.write_table(&records)
    }

    fn remove(&mut self, id: u64) -> Result<bool, StoreError> {
        let mut records = self.load()?;
        let before = records.len();
        records.retain(|record| record.id != id);
        if records.len() == before {
            return Ok(false);
        }

        let high_water = records
            .iter()
            .map(|record| record.id)
            .fold(self.high_water()?, u64::max)
            .max(id);
        self.write_sequence(high_water)?;
        self.write_table(&records)?;
        Ok(true)
    }

    fn clear(&mut self, policy: IdPolicy) -> Result<(), StoreError> {
        match policy {
            IdPolicy::Reset => {
                // Sequence first; if the table then cannot be removed the
                // old mark is restored and every record is still there.
                let high_water = self.high_water()?;
                remove_if_exists(&self.sequence)?;
                if let Err(e) = remove_if_exists(&self.table) {
                    if high_water > 0 {
                        self.write_sequence(high_water)?;
                    }
                    return Err(e);
                }
                Ok(())
            }
            IdPolicy::Preserve => {
                let high_water = self
                    .load()?
                    .iter()
                    .map(|record| record.id)
                    .fold(self.high_water()?, u64::max);
                self.write_sequence(high_water)?;
                remove_if_exists(&self.table)
            }
        }
    }
}
