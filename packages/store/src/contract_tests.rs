//! Behavior shared by every backend, run against each of them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use geotrack_track_models::{LocationReport, ReportError, SortOrder, TrackRecord};

use crate::{CsvCollection, DocumentCollection, GuardedStore, IdPolicy, StoreError, TrackStore};

/// A unique directory under the system temp dir, removed on drop.
pub struct ScratchDir(PathBuf);

impl ScratchDir {
    pub fn new() -> Self {
        let name = format!("geotrack-store-{}", uuid::Uuid::new_v4());
        let path = std::env::temp_dir().join(name);
        std::fs::create_dir_all(&path).unwrap();
        Self(path)
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

pub fn report_at(latitude: f64, longitude: f64, timestamp: &str) -> LocationReport {
    LocationReport {
        latitude: Some(latitude),
        longitude: Some(longitude),
        accuracy: Some(5.0),
        timestamp: Some(timestamp.to_string()),
        source_ip: Some("203.0.113.7".to_string()),
        label: Some("phone".to_string()),
    }
}

pub struct Fixture {
    pub store: Arc<dyn TrackStore>,
    _scratch: Option<ScratchDir>,
}

pub fn open_csv(policy: IdPolicy) -> Fixture {
    let scratch = ScratchDir::new();
    let collection = CsvCollection::open(scratch.path()).unwrap();
    Fixture {
        store: Arc::new(GuardedStore::new(collection, policy)),
        _scratch: Some(scratch),
    }
}

pub fn open_document(policy: IdPolicy) -> Fixture {
    let collection = DocumentCollection::temporary().unwrap();
    Fixture {
        store: Arc::new(GuardedStore::new(collection, policy)),
        _scratch: None,
    }
}

fn ids(records: &[TrackRecord]) -> Vec<u64> {
    records.iter().map(|r| r.id).collect()
}

mod cases {
    use super::*;

    pub async fn empty_store_has_no_most_recent(open: fn(IdPolicy) -> Fixture) {
        let fixture = open(IdPolicy::Reset);
        assert!(fixture.store.most_recent().await.unwrap().is_none());
        assert!(fixture.store.list(SortOrder::Desc).await.unwrap().is_empty());
    }

    pub async fn first_append_has_no_predecessor(open: fn(IdPolicy) -> Fixture) {
        let fixture = open(IdPolicy::Reset);
        let record = fixture
            .store
            .append(&report_at(-6.2, 106.8, "2024-05-01T08:00:00Z"))
            .await
            .unwrap();

        assert_eq!(record.id, 1);
        assert_eq!(record.delta_time_seconds, None);
        assert!(record.distance_km.abs() < f64::EPSILON);
        assert_eq!(record.speed_kmh, None);
        assert!(!record.anomaly);
        assert_eq!(record.from_to, None);
    }

    pub async fn ids_increase_from_one(open: fn(IdPolicy) -> Fixture) {
        let fixture = open(IdPolicy::Reset);
        for (i, minute) in (0..5).enumerate() {
            let record = fixture
                .store
                .append(&report_at(0.0, 0.0, &format!("2024-05-01T08:0{minute}:00Z")))
                .await
                .unwrap();
            assert_eq!(record.id, i as u64 + 1);
        }
    }

    pub async fn predecessor_is_latest_by_timestamp(open: fn(IdPolicy) -> Fixture) {
        let fixture = open(IdPolicy::Reset);
        let store = &fixture.store;
        store
            .append(&report_at(0.0, 0.0, "2024-05-01T10:00:00Z"))
            .await
            .unwrap();
        // Arrives later but happened earlier.
        let early = store
            .append(&report_at(0.0, 0.01, "2024-05-01T09:00:00Z"))
            .await
            .unwrap();
        assert_eq!(early.delta_time_seconds, Some(-3600.0));
        assert_eq!(early.speed_kmh, None);

        // The 10:00 record is still the most recent.
        let next = store
            .append(&report_at(0.0, 0.0, "2024-05-01T09:30:00Z"))
            .await
            .unwrap();
        assert_eq!(next.delta_time_seconds, Some(-1800.0));
        assert_eq!(
            next.from_to.as_deref(),
            Some("From (0.0, 0.0) to (0.0, 0.0)")
        );
        assert_eq!(store.most_recent().await.unwrap().map(|r| r.id), Some(1));
    }

    pub async fn list_orders_are_exact_reverses(open: fn(IdPolicy) -> Fixture) {
        let fixture = open(IdPolicy::Reset);
        for timestamp in [
            "2024-05-01T08:00:00Z",
            "2024-05-01T07:00:00Z",
            "2024-05-01T08:00:00Z",
            "2024-05-01T09:00:00Z",
            "2024-05-01T07:00:00Z",
        ] {
            fixture
                .store
                .append(&report_at(0.0, 0.0, timestamp))
                .await
                .unwrap();
        }

        let asc = fixture.store.list(SortOrder::Asc).await.unwrap();
        let mut desc = fixture.store.list(SortOrder::Desc).await.unwrap();
        assert_eq!(ids(&asc), vec![2, 5, 1, 3, 4]);

        desc.reverse();
        assert_eq!(asc, desc);
    }

    pub async fn append_round_trips_through_list(open: fn(IdPolicy) -> Fixture) {
        let fixture = open(IdPolicy::Reset);
        let mut appended = Vec::new();
        for (lat, lon, timestamp) in [
            (-6.175_392, 106.827_153, "2024-05-01T08:00:00Z"),
            (-6.2, 106.816_666, "2024-05-01T08:17:33.250+07:00"),
            (51.507_4, -0.127_8, "2024-05-01T08:20:00Z"),
        ] {
            appended.push(
                fixture
                    .store
                    .append(&report_at(lat, lon, timestamp))
                    .await
                    .unwrap(),
            );
        }

        let listed = fixture.store.list(SortOrder::Asc).await.unwrap();
        let mut expected = appended.clone();
        crate::sort_records(&mut expected, SortOrder::Asc);
        assert_eq!(listed, expected);
        assert!(appended[2].anomaly);
    }

    pub async fn get_returns_record_or_not_found(open: fn(IdPolicy) -> Fixture) {
        let fixture = open(IdPolicy::Reset);
        let record = fixture
            .store
            .append(&report_at(1.0, 1.0, "2024-05-01T08:00:00Z"))
            .await
            .unwrap();

        assert_eq!(fixture.store.get(record.id).await.unwrap(), record);
        assert!(matches!(
            fixture.store.get(404).await,
            Err(StoreError::NotFound { id: 404 })
        ));
    }

    pub async fn delete_one_removes_exactly_one(open: fn(IdPolicy) -> Fixture) {
        let fixture = open(IdPolicy::Reset);
        for minute in 0..3 {
            fixture
                .store
                .append(&report_at(0.0, 0.0, &format!("2024-05-01T08:0{minute}:00Z")))
                .await
                .unwrap();
        }

        assert!(fixture.store.delete_one(2).await.unwrap());
        assert_eq!(
            ids(&fixture.store.list(SortOrder::Asc).await.unwrap()),
            vec![1, 3]
        );

        assert!(!fixture.store.delete_one(2).await.unwrap());
        assert!(!fixture.store.delete_one(77).await.unwrap());
        assert_eq!(fixture.store.list(SortOrder::Asc).await.unwrap().len(), 2);
    }

    pub async fn deleted_ids_are_never_reused(open: fn(IdPolicy) -> Fixture) {
        let fixture = open(IdPolicy::Reset);
        fixture
            .store
            .append(&report_at(0.0, 0.0, "2024-05-01T08:00:00Z"))
            .await
            .unwrap();
        fixture
            .store
            .append(&report_at(0.0, 0.0, "2024-05-01T08:01:00Z"))
            .await
            .unwrap();
        assert!(fixture.store.delete_one(2).await.unwrap());

        let next = fixture
            .store
            .append(&report_at(0.0, 0.0, "2024-05-01T08:02:00Z"))
            .await
            .unwrap();
        assert_eq!(next.id, 3);
        // Predecessor comes from what is left in the store.
        assert_eq!(next.delta_time_seconds, Some(120.0));
    }

    pub async fn reset_delete_all_restarts_ids(open: fn(IdPolicy) -> Fixture) {
        let fixture = open(IdPolicy::Reset);
        for minute in 0..3 {
            fixture
                .store
                .append(&report_at(0.0, 0.0, &format!("2024-05-01T08:0{minute}:00Z")))
                .await
                .unwrap();
        }

        fixture.store.delete_all().await.unwrap();
        assert!(fixture.store.list(SortOrder::Desc).await.unwrap().is_empty());

        let record = fixture
            .store
            .append(&report_at(10.0, 10.0, "2024-05-01T09:00:00Z"))
            .await
            .unwrap();
        assert_eq!(record.id, 1);
        assert_eq!(record.delta_time_seconds, None);
        assert_eq!(record.from_to, None);
        assert!(!record.anomaly);
    }

    pub async fn preserve_delete_all_continues_ids(open: fn(IdPolicy) -> Fixture) {
        let fixture = open(IdPolicy::Preserve);
        for minute in 0..3 {
            fixture
                .store
                .append(&report_at(0.0, 0.0, &format!("2024-05-01T08:0{minute}:00Z")))
                .await
                .unwrap();
        }

        fixture.store.delete_all().await.unwrap();
        assert!(fixture.store.most_recent().await.unwrap().is_none());

        let record = fixture
            .store
            .append(&report_at(10.0, 10.0, "2024-05-01T09:00:00Z"))
            .await
            .unwrap();
        assert_eq!(record.id, 4);
        assert_eq!(record.delta_time_seconds, None);
        assert!(!record.anomaly);
    }

    pub async fn invalid_report_does_not_mutate(open: fn(IdPolicy) -> Fixture) {
        let fixture = open(IdPolicy::Reset);
        let bad_timestamp = LocationReport {
            timestamp: Some("2024-05-01 sometime".to_string()),
            ..report_at(0.0, 0.0, "")
        };
        let missing_label = LocationReport {
            label: None,
            ..report_at(0.0, 0.0, "2024-05-01T08:00:00Z")
        };

        for report in [bad_timestamp, missing_label] {
            let err = fixture.store.append(&report).await.unwrap_err();
            assert!(err.is_client_error(), "{err}");
        }
        assert!(fixture.store.list(SortOrder::Asc).await.unwrap().is_empty());

        let record = fixture
            .store
            .append(&report_at(0.0, 0.0, "2024-05-01T08:00:00Z"))
            .await
            .unwrap();
        assert_eq!(record.id, 1);
    }

    pub async fn concurrent_appends_get_unique_ids(open: fn(IdPolicy) -> Fixture) {
        const APPENDS: u64 = 24;

        let fixture = open(IdPolicy::Reset);
        let handles: Vec<_> = (0..APPENDS)
            .map(|i| {
                let store = Arc::clone(&fixture.store);
                tokio::spawn(async move {
                    store
                        .append(&report_at(
                            0.0,
                            0.0,
                            &format!("2024-05-01T08:{:02}:00Z", i % 60),
                        ))
                        .await
                })
            })
            .collect();

        let mut records = Vec::new();
        for handle in handles {
            records.push(handle.await.unwrap().unwrap());
        }

        let mut assigned = ids(&records);
        assigned.sort_unstable();
        assert_eq!(assigned, (1..=APPENDS).collect::<Vec<_>>());

        let without_predecessor = records
            .iter()
            .filter(|r| r.delta_time_seconds.is_none())
            .count();
        assert_eq!(without_predecessor, 1);
        assert_eq!(
            fixture.store.list(SortOrder::Asc).await.unwrap().len() as u64,
            APPENDS
        );
    }

    pub async fn implausible_jump_is_flagged(open: fn(IdPolicy) -> Fixture) {
        let fixture = open(IdPolicy::Reset);
        fixture
            .store
            .append(&report_at(0.0, 0.0, "2024-05-01T08:00:00Z"))
            .await
            .unwrap();
        let record = fixture
            .store
            .append(&report_at(0.0, 90.0, "2024-05-01T08:00:01Z"))
            .await
            .unwrap();

        assert!((record.distance_km - 10_007.5).abs() < 0.1);
        assert!(record.anomaly);
        assert_eq!(
            fixture.store.get(record.id).await.unwrap().anomaly,
            record.anomaly
        );
    }

    pub async fn extreme_coordinates_stay_readable(open: fn(IdPolicy) -> Fixture) {
        let fixture = open(IdPolicy::Reset);
        let first = fixture
            .store
            .append(&report_at(-1e308, 0.0, "2024-05-01T08:00:00Z"))
            .await
            .unwrap();
        let second = fixture
            .store
            .append(&report_at(1e308, 0.0, "2024-05-01T08:00:01Z"))
            .await
            .unwrap();
        assert!(second.distance_km.is_finite());
        assert!(second.speed_kmh.is_some_and(f64::is_finite));

        assert_eq!(
            fixture.store.list(SortOrder::Asc).await.unwrap(),
            vec![first, second]
        );

        let third = fixture
            .store
            .append(&report_at(0.0, 0.0, "2024-05-01T08:00:02Z"))
            .await
            .unwrap();
        assert_eq!(third.id, 3);
    }

    pub async fn non_finite_report_is_rejected(open: fn(IdPolicy) -> Fixture) {
        let fixture = open(IdPolicy::Reset);
        let report = report_at(f64::NAN, 0.0, "2024-05-01T08:00:00Z");

        let err = fixture.store.append(&report).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Report(ReportError::NonFiniteValue { field: "latitude" })
        ));
        assert!(fixture.store.most_recent().await.unwrap().is_none());
    }
}

macro_rules! contract_tests {
    ($backend:ident, $open:ident, [$($case:ident),* $(,)?]) => {
        mod $backend {
            $(
                #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
                async fn $case() {
                    super::cases::$case(super::$open).await;
                }
            )*
        }
    };
}

macro_rules! all_contract_tests {
    ($($backend:ident => $open:ident),* $(,)?) => {
        $(
            contract_tests!($backend, $open, [
                empty_store_has_no_most_recent,
                first_append_has_no_predecessor,
                ids_increase_from_one,
                predecessor_is_latest_by_timestamp,
                list_orders_are_exact_reverses,
                append_round_trips_through_list,
                get_returns_record_or_not_found,
                delete_one_removes_exactly_one,
                deleted_ids_are_never_reused,
                reset_delete_all_restarts_ids,
                preserve_delete_all_continues_ids,
                invalid_report_does_not_mutate,
                concurrent_appends_get_unique_ids,
                implausible_jump_is_flagged,
                extreme_coordinates_stay_readable,
                non_finite_report_is_rejected,
            ]);
        )*
    };
}

all_contract_tests!(csv_backend => open_csv, document_backend => open_document);

#[test]
fn open_store_selects_configured_backend() {
    let scratch = ScratchDir::new();
    for backend in [crate::Backend::Csv, crate::Backend::Document] {
        let config = crate::StoreConfig {
            backend,
            data_dir: scratch.path().to_path_buf(),
            id_policy: IdPolicy::Preserve,
        };
        let store = crate::open_store(&config).unwrap();
        assert_eq!(store.backend(), backend);
    }
    assert!(scratch.path().join(crate::paths::DOCUMENT_DB_DIR).exists());
}
