#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Location report and track record types.
//!
//! A [`LocationReport`] is what a client submits. Parsing it yields a
//! [`ParsedReport`] with a timezone-aware instant, which the motion
//! analyzer and the track stores combine with a freshly assigned id into
//! an immutable [`TrackRecord`].

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Errors produced while validating an inbound [`LocationReport`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReportError {
    /// The timestamp was absent or not an ISO 8601 instant with a UTC
    /// designator or offset.
    #[error("Invalid timestamp format: {value:?}")]
    InvalidTimestamp {
        /// The raw value that failed to parse (`None` when absent).
        value: Option<String>,
    },

    /// A required report field was absent.
    #[error("Missing required field: {field}")]
    MissingField {
        /// JSON name of the missing field.
        field: &'static str,
    },

    /// A numeric field was NaN or infinite.
    #[error("Field {field} must be a finite number")]
    NonFiniteValue {
        /// Name of the offending field.
        field: &'static str,
    },
}

/// A geolocation report as submitted by a client.
///
/// All fields are optional so that absent values surface as
/// [`ReportError`]s from [`LocationReport::parse`] instead of opaque
/// deserializer failures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationReport {
    /// Latitude in decimal degrees (WGS84).
    pub latitude: Option<f64>,
    /// Longitude in decimal degrees (WGS84).
    pub longitude: Option<f64>,
    /// Reported horizontal accuracy, in meters.
    pub accuracy: Option<f64>,
    /// ISO 8601 timestamp with `Z` or a numeric offset.
    pub timestamp: Option<String>,
    /// Source IP address of the reporting client.
    #[serde(rename = "ip")]
    pub source_ip: Option<String>,
    /// Free-form label supplied by the client.
    pub label: Option<String>,
}

impl LocationReport {
    /// Validates the report and parses its timestamp.
    ///
    /// The timestamp is checked first, so a report that is missing both a
    /// timestamp and other fields reports [`ReportError::InvalidTimestamp`].
    ///
    /// # Errors
    ///
    /// * [`ReportError::InvalidTimestamp`] if the timestamp is absent or
    ///   unparseable
    /// * [`ReportError::MissingField`] if any other field is absent
    /// * [`ReportError::NonFiniteValue`] if a coordinate or the accuracy is
    ///   NaN or infinite
    pub fn parse(&self) -> Result<ParsedReport, ReportError> {
        let timestamp = match self.timestamp.as_deref() {
            Some(raw) => parse_timestamp(raw)?,
            None => return Err(ReportError::InvalidTimestamp { value: None }),
        };

        Ok(ParsedReport {
            latitude: finite(required(self.latitude, "latitude")?, "latitude")?,
            longitude: finite(required(self.longitude, "longitude")?, "longitude")?,
            accuracy: finite(required(self.accuracy, "accuracy")?, "accuracy")?,
            timestamp,
            source_ip: required(self.source_ip.clone(), "ip")?,
            label: required(self.label.clone(), "label")?,
        })
    }
}

fn required<T>(value: Option<T>, field: &'static str) -> Result<T, ReportError> {
    value.ok_or(ReportError::MissingField { field })
}

fn finite(value: f64, field: &'static str) -> Result<f64, ReportError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ReportError::NonFiniteValue { field })
    }
}

/// Parses an ISO 8601 / RFC 3339 timestamp into a UTC instant.
///
/// Accepts a trailing `Z` or a numeric offset (`+07:00`). Timestamps
/// without any zone designator are rejected.
///
/// # Errors
///
/// Returns [`ReportError::InvalidTimestamp`] if the string cannot be parsed.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ReportError> {
    DateTime::<FixedOffset>::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ReportError::InvalidTimestamp {
            value: Some(raw.to_string()),
        })
}

/// A [`LocationReport`] whose fields are all present and whose timestamp
/// has been parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReport {
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
    /// Reported accuracy, in meters.
    pub accuracy: f64,
    /// When the report was taken.
    pub timestamp: DateTime<Utc>,
    /// Source IP address.
    pub source_ip: String,
    /// Client label.
    pub label: String,
}

/// Motion metrics derived from a report and its predecessor.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionMetrics {
    /// Signed seconds since the predecessor; `None` without a predecessor.
    pub delta_time_seconds: Option<f64>,
    /// Great-circle distance from the predecessor, in kilometers.
    pub distance_km: f64,
    /// Implied speed; `None` unless `delta_time_seconds > 0`.
    pub speed_kmh: Option<f64>,
    /// Whether the transition implies physically implausible travel.
    pub anomaly: bool,
    /// `From (lat, lon) to (lat, lon)`; `None` without a predecessor.
    pub from_to: Option<String>,
}

impl MotionMetrics {
    /// Metrics for the first report ever stored.
    #[must_use]
    pub const fn first() -> Self {
        Self {
            delta_time_seconds: None,
            distance_km: 0.0,
            speed_kmh: None,
            anomaly: false,
            from_to: None,
        }
    }

    /// The first derived value that is NaN or infinite, by its stored name.
    #[must_use]
    pub fn non_finite_field(&self) -> Option<&'static str> {
        [
            ("delta_time", self.delta_time_seconds),
            ("distance", Some(self.distance_km)),
            ("speed", self.speed_kmh),
        ]
        .into_iter()
        .find_map(|(field, value)| value.is_some_and(|v| !v.is_finite()).then_some(field))
    }
}

/// One persisted, immutable, annotated location report.
///
/// The serde field names double as the flat-file header and the
/// document-store shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
    /// Store-assigned identifier, strictly increasing in assignment order.
    pub id: u64,
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
    /// Reported accuracy, in meters.
    pub accuracy: f64,
    /// When the report was taken.
    pub timestamp: DateTime<Utc>,
    /// Signed seconds since the predecessor.
    #[serde(rename = "delta_time")]
    pub delta_time_seconds: Option<f64>,
    /// Kilometers from the predecessor.
    #[serde(rename = "distance")]
    pub distance_km: f64,
    /// Implied speed in km/h.
    #[serde(rename = "speed")]
    pub speed_kmh: Option<f64>,
    /// Source IP address.
    #[serde(rename = "ip")]
    pub source_ip: String,
    /// Client label.
    pub label: String,
    /// Implausible-movement flag.
    pub anomaly: bool,
    /// Human-readable transition description.
    pub from_to: Option<String>,
}

impl TrackRecord {
    /// Combines a parsed report with its derived metrics under `id`.
    #[must_use]
    pub fn new(id: u64, report: ParsedReport, metrics: MotionMetrics) -> Self {
        Self {
            id,
            latitude: report.latitude,
            longitude: report.longitude,
            accuracy: report.accuracy,
            timestamp: report.timestamp,
            delta_time_seconds: metrics.delta_time_seconds,
            distance_km: metrics.distance_km,
            speed_kmh: metrics.speed_kmh,
            source_ip: report.source_ip,
            label: report.label,
            anomaly: metrics.anomaly,
            from_to: metrics.from_to,
        }
    }
}

/// Ordering requested when listing records.
///
/// Records are ordered by `(timestamp, id)`; [`SortOrder::Desc`] is the
/// exact reverse of [`SortOrder::Asc`].
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
pub enum SortOrder {
    /// Oldest first.
    Asc,
    /// Newest first.
    #[default]
    Desc,
}
