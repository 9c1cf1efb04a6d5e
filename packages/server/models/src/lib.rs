#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the geotrack server.
//!
//! Track records themselves are returned as
//! [`geotrack_track_models::TrackRecord`]; the types here wrap status
//! messages and query parameters around them.

use geotrack_track_models::{SortOrder, TrackRecord};
use serde::{Deserialize, Serialize};

/// Outcome reported in every status response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiStatus {
    /// The operation completed.
    Success,
    /// The operation failed; see the message.
    Error,
}

/// A bare status response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiMessage {
    /// Outcome.
    pub status: ApiStatus,
    /// Human-readable description.
    pub message: String,
}

impl ApiMessage {
    /// A success response.
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: ApiStatus::Success,
            message: message.into(),
        }
    }

    /// An error response.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ApiStatus::Error,
            message: message.into(),
        }
    }
}

/// Response to a successful report submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiSubmitResponse {
    /// Always [`ApiStatus::Success`].
    pub status: ApiStatus,
    /// Human-readable description.
    pub message: String,
    /// Id assigned to the stored record.
    pub id: u64,
    /// Whether the transition was flagged as implausible.
    pub anomaly: bool,
    /// Kilometers from the predecessor.
    pub distance: f64,
    /// Transition description, `null` for the first record.
    pub from_to: Option<String>,
}

impl From<&TrackRecord> for ApiSubmitResponse {
    fn from(record: &TrackRecord) -> Self {
        Self {
            status: ApiStatus::Success,
            message: "Data saved successfully!".to_string(),
            id: record.id,
            anomaly: record.anomaly,
            distance: record.distance_km,
            from_to: record.from_to.clone(),
        }
    }
}

/// Query parameters for the record listing endpoint.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ListQueryParams {
    /// `asc` or `desc` by timestamp (default `desc`).
    pub order: Option<SortOrder>,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHealth {
    /// Whether the service is healthy.
    pub healthy: bool,
    /// Service version.
    pub version: String,
    /// Storage backend in use.
    pub backend: String,
}
