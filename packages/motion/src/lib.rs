#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Motion metrics between consecutive location reports.
//!
//! [`analyze`] is a pure function of the predecessor record and the new
//! report. It derives elapsed time, great-circle distance, implied speed
//! and an anomaly verdict for physically implausible movement.

use geotrack_track_models::{MotionMetrics, ParsedReport, TrackRecord};

/// Mean Earth radius used by [`haversine_km`], in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Speeds above this are flagged as anomalous, in km/h.
pub const MAX_PLAUSIBLE_SPEED_KMH: f64 = 1000.0;

/// Jumps longer than this within [`JUMP_WINDOW_SECONDS`] are anomalous.
pub const MAX_JUMP_DISTANCE_KM: f64 = 1000.0;

/// Time window for the [`MAX_JUMP_DISTANCE_KM`] rule, in seconds.
pub const JUMP_WINDOW_SECONDS: f64 = 3600.0;

/// Great-circle distance between two points, in kilometers.
///
/// Uses the haversine formula on a sphere of radius [`EARTH_RADIUS_KM`].
/// Inputs are decimal degrees. Any finite input yields a distance between
/// zero and half the circumference; coordinates are not range checked.
#[must_use]
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    // Differences are taken in radians so huge degree values cannot overflow.
    let delta_phi = phi2 - phi1;
    let delta_lambda = lon2.to_radians() - lon1.to_radians();

    let a = ((delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2))
    .clamp(0.0, 1.0);

    2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Speed implied by covering `distance_km` in `delta_seconds`.
///
/// Returns `None` for zero or negative elapsed time.
#[must_use]
pub fn speed_kmh(distance_km: f64, delta_seconds: f64) -> Option<f64> {
    (delta_seconds > 0.0).then(|| distance_km / (delta_seconds / 3600.0))
}

/// Whether a transition implies implausible travel.
///
/// Fires when the speed exceeds [`MAX_PLAUSIBLE_SPEED_KMH`], or when the
/// distance exceeds [`MAX_JUMP_DISTANCE_KM`] and less than
/// [`JUMP_WINDOW_SECONDS`] elapsed. The second rule also applies to
/// negative elapsed time.
#[must_use]
pub fn is_anomalous(distance_km: f64, delta_seconds: f64, speed_kmh: Option<f64>) -> bool {
    speed_kmh.is_some_and(|speed| speed > MAX_PLAUSIBLE_SPEED_KMH)
        || (distance_km > MAX_JUMP_DISTANCE_KM && delta_seconds < JUMP_WINDOW_SECONDS)
}

/// Describes the transition from `previous` to `current`.
#[must_use]
pub fn describe_transition(previous: &TrackRecord, current: &ParsedReport) -> String {
    format!(
        "From ({:?}, {:?}) to ({:?}, {:?})",
        previous.latitude, previous.longitude, current.latitude, current.longitude
    )
}

/// Derives motion metrics for `current` relative to `previous`.
///
/// Without a predecessor the report is treated as the first ever stored:
/// no elapsed time, zero distance, no anomaly.
#[must_use]
pub fn analyze(previous: Option<&TrackRecord>, current: &ParsedReport) -> MotionMetrics {
    let Some(previous) = previous else {
        return MotionMetrics::first();
    };

    let delta = delta_seconds(previous, current);
    let distance = haversine_km(
        previous.latitude,
        previous.longitude,
        current.latitude,
        current.longitude,
    );
    let speed = speed_kmh(distance, delta);

    MotionMetrics {
        delta_time_seconds: Some(delta),
        distance_km: distance,
        speed_kmh: speed,
        anomaly: is_anomalous(distance, delta, speed),
        from_to: Some(describe_transition(previous, current)),
    }
}

#[allow(clippy::cast_precision_loss)]
fn delta_seconds(previous: &TrackRecord, current: &ParsedReport) -> f64 {
    let delta = current.timestamp - previous.timestamp;
    delta.num_microseconds().map_or_else(
        || delta.num_milliseconds() as f64 / 1_000.0,
        |us| us as f64 / 1_000_000.0,
    )
}
