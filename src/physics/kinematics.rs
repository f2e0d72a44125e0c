//! # Kinematics
//!
//! Speeds and course from the two most recent samples of a sonde.
//!
//! The elapsed time is clamped to 0.5..=600 s so duplicate timestamps do
//! not divide by zero and long gaps do not yield meaningless averages.

use serde::Serialize;

use super::finite;
use super::geo::{haversine_m, initial_bearing_deg, GeoPoint};
use crate::feed::protocol::Sample;

/// Lower clamp for the elapsed time between samples in seconds
pub const MIN_ELAPSED_S: f64 = 0.5;

/// Upper clamp for the elapsed time between samples in seconds
pub const MAX_ELAPSED_S: f64 = 600.0;

/// Motion derived from two consecutive samples
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Kinematics {
    /// Ground speed in m/s
    pub horizontal_speed: Option<f64>,

    /// Climb rate in m/s (negative while descending)
    pub vertical_speed: Option<f64>,

    /// Speed along the 3-D path in m/s
    pub speed_3d: Option<f64>,

    /// Course over ground in degrees from north
    pub course: Option<f64>,
}

/// Compute kinematics between an older and a newer sample
///
/// # Examples
///
/// ```
/// use chrono::{Duration, TimeZone, Utc};
/// use sonde_tracker::feed::protocol::Sample;
/// use sonde_tracker::physics::kinematics::kinematics;
///
/// let t0 = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
/// let older = Sample { time: t0, lat: 54.0, lon: 18.0, alt: Some(1000.0),
///     temp: None, pressure: None, humidity: None };
/// let newer = Sample { time: t0 + Duration::seconds(10), alt: Some(1050.0), ..older.clone() };
///
/// let k = kinematics(&older, &newer);
/// assert_eq!(k.vertical_speed, Some(5.0));
/// assert_eq!(k.horizontal_speed, Some(0.0));
/// ```
pub fn kinematics(older: &Sample, newer: &Sample) -> Kinematics {
    let elapsed_ms = (newer.time - older.time).num_milliseconds() as f64;
    let dt = (elapsed_ms / 1000.0).clamp(MIN_ELAPSED_S, MAX_ELAPSED_S);

    let from = GeoPoint::new(older.lat, older.lon);
    let to = GeoPoint::new(newer.lat, newer.lon);
    let distance = haversine_m(from, to);

    let climb = match (older.alt.and_then(finite), newer.alt.and_then(finite)) {
        (Some(a1), Some(a2)) => Some(a2 - a1),
        _ => None,
    };

    Kinematics {
        horizontal_speed: distance.and_then(|d| finite(d / dt)),
        vertical_speed: climb.and_then(|dz| finite(dz / dt)),
        speed_3d: distance
            .zip(climb)
            .and_then(|(d, dz)| finite((d * d + dz * dz).sqrt() / dt)),
        course: initial_bearing_deg(from, to),
    }
}
