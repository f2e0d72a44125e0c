//! # Sonde Entity
//!
//! State of one tracked radiosonde: latest reading, bounded history,
//! sticky side fields, derived quantities and lifecycle status.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

use crate::feed::protocol::{Sample, SideFields};
use crate::physics::geo::{haversine_m, GeoPoint};
use crate::physics::kinematics::{kinematics, Kinematics};
use crate::physics::meteo::{dew_point, lcl_height, potential_temperature, zero_isotherm};

/// Lifecycle status of a sonde
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Reported within the activity timeout
    Active,
    /// Silent for longer than the activity timeout
    Finished,
}

/// Quantities recomputed on every merge
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Derived {
    /// Dew point in °C
    pub dew_point: Option<f64>,

    /// Potential temperature in K
    pub potential_temperature: Option<f64>,

    /// Lifting condensation level above the sonde in m
    pub lcl_height: Option<f64>,

    /// Altitude of the 0 °C crossing in the history in m
    pub zero_isotherm: Option<f64>,

    /// Speeds and course from the last two history entries
    #[serde(flatten)]
    pub motion: Kinematics,

    /// Great-circle distance to the receiver in m
    pub distance_to_receiver: Option<f64>,
}

/// One tracked radiosonde
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sonde {
    /// Identifier as reported by the aggregator
    pub id: String,

    /// Last non-empty model label
    pub sonde_type: Option<String>,

    /// Most recent reading (always set once the sonde is in a store)
    pub latest: Option<Sample>,

    /// Latest known wind speed
    pub wind_speed: Option<f64>,

    /// Latest known wind direction in degrees
    pub wind_direction: Option<f64>,

    /// Latest known signal strength in dBm
    pub rssi: Option<f64>,

    /// Past readings, oldest first, strictly increasing in time
    #[serde(skip)]
    pub history: VecDeque<Sample>,

    /// Derived quantities
    pub derived: Derived,

    /// Seconds since the latest reading, as of the last recompute
    pub age_sec: Option<f64>,

    /// Lifecycle status, as of the last recompute
    pub status: Status,
}

impl Sonde {
    /// Create an empty sonde with all derived fields absent
    pub(crate) fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sonde_type: None,
            latest: None,
            wind_speed: None,
            wind_direction: None,
            rssi: None,
            history: VecDeque::new(),
            derived: Derived::default(),
            age_sec: None,
            status: Status::Active,
        }
    }

    /// Instant of the latest reading
    pub fn time(&self) -> Option<DateTime<Utc>> {
        self.latest.as_ref().map(|s| s.time)
    }

    /// Seconds elapsed between the latest reading and `now`
    pub fn age_at(&self, now: DateTime<Utc>) -> Option<f64> {
        self.time()
            .map(|t| (now - t).num_milliseconds() as f64 / 1000.0)
    }

    /// Append `sample` if it is strictly newer than the latest reading
    ///
    /// Oldest entries are evicted so history never exceeds `limit`.
    ///
    /// # Returns
    ///
    /// * `bool` - `true` if the sample was appended and adopted as latest
    pub(crate) fn push_sample(&mut self, sample: Sample, limit: usize) -> bool {
        if let Some(current) = self.time() {
            if sample.time <= current {
                return false;
            }
        }

        self.history.push_back(sample.clone());
        while self.history.len() > limit {
            self.history.pop_front();
        }
        self.latest = Some(sample);
        true
    }

    /// Overwrite the latest-known side fields
    ///
    /// Applied for every accepted row, including rows whose sample was too
    /// old to enter the history. A late row can therefore replace newer wind
    /// and signal values.
    pub(crate) fn apply_side_fields(&mut self, side: SideFields) {
        if !side.sonde_type.is_empty() {
            self.sonde_type = Some(side.sonde_type);
        }
        self.wind_speed = side.wind_speed;
        self.wind_direction = side.wind_direction;
        self.rssi = side.rssi;
    }

    /// Recompute `age_sec` and `status`
    ///
    /// # Returns
    ///
    /// * `bool` - `true` if the status changed
    pub(crate) fn refresh_status(&mut self, now: DateTime<Utc>, activity_timeout_s: f64) -> bool {
        let previous = self.status;
        self.age_sec = self.age_at(now);
        self.status = match self.age_sec {
            Some(age) if age > activity_timeout_s => Status::Finished,
            _ => Status::Active,
        };
        previous != self.status
    }

    /// Recompute every derived field from `latest` and `history`
    pub(crate) fn recompute_derived(&mut self, receiver: GeoPoint) {
        let Some(latest) = self.latest.as_ref() else {
            self.derived = Derived::default();
            return;
        };

        let dew = dew_point(latest.temp, latest.humidity);

        let n = self.history.len();
        let motion = if n >= 2 {
            kinematics(&self.history[n - 2], &self.history[n - 1])
        } else {
            Kinematics::default()
        };

        self.derived = Derived {
            dew_point: dew,
            potential_temperature: potential_temperature(latest.temp, latest.pressure),
            lcl_height: lcl_height(latest.temp, dew),
            zero_isotherm: zero_isotherm(&self.history),
            motion,
            distance_to_receiver: haversine_m(GeoPoint::new(latest.lat, latest.lon), receiver),
        };
    }
}
