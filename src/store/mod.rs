//! # Entity Store & Merge Engine
//!
//! Owns the mapping from sonde identifier to [`Sonde`] and folds decoded
//! records into it.
//!
//! This module handles:
//! - Creating sondes on their first accepted record
//! - Appending strictly newer samples to a bounded history
//! - Recomputing derived fields and lifecycle status on every merge
//! - Removing finished sondes once they leave the visibility window
//!
//! The store is owned by the ingestion driver, the only writer. Readers get
//! a [`StoreSnapshot`] instead of references into the live map.

pub mod sonde;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::config::TrackingConfig;
use crate::feed::protocol::DecodedRecord;
use crate::physics::geo::GeoPoint;

pub use sonde::{Derived, Sonde, Status};

/// Default maximum history length per sonde
pub const DEFAULT_HISTORY_LIMIT: usize = 600;

/// Default silence after which a sonde is finished, in seconds
pub const DEFAULT_ACTIVITY_TIMEOUT_S: u64 = 900;

/// Default silence after which a finished sonde is removed, in seconds
pub const DEFAULT_VISIBILITY_WINDOW_S: u64 = 3600;

/// Tunables of the merge engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoreSettings {
    /// Maximum number of samples kept per sonde
    pub history_limit: usize,

    /// Silence after which a sonde becomes finished, in seconds
    pub activity_timeout_s: f64,

    /// Silence after which a finished sonde is removed, in seconds
    pub visibility_window_s: f64,

    /// Receiver location used for distance
    pub receiver: GeoPoint,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            activity_timeout_s: DEFAULT_ACTIVITY_TIMEOUT_S as f64,
            visibility_window_s: DEFAULT_VISIBILITY_WINDOW_S as f64,
            receiver: GeoPoint::new(54.352, 18.646),
        }
    }
}

impl From<&TrackingConfig> for StoreSettings {
    fn from(config: &TrackingConfig) -> Self {
        Self {
            history_limit: config.history_limit,
            activity_timeout_s: config.activity_timeout_s as f64,
            visibility_window_s: config.visibility_window_s as f64,
            receiver: GeoPoint::new(config.receiver_lat, config.receiver_lon),
        }
    }
}

/// What a merge did to the affected sonde
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// A new sonde was created from the record
    Created,
    /// The sample was newer and entered the history
    Appended,
    /// The sample was not newer; only side fields changed
    SideFieldsOnly,
}

/// Result of one expiry sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Sondes that turned from active to finished during the sweep
    pub finished: Vec<String>,
    /// Sondes removed from the store
    pub removed: Vec<String>,
}

/// Read-only copy of the store handed to renderers
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreSnapshot {
    /// When the snapshot was taken
    pub taken_at: Option<DateTime<Utc>>,
    /// All sondes, sorted by identifier
    pub sondes: Vec<Sonde>,
}

impl StoreSnapshot {
    /// Look up a sonde by identifier
    pub fn get(&self, id: &str) -> Option<&Sonde> {
        self.sondes
            .binary_search_by(|s| s.id.as_str().cmp(id))
            .ok()
            .map(|i| &self.sondes[i])
    }

    /// Number of sondes with `Status::Active`
    pub fn active_count(&self) -> usize {
        self.sondes.iter().filter(|s| s.status == Status::Active).count()
    }
}

/// Identifier → sonde map with merge and expiry operations
#[derive(Debug, Clone, Default)]
pub struct SondeStore {
    settings: StoreSettings,
    sondes: HashMap<String, Sonde>,
}

impl SondeStore {
    /// Create an empty store
    pub fn new(settings: StoreSettings) -> Self {
        Self {
            settings,
            sondes: HashMap::new(),
        }
    }

    /// Settings the store was created with
    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    /// Merge one decoded record
    ///
    /// Never fails: absent inputs only propagate to absent derived fields.
    ///
    /// # Arguments
    ///
    /// * `record` - Record accepted by the decoder
    /// * `now` - Reference instant for age and status
    ///
    /// # Returns
    ///
    /// * `MergeOutcome` - How the sonde named by `record.id` changed
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::Utc;
    /// use sonde_tracker::feed::{decoder::decode_row, schema::resolve_columns};
    /// use sonde_tracker::store::{MergeOutcome, SondeStore, StoreSettings};
    ///
    /// let columns = resolve_columns(&["ID", "DateTime", "Lat", "Lon"]);
    /// let record = decode_row("SP1;1700000000;54.5;18.5", ';', &columns, None).unwrap();
    ///
    /// let mut store = SondeStore::new(StoreSettings::default());
    /// assert_eq!(store.merge(record.clone(), Utc::now()), MergeOutcome::Created);
    /// assert_eq!(store.merge(record, Utc::now()), MergeOutcome::SideFieldsOnly);
    /// assert_eq!(store.get("SP1").unwrap().history.len(), 1);
    /// ```
    pub fn merge(&mut self, record: DecodedRecord, now: DateTime<Utc>) -> MergeOutcome {
        let settings = self.settings;
        let DecodedRecord { id, sample, side } = record;

        let mut created = false;
        let sonde = self.sondes.entry(id).or_insert_with_key(|id| {
            created = true;
            Sonde::new(id.clone())
        });

        let appended = sonde.push_sample(sample, settings.history_limit);
        sonde.apply_side_fields(side);
        sonde.refresh_status(now, settings.activity_timeout_s);
        sonde.recompute_derived(settings.receiver);

        if created {
            debug!("New sonde {}", sonde.id);
            MergeOutcome::Created
        } else if appended {
            MergeOutcome::Appended
        } else {
            MergeOutcome::SideFieldsOnly
        }
    }

    /// Refresh status of every sonde and drop expired ones
    ///
    /// A sonde is removed when it is finished and its latest reading is
    /// older than the visibility window. Call once per ingestion cycle,
    /// after the whole batch has been merged.
    pub fn sweep_expired(&mut self, now: DateTime<Utc>) -> SweepReport {
        let settings = self.settings;
        let mut report = SweepReport::default();

        for sonde in self.sondes.values_mut() {
            if sonde.refresh_status(now, settings.activity_timeout_s)
                && sonde.status == Status::Finished
            {
                report.finished.push(sonde.id.clone());
            }
        }

        self.sondes.retain(|id, sonde| {
            let expired = sonde.status == Status::Finished
                && sonde
                    .age_sec
                    .is_some_and(|age| age > settings.visibility_window_s);
            if expired {
                report.removed.push(id.clone());
            }
            !expired
        });

        report.finished.sort();
        report.removed.sort();
        if !report.removed.is_empty() {
            info!("Removed {} expired sonde(s): {}", report.removed.len(), report.removed.join(", "));
        }
        report
    }

    /// Look up a sonde by identifier
    pub fn get(&self, id: &str) -> Option<&Sonde> {
        self.sondes.get(id)
    }

    /// Iterate over all sondes in arbitrary order
    pub fn iter(&self) -> impl Iterator<Item = &Sonde> {
        self.sondes.values()
    }

    /// Number of tracked sondes
    pub fn len(&self) -> usize {
        self.sondes.len()
    }

    /// Whether no sonde is tracked
    pub fn is_empty(&self) -> bool {
        self.sondes.is_empty()
    }

    /// Copy the current state for readers
    pub fn snapshot(&self, taken_at: DateTime<Utc>) -> StoreSnapshot {
        let mut sondes: Vec<Sonde> = self.sondes.values().cloned().collect();
        sondes.sort_by(|a, b| a.id.cmp(&b.id));
        StoreSnapshot {
            taken_at: Some(taken_at),
            sondes,
        }
    }
}
