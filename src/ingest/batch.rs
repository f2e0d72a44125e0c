//! Folding one CSV snapshot into the store

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use tracing::debug;

use crate::error::DecodeError;
use crate::feed::decoder::decode_row;
use crate::feed::Batch;
use crate::store::{MergeOutcome, SondeStore};

/// Counters and changed entities of one merged snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Non-blank data rows in the snapshot
    pub rows: usize,
    /// Rows merged into the store
    pub accepted: usize,
    /// Rows rejected with `InvalidTimestamp`
    pub invalid_timestamp: usize,
    /// Rows rejected with `InvalidPosition`
    pub invalid_position: usize,
    /// Rows rejected with `FilteredOut`
    pub filtered_out: usize,
    /// Sondes created by this snapshot
    pub created: BTreeSet<String>,
    /// Sondes touched by this snapshot (including created ones)
    pub changed: BTreeSet<String>,
}

impl BatchReport {
    /// Total rejected rows
    pub fn rejected(&self) -> usize {
        self.invalid_timestamp + self.invalid_position + self.filtered_out
    }
}

/// Decode every row of `csv` and merge the accepted ones, in row order
///
/// Rejected rows are skipped; they never abort the batch. Text with fewer
/// than two non-blank lines is an empty batch.
///
/// # Arguments
///
/// * `store` - Store to merge into
/// * `csv` - Raw snapshot text
/// * `filter` - Optional identifier filter
/// * `now` - Reference instant for age and status
pub fn merge_snapshot(
    store: &mut SondeStore,
    csv: &str,
    filter: Option<&str>,
    now: DateTime<Utc>,
) -> BatchReport {
    let mut report = BatchReport::default();
    let Some(batch) = Batch::parse(csv) else {
        return report;
    };

    report.rows = batch.rows.len();
    for (index, line) in batch.rows.iter().enumerate() {
        match decode_row(line, batch.separator, &batch.columns, filter) {
            Ok(record) => {
                let id = record.id.clone();
                if store.merge(record, now) == MergeOutcome::Created {
                    report.created.insert(id.clone());
                }
                report.changed.insert(id);
                report.accepted += 1;
            }
            Err(err) => {
                match err {
                    DecodeError::InvalidTimestamp => report.invalid_timestamp += 1,
                    DecodeError::InvalidPosition => report.invalid_position += 1,
                    DecodeError::FilteredOut => report.filtered_out += 1,
                }
                // Row 0 is the header
                debug!("Skipping row {}: {}", index + 1, err);
            }
        }
    }

    report
}
