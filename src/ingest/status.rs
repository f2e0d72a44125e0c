//! Status surface for human-readable cycle outcomes

use std::fmt;
use tracing::{error, info};

use crate::error::FetchError;

/// Outcome of one ingestion cycle as shown to users
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleStatus {
    /// Snapshot fetched and merged
    Updated {
        /// Sondes tracked after the cycle
        sondes: usize,
        /// Data rows in the snapshot
        rows: usize,
    },
    /// Every attempt failed
    Failed {
        error: FetchError,
        attempts: u32,
    },
}

impl fmt::Display for CycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleStatus::Updated { sondes, rows } => {
                write!(f, "Updated: {} sondes ({} rows)", sondes, rows)
            }
            CycleStatus::Failed { error, .. } => write!(f, "Error: {}", error),
        }
    }
}

/// Write-only sink for cycle outcomes
#[cfg_attr(test, mockall::automock)]
pub trait StatusSink: Send + Sync {
    fn report(&self, status: &CycleStatus);
}

/// Sink writing outcomes to the application log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStatusSink;

impl StatusSink for TracingStatusSink {
    fn report(&self, status: &CycleStatus) {
        match status {
            CycleStatus::Updated { .. } => info!("{}", status),
            CycleStatus::Failed { attempts, .. } => {
                error!("{} (after {} attempts)", status, attempts)
            }
        }
    }
}
