//! # Snapshot Ingestion Module
//!
//! Periodic fetch-and-merge cycles against the aggregator proxy.
//!
//! This module handles:
//! - Fetching one CSV snapshot per cycle with timeout, retry and backoff
//! - Merging the snapshot into the owned [`SondeStore`]
//! - Running the expiry sweep once per cycle, after the merge
//! - Publishing read-only store snapshots to renderers
//! - Restarting the schedule when the filter or source changes
//!
//! ## Cadence
//!
//! One cycle every `interval` (5 s by default). Cycles never overlap: the
//! loop awaits each cycle, and ticks missed meanwhile are skipped. A cycle
//! may take much longer than the interval (up to 3 × 30 s of timeouts plus
//! backoff) without affecting later cycles.

pub mod batch;
pub mod retry;
pub mod source;
pub mod status;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, sleep, timeout_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::FetchError;
use crate::store::{SondeStore, StoreSnapshot, SweepReport};
use crate::telemetry::SnapshotArchive;
use batch::{merge_snapshot, BatchReport};
use retry::{RetryDecision, RetryPolicy, RetryState};
use source::{SnapshotSource, SourceMode};
use status::{CycleStatus, StatusSink};

/// Default time between cycle starts
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Requests accepted by a running [`Ingestor`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    /// Replace the identifier filter and run a cycle now
    SetFilter(Option<String>),
    /// Replace the logical source and run a cycle now
    SetSource(SourceMode),
    /// Stop the loop after the current cycle
    Shutdown,
}

/// Everything one cycle did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Reference instant used for merging and sweeping
    pub started_at: DateTime<Utc>,
    /// Fetch attempts made
    pub attempts: u32,
    /// Merge counters, or the last fetch error after exhaustion
    pub outcome: std::result::Result<BatchReport, FetchError>,
    /// Expiry sweep run at the end of the cycle
    pub sweep: SweepReport,
}

/// Owner of the store and driver of the ingestion schedule
pub struct Ingestor<S: SnapshotSource> {
    store: SondeStore,
    source: S,
    sink: Box<dyn StatusSink>,
    archive: Option<SnapshotArchive>,
    policy: RetryPolicy,
    interval: Duration,
    mode: SourceMode,
    filter: Option<String>,
    snapshots: watch::Sender<Arc<StoreSnapshot>>,
}

impl<S: SnapshotSource> Ingestor<S> {
    /// Create an ingestor for `store`, fetching all sondes without a filter
    pub fn new(store: SondeStore, source: S, sink: Box<dyn StatusSink>) -> Self {
        let (snapshots, _) = watch::channel(Arc::new(StoreSnapshot::default()));

        Self {
            store,
            source,
            sink,
            archive: None,
            policy: RetryPolicy::default(),
            interval: DEFAULT_INTERVAL,
            mode: SourceMode::All,
            filter: None,
            snapshots,
        }
    }

    /// Use `policy` for every cycle
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Start a cycle every `interval`
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Request `mode` from the source
    pub fn with_source_mode(mut self, mode: SourceMode) -> Self {
        self.mode = mode;
        self
    }

    /// Accept only identifiers containing `filter`
    pub fn with_filter(mut self, filter: Option<String>) -> Self {
        self.filter = filter;
        self
    }

    /// Archive changed sondes after every successful cycle
    pub fn with_archive(mut self, archive: SnapshotArchive) -> Self {
        self.archive = Some(archive);
        self
    }

    /// Receiver of the snapshot published after every cycle
    pub fn subscribe(&self) -> watch::Receiver<Arc<StoreSnapshot>> {
        self.snapshots.subscribe()
    }

    /// Current store state
    pub fn store(&self) -> &SondeStore {
        &self.store
    }

    /// Run cycles until shutdown
    ///
    /// The first cycle starts immediately. `Control::Shutdown`, or dropping
    /// every sender of `control`, ends the loop.
    ///
    /// # Returns
    ///
    /// * `SondeStore` - The store as left by the last cycle
    pub async fn run(mut self, mut control: mpsc::Receiver<Control>) -> SondeStore {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Ingestion started (source {}, every {:?})",
            self.mode, self.interval
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
                msg = control.recv() => {
                    match msg {
                        Some(Control::SetFilter(filter)) => {
                            info!("Identifier filter changed to {:?}", filter);
                            self.filter = filter;
                        }
                        Some(Control::SetSource(mode)) => {
                            info!("Source changed to {}", mode);
                            self.mode = mode;
                        }
                        Some(Control::Shutdown) | None => break,
                    }
                    // Restart the cadence from this cycle
                    self.run_cycle().await;
                    ticker.reset();
                }
            }
        }

        info!("Ingestion stopped with {} sonde(s) tracked", self.store.len());
        self.store
    }

    /// Run one fetch-merge-sweep cycle
    ///
    /// Never fails: transport errors are retried and, after exhaustion,
    /// reported to the status sink and returned in the report.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let (fetched, attempts) = self.fetch_with_retry().await;
        let now = Utc::now();

        let outcome = fetched.map(|csv| {
            let report = merge_snapshot(&mut self.store, &csv, self.filter.as_deref(), now);
            debug!(
                "Merged {} of {} rows ({} new sondes, {} rejected)",
                report.accepted,
                report.rows,
                report.created.len(),
                report.rejected()
            );
            report
        });

        // Status counts sondes left after the sweep
        let sweep = self.store.sweep_expired(now);
        match &outcome {
            Ok(report) => {
                self.sink.report(&CycleStatus::Updated {
                    sondes: self.store.len(),
                    rows: report.rows,
                });
                self.archive_changed(report, now);
            }
            Err(error) => self.sink.report(&CycleStatus::Failed {
                error: error.clone(),
                attempts,
            }),
        }
        self.snapshots.send_replace(Arc::new(self.store.snapshot(now)));

        CycleReport {
            started_at: now,
            attempts,
            outcome,
            sweep,
        }
    }

    async fn fetch_with_retry(&self) -> (std::result::Result<String, FetchError>, u32) {
        let mut state = RetryState::new(self.policy);

        loop {
            let deadline = state.begin_attempt(Instant::now());
            let error = match timeout_at(deadline, self.source.fetch(&self.mode)).await {
                Ok(Ok(csv)) => return (Ok(csv), state.attempts()),
                Ok(Err(err)) => err,
                Err(_) => state.timeout_error(),
            };

            match state.record_failure(error.clone()) {
                RetryDecision::Retry { delay } => {
                    warn!(
                        "Fetch attempt {} failed: {}; retrying in {:?}",
                        state.attempts(),
                        error,
                        delay
                    );
                    sleep(delay).await;
                }
                RetryDecision::GiveUp(last) => return (Err(last), state.attempts()),
            }
        }
    }

    fn archive_changed(&mut self, report: &BatchReport, now: DateTime<Utc>) {
        let Some(archive) = self.archive.as_mut() else {
            return;
        };

        let store = &self.store;
        let changed = report.changed.iter().filter_map(|id| store.get(id));
        if let Err(e) = archive.append(now, changed) {
            warn!("Failed to archive sondes: {}", e);
        }
    }
}
