//! # Sonde Tracker
//!
//! Track meteorological radiosondes from a public aggregator feed.
//!
//! This application polls the aggregator proxy for CSV snapshots, keeps a
//! per-sonde store with bounded history and derived quantities, and logs
//! every cycle outcome.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use sonde_tracker::config::{Config, LoggingConfig};
use sonde_tracker::ingest::retry::RetryPolicy;
use sonde_tracker::ingest::source::HttpSource;
use sonde_tracker::ingest::status::TracingStatusSink;
use sonde_tracker::ingest::{Control, Ingestor};
use sonde_tracker::store::{SondeStore, StoreSettings, StoreSnapshot};
use sonde_tracker::telemetry::SnapshotArchive;

/// Configuration loaded when no path is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Time allowed for the ingestion loop to finish its current cycle
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Prefix of the daily rolling log files
const LOG_FILE_PREFIX: &str = "sonde-tracker.log";

/// Main entry point for Sonde Tracker application
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (first CLI argument, else `config/default.toml`)
///    - Set up logging with tracing subscriber
///    - Build the HTTP source, store and optional archive
///
/// 2. **Main Loop**
///    - Ingestion runs one fetch-merge-sweep cycle every `interval_ms`
///    - Snapshots are summarized at debug level after every cycle
///    - SIGHUP reloads the configuration and applies filter/source changes
///
/// 3. **Graceful Shutdown**
///    - Ctrl+C stops the loop after the current cycle
///    - The loop is aborted if it does not stop within 10 seconds
///
/// # Errors
///
/// Returns error if:
/// - The configuration cannot be read or is invalid
/// - The archive directory cannot be created
///
/// # Examples
///
/// ```bash
/// cargo run --release -- config/default.toml
/// ```
///
/// Expected output:
/// ```text
/// INFO sonde_tracker: Sonde Tracker v0.1.0 starting...
/// INFO sonde_tracker::ingest: Ingestion started (source all, every 5s)
/// INFO sonde_tracker::ingest::status: Updated: 42 sondes (1830 rows)
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = load_config(config_path.as_deref())?;
    let _log_guard = init_logging(&config.logging);

    info!("Sonde Tracker v{} starting...", env!("CARGO_PKG_VERSION"));

    let source = HttpSource::new(
        config.source.base_url.clone(),
        Duration::from_millis(config.ingest.request_timeout_ms),
    );
    info!("Polling {}", source.endpoint());

    let store = SondeStore::new(StoreSettings::from(&config.tracking));
    let mut ingestor = Ingestor::new(store, source, Box::new(TracingStatusSink))
        .with_policy(RetryPolicy::from(&config.ingest))
        .with_interval(Duration::from_millis(config.ingest.interval_ms))
        .with_source_mode(config.source.source_mode())
        .with_filter(config.tracking.filter());

    if config.telemetry.enabled {
        let archive = SnapshotArchive::from_config(&config.telemetry)
            .context("failed to prepare archive directory")?;
        info!("Archiving sonde state to {}", config.telemetry.log_dir);
        ingestor = ingestor.with_archive(archive);
    }

    let snapshots = ingestor.subscribe();
    let (control_tx, control_rx) = mpsc::channel(8);
    let mut ingest_task = tokio::spawn(ingestor.run(control_rx));
    let summary_task = tokio::spawn(log_snapshots(snapshots));

    info!("Press Ctrl+C to exit");
    if let Err(e) = wait_for_shutdown(config_path, config, &control_tx).await {
        warn!("Signal handling failed: {:#}", e);
    }

    // The loop may already be gone if it panicked
    let _ = control_tx.send(Control::Shutdown).await;
    match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut ingest_task).await {
        Ok(Ok(store)) => info!("Stopped with {} sonde(s) tracked", store.len()),
        Ok(Err(e)) => warn!("Ingestion task failed: {}", e),
        Err(_) => {
            warn!("Ingestion did not stop within {:?}, aborting", SHUTDOWN_TIMEOUT);
            ingest_task.abort();
        }
    }
    summary_task.abort();

    Ok(())
}

/// Load the configuration at `path`, or the default file when it exists
fn load_config(path: Option<&Path>) -> Result<Config> {
    if let Some(path) = path {
        return Config::load(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()));
    }

    let default = Path::new(DEFAULT_CONFIG_PATH);
    if default.exists() {
        Config::load(default)
            .with_context(|| format!("failed to load configuration from {}", default.display()))
    } else {
        Ok(Config::default())
    }
}

/// Install the global subscriber
///
/// `RUST_LOG` takes precedence over the configured level. The returned
/// guard must live until exit so buffered file output is flushed.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    if config.file_dir.trim().is_empty() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return None;
    }

    let appender = tracing_appender::rolling::daily(&config.file_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Some(guard)
}

/// Wait for Ctrl+C, reloading the configuration on SIGHUP
#[cfg(unix)]
async fn wait_for_shutdown(
    config_path: Option<PathBuf>,
    mut current: Config,
    control: &mpsc::Sender<Control>,
) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Received Ctrl+C, shutting down...");
                return Ok(());
            }
            _ = hangup.recv() => {
                info!("Received SIGHUP, reloading configuration");
                let next = match load_config(config_path.as_deref()) {
                    Ok(next) => next,
                    Err(e) => {
                        warn!("Keeping current configuration: {:#}", e);
                        continue;
                    }
                };

                for msg in control_changes(&current, &next) {
                    if control.send(msg).await.is_err() {
                        return Ok(());
                    }
                }
                current = next;
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(
    _config_path: Option<PathBuf>,
    _current: Config,
    _control: &mpsc::Sender<Control>,
) -> Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down...");
    Ok(())
}

/// Control messages that move a running loop from `current` to `next`
///
/// Only the source and the identifier filter apply live; other settings
/// need a restart.
fn control_changes(current: &Config, next: &Config) -> Vec<Control> {
    let mut changes = Vec::new();

    let mode = next.source.source_mode();
    if current.source.source_mode() != mode {
        changes.push(Control::SetSource(mode));
    }

    let filter = next.tracking.filter();
    if current.tracking.filter() != filter {
        changes.push(Control::SetFilter(filter));
    }

    changes
}

/// Log a summary of every published snapshot
async fn log_snapshots(mut snapshots: watch::Receiver<Arc<StoreSnapshot>>) {
    while snapshots.changed().await.is_ok() {
        let snapshot = snapshots.borrow_and_update().clone();
        debug!(
            "{} sonde(s), {} active",
            snapshot.sondes.len(),
            snapshot.active_count()
        );

        for sonde in &snapshot.sondes {
            let Some(latest) = &sonde.latest else {
                continue;
            };
            debug!(
                "  {} {:?} at {:.4},{:.4} alt {:?} m, {:?} m from receiver, {:?}",
                sonde.id,
                sonde.sonde_type,
                latest.lat,
                latest.lon,
                latest.alt,
                sonde.derived.distance_to_receiver.map(f64::round),
                sonde.status
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonde_tracker::ingest::source::SourceMode;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_path() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[tracking]\nid_filter = \"T1\"").unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.tracking.filter(), Some("T1".to_string()));
    }

    #[test]
    fn test_load_config_missing_path_fails() {
        let result = load_config(Some(Path::new("/nonexistent/sonde-tracker.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_default_config_file_is_valid() {
        let config = Config::load(DEFAULT_CONFIG_PATH).unwrap();
        assert_eq!(config.source.source_mode(), SourceMode::All);
    }

    #[test]
    fn test_no_changes_for_same_config() {
        let config = Config::default();
        assert!(control_changes(&config, &config.clone()).is_empty());
    }

    #[test]
    fn test_changes_for_filter_and_source() {
        let current = Config::default();
        let mut next = Config::default();
        next.source.mode = "single".to_string();
        next.source.sonde_id = "T1234567".to_string();
        next.tracking.id_filter = "t12".to_string();

        assert_eq!(
            control_changes(&current, &next),
            vec![
                Control::SetSource(SourceMode::Single("T1234567".to_string())),
                Control::SetFilter(Some("t12".to_string())),
            ]
        );
    }

    #[test]
    fn test_clearing_filter() {
        let mut current = Config::default();
        current.tracking.id_filter = "SP".to_string();
        let next = Config::default();

        assert_eq!(control_changes(&current, &next), vec![Control::SetFilter(None)]);
    }
}
