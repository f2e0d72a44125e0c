//! # Error Types
//!
//! Custom error types for Sonde Tracker using `thiserror`.
//!
//! Three layers of failure exist:
//! - [`DecodeError`]: a single CSV row was rejected. The row is skipped and
//!   the batch continues.
//! - [`FetchError`]: one attempt to obtain a snapshot failed. The ingestion
//!   driver retries and, after exhaustion, reports it to the status sink.
//! - [`SondeError`]: everything that can fail outside the ingestion loop
//!   (configuration, file I/O, archive serialization).

use thiserror::Error;

/// Row-level rejection produced by the record decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Timestamp cell is empty or not a resolvable instant
    #[error("invalid timestamp")]
    InvalidTimestamp,

    /// Latitude or longitude is missing or not finite
    #[error("invalid position")]
    InvalidPosition,

    /// Identifier does not match the configured filter
    #[error("filtered out")]
    FilteredOut,
}

/// Transport failure while fetching one CSV snapshot
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The attempt exceeded its deadline and was aborted
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    /// The proxy answered with a non-success status
    #[error("HTTP error: status {0}")]
    Http(u16),

    /// Connection, DNS or body read failure
    #[error("network error: {0}")]
    Network(String),
}

/// Main error type for Sonde Tracker
#[derive(Debug, Error)]
pub enum SondeError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Archive serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Snapshot fetch errors
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),
}

/// Result type alias for Sonde Tracker
pub type Result<T> = std::result::Result<T, SondeError>;
