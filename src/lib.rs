//! # Sonde Tracker Library
//!
//! Track meteorological radiosondes from a public aggregator feed.
//!
//! This library fetches delimiter-separated snapshots of sonde telemetry,
//! decodes them into typed samples, merges them into a per-sonde store with
//! bounded history, derives meteorological and kinematic quantities, and
//! expires sondes that have gone silent.
//!
//! ## Layout
//!
//! - [`feed`] - Snapshot parsing, column resolution and row decoding
//! - [`physics`] - Pure meteorological, geodesic and kinematic formulas
//! - [`store`] - Per-sonde state with merge and expiry
//! - [`ingest`] - Periodic fetch with retry and the ingestion loop
//! - [`telemetry`] - JSONL archive of sonde state

pub mod config;
pub mod error;
pub mod feed;
pub mod ingest;
pub mod physics;
pub mod store;
pub mod telemetry;
