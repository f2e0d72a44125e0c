//! # Telemetry Module
//!
//! Archives sonde state to JSONL files with rotation.
//!
//! This module handles:
//! - Formatting changed sondes as JSONL (JSON Lines)
//! - Writing to rotating archive files
//! - Managing file rotation (max N records per file)
//! - Retaining only the last M files

pub mod archive;

pub use archive::SnapshotArchive;
