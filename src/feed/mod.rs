//! # CSV Feed Module
//!
//! Parsing of the radiosonde aggregator's CSV snapshots.
//!
//! This module handles:
//! - Separator detection and line splitting
//! - Header resolution to the 12 semantic columns
//! - Per-row decoding into validated telemetry samples
//!
//! The upstream column layout is not stable, so the header is resolved
//! again for every batch.

pub mod protocol;
pub mod schema;
pub mod decoder;

use protocol::{detect_separator, split_cells};
use schema::{resolve_columns, ColumnMap};

/// One CSV snapshot split into its header and data lines
#[derive(Debug, Clone)]
pub struct Batch<'a> {
    /// Field separator detected from the header line
    pub separator: char,
    /// Column mapping resolved for this batch
    pub columns: ColumnMap,
    /// Non-blank data lines, in source order
    pub rows: Vec<&'a str>,
}

impl<'a> Batch<'a> {
    /// Split raw CSV text into a [`Batch`]
    ///
    /// Blank lines are ignored. A text with fewer than two non-blank lines
    /// (header plus at least one row) is an empty batch, not an error.
    ///
    /// # Returns
    ///
    /// * `Option<Batch>` - The batch, or `None` when there is nothing to merge
    ///
    /// # Examples
    ///
    /// ```
    /// use sonde_tracker::feed::Batch;
    ///
    /// let batch = Batch::parse("ID;Lat;Lon\nSP1;54.5;18.5\n").unwrap();
    /// assert_eq!(batch.separator, ';');
    /// assert_eq!(batch.rows.len(), 1);
    ///
    /// assert!(Batch::parse("ID;Lat;Lon\n\n").is_none());
    /// ```
    pub fn parse(text: &'a str) -> Option<Self> {
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());

        let header = lines.next()?;
        let rows: Vec<&str> = lines.collect();
        if rows.is_empty() {
            return None;
        }

        let separator = detect_separator(header);
        let header_cells = split_cells(header, separator);
        let columns = resolve_columns(&header_cells);

        Some(Self {
            separator,
            columns,
            rows,
        })
    }
}
