//! # Feed Format Constants and Helpers
//!
//! Core definitions for the aggregator's CSV export.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Preferred field separator of the aggregator export
pub const SEPARATOR_SEMICOLON: char = ';';

/// Fallback field separator
pub const SEPARATOR_COMMA: char = ',';

/// Identifier assigned to rows whose identifier cell is empty
pub const UNKNOWN_ID: &str = "UNKNOWN";

/// Timestamps with fewer digits than this are epoch seconds, otherwise epoch milliseconds
pub const EPOCH_MILLIS_MIN_DIGITS: usize = 11;

/// One decoded telemetry reading
///
/// Position is always finite; every other reading may be absent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    /// Instant of the reading (millisecond resolution)
    pub time: DateTime<Utc>,

    /// Latitude in degrees
    pub lat: f64,

    /// Longitude in degrees
    pub lon: f64,

    /// Altitude in metres
    pub alt: Option<f64>,

    /// Air temperature in °C
    pub temp: Option<f64>,

    /// Barometric pressure in hPa
    pub pressure: Option<f64>,

    /// Relative humidity in %
    pub humidity: Option<f64>,
}

/// Row fields merged onto the sonde but not kept in its history
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SideFields {
    /// Sonde model label (empty when the cell was empty)
    pub sonde_type: String,

    /// Wind speed reported by the aggregator
    pub wind_speed: Option<f64>,

    /// Wind direction in degrees
    pub wind_direction: Option<f64>,

    /// Received signal strength in dBm
    pub rssi: Option<f64>,
}

/// A row accepted by the decoder
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRecord {
    /// Sonde identifier (case-sensitive)
    pub id: String,

    /// Reading appended to the sonde history
    pub sample: Sample,

    /// Latest-known values merged onto the sonde
    pub side: SideFields,
}

/// Detect the field separator from the header line
///
/// Semicolon wins whenever it appears anywhere in the header; otherwise the
/// file is treated as comma separated.
///
/// # Examples
///
/// ```
/// use sonde_tracker::feed::protocol::detect_separator;
///
/// assert_eq!(detect_separator("ID;Type;Lat"), ';');
/// assert_eq!(detect_separator("ID,Type,Lat"), ',');
/// ```
pub fn detect_separator(header: &str) -> char {
    if header.contains(SEPARATOR_SEMICOLON) {
        SEPARATOR_SEMICOLON
    } else {
        SEPARATOR_COMMA
    }
}

/// Split one line into trimmed cells
///
/// Quoting is not supported; the export never quotes fields.
pub fn split_cells(line: &str, separator: char) -> Vec<&str> {
    line.split(separator).map(str::trim).collect()
}

/// Parse a numeric cell permissively
///
/// Empty, non-numeric and non-finite values are all absent.
pub fn parse_number(cell: &str) -> Option<f64> {
    cell.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}
