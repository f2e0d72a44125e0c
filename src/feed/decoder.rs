//! # Record Decoder
//!
//! Decodes one CSV data row into a validated [`DecodedRecord`].

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use super::protocol::*;
use super::schema::{ColumnMap, Field};
use crate::error::DecodeError;

/// Naive date/time layouts accepted for non-numeric timestamps (read as UTC)
const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
];

/// Decode a single data row
///
/// # Arguments
///
/// * `line` - Raw data line (without line terminator)
/// * `separator` - Field separator detected for the batch
/// * `columns` - Column mapping resolved for the batch
/// * `filter` - Optional identifier filter (case-insensitive substring);
///   an empty or whitespace-only filter counts as unset
///
/// # Returns
///
/// * `Result<DecodedRecord, DecodeError>` - Decoded record, or the reason the row was rejected
///
/// # Errors
///
/// Checked in this order:
/// - `InvalidTimestamp` if the timestamp cell does not resolve to an instant
/// - `InvalidPosition` if latitude or longitude is missing or not finite
/// - `FilteredOut` if a non-blank filter is set and the identifier does not
///   contain it
///
/// # Examples
///
/// ```
/// use sonde_tracker::feed::decoder::decode_row;
/// use sonde_tracker::feed::schema::resolve_columns;
///
/// let columns = resolve_columns(&["ID", "DateTime", "Lat", "Lon"]);
/// let record = decode_row("SP1;1700000000;54.5;18.5", ';', &columns, None).unwrap();
///
/// assert_eq!(record.id, "SP1");
/// assert_eq!(record.sample.time.timestamp_millis(), 1_700_000_000_000);
/// ```
pub fn decode_row(
    line: &str,
    separator: char,
    columns: &ColumnMap,
    filter: Option<&str>,
) -> Result<DecodedRecord, DecodeError> {
    let cells = split_cells(line, separator);
    let cell = |field: Field| -> &str {
        columns
            .get(field)
            .and_then(|i| cells.get(i).copied())
            .unwrap_or("")
    };

    let time = parse_timestamp(cell(Field::Timestamp))?;

    let lat = parse_number(cell(Field::Latitude));
    let lon = parse_number(cell(Field::Longitude));
    let (lat, lon) = match (lat, lon) {
        (Some(lat), Some(lon)) => (lat, lon),
        _ => return Err(DecodeError::InvalidPosition),
    };

    let id = match cell(Field::Identifier) {
        "" => UNKNOWN_ID.to_string(),
        id => id.to_string(),
    };

    if !matches_filter(&id, filter) {
        return Err(DecodeError::FilteredOut);
    }

    Ok(DecodedRecord {
        id,
        sample: Sample {
            time,
            lat,
            lon,
            alt: parse_number(cell(Field::Altitude)),
            temp: parse_number(cell(Field::Temperature)),
            pressure: parse_number(cell(Field::Pressure)),
            humidity: parse_number(cell(Field::Humidity)),
        },
        side: SideFields {
            sonde_type: cell(Field::Type).to_string(),
            wind_speed: parse_number(cell(Field::WindSpeed)),
            wind_direction: parse_number(cell(Field::WindDirection)),
            rssi: parse_number(cell(Field::SignalStrength)),
        },
    })
}

/// Parse a timestamp cell
///
/// All-digit values are epoch integers: fewer than 11 digits means seconds,
/// otherwise milliseconds. Anything else goes through date/time parsing
/// (RFC 3339, RFC 2822, then common naive layouts read as UTC).
///
/// # Errors
///
/// Returns `DecodeError::InvalidTimestamp` if no interpretation yields a
/// representable instant.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, DecodeError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(DecodeError::InvalidTimestamp);
    }

    if raw.bytes().all(|b| b.is_ascii_digit()) {
        let value: i64 = raw.parse().map_err(|_| DecodeError::InvalidTimestamp)?;
        let millis = if raw.len() < EPOCH_MILLIS_MIN_DIGITS {
            value.checked_mul(1000).ok_or(DecodeError::InvalidTimestamp)?
        } else {
            value
        };
        return DateTime::from_timestamp_millis(millis).ok_or(DecodeError::InvalidTimestamp);
    }

    parse_datetime(raw).ok_or(DecodeError::InvalidTimestamp)
}

fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn matches_filter(id: &str, filter: Option<&str>) -> bool {
    match filter.map(str::trim) {
        Some(f) if !f.is_empty() => id.to_lowercase().contains(&f.to_lowercase()),
        _ => true,
    }
}
