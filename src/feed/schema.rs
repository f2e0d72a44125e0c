//! # Schema Resolver
//!
//! Maps an arbitrary CSV header row onto the fixed set of semantic columns.
//!
//! ## Resolution Order
//!
//! For every semantic field, in order:
//!
//! 1. Exact case-insensitive match against one of the field's candidate names
//! 2. Substring match (the header cell contains a candidate name)
//! 3. Positional fallback from the aggregator's documented layout
//!
//! Candidate order takes priority over column order in both name passes.
//!
//! ## Positional Layout
//!
//! | Index | Field |
//! |-------|-------|
//! | 0 | identifier |
//! | 1 | type |
//! | 2 | timestamp |
//! | 3 | latitude |
//! | 4 | longitude |
//! | 5 | altitude |
//! | 6 | temperature |
//! | 7 | pressure |
//! | 8 | humidity |
//! | 9 | wind speed |
//! | 10 | wind direction |
//! | 11 | signal strength |
//!
//! The fallback is applied to any header wide enough to contain the index,
//! whatever its shape.

/// Semantic fields of a telemetry row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Identifier,
    Type,
    Latitude,
    Longitude,
    Altitude,
    Temperature,
    Pressure,
    Humidity,
    WindSpeed,
    WindDirection,
    SignalStrength,
    Timestamp,
}

impl Field {
    /// All fields, in resolution order
    pub const ALL: [Field; 12] = [
        Field::Identifier,
        Field::Type,
        Field::Latitude,
        Field::Longitude,
        Field::Altitude,
        Field::Temperature,
        Field::Pressure,
        Field::Humidity,
        Field::WindSpeed,
        Field::WindDirection,
        Field::SignalStrength,
        Field::Timestamp,
    ];

    /// Lower-case header names tried for this field, most specific first
    pub fn candidates(self) -> &'static [&'static str] {
        match self {
            Field::Identifier => &["sonde", "id", "serial"],
            Field::Type => &["type", "model"],
            Field::Latitude => &["latitude", "lat"],
            Field::Longitude => &["longitude", "lon", "lng"],
            Field::Altitude => &["altitude", "alt"],
            Field::Temperature => &["temp", "temperature"],
            Field::Pressure => &["pres", "pressure", "p"],
            Field::Humidity => &["humi", "rh"],
            Field::WindSpeed => &["speed", "ws"],
            Field::WindDirection => &["course", "wd"],
            Field::SignalStrength => &["rssi"],
            Field::Timestamp => &["datetime", "time", "timestamp"],
        }
    }

    /// Column index in the aggregator's fixed export layout
    pub fn fallback_index(self) -> usize {
        match self {
            Field::Identifier => 0,
            Field::Type => 1,
            Field::Timestamp => 2,
            Field::Latitude => 3,
            Field::Longitude => 4,
            Field::Altitude => 5,
            Field::Temperature => 6,
            Field::Pressure => 7,
            Field::Humidity => 8,
            Field::WindSpeed => 9,
            Field::WindDirection => 10,
            Field::SignalStrength => 11,
        }
    }
}

/// Resolved column index for every semantic field (`None` = not found)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnMap {
    pub identifier: Option<usize>,
    pub sonde_type: Option<usize>,
    pub latitude: Option<usize>,
    pub longitude: Option<usize>,
    pub altitude: Option<usize>,
    pub temperature: Option<usize>,
    pub pressure: Option<usize>,
    pub humidity: Option<usize>,
    pub wind_speed: Option<usize>,
    pub wind_direction: Option<usize>,
    pub signal_strength: Option<usize>,
    pub timestamp: Option<usize>,
}

impl ColumnMap {
    /// Column index resolved for `field`
    pub fn get(&self, field: Field) -> Option<usize> {
        match field {
            Field::Identifier => self.identifier,
            Field::Type => self.sonde_type,
            Field::Latitude => self.latitude,
            Field::Longitude => self.longitude,
            Field::Altitude => self.altitude,
            Field::Temperature => self.temperature,
            Field::Pressure => self.pressure,
            Field::Humidity => self.humidity,
            Field::WindSpeed => self.wind_speed,
            Field::WindDirection => self.wind_direction,
            Field::SignalStrength => self.signal_strength,
            Field::Timestamp => self.timestamp,
        }
    }

    fn slot(&mut self, field: Field) -> &mut Option<usize> {
        match field {
            Field::Identifier => &mut self.identifier,
            Field::Type => &mut self.sonde_type,
            Field::Latitude => &mut self.latitude,
            Field::Longitude => &mut self.longitude,
            Field::Altitude => &mut self.altitude,
            Field::Temperature => &mut self.temperature,
            Field::Pressure => &mut self.pressure,
            Field::Humidity => &mut self.humidity,
            Field::WindSpeed => &mut self.wind_speed,
            Field::WindDirection => &mut self.wind_direction,
            Field::SignalStrength => &mut self.signal_strength,
            Field::Timestamp => &mut self.timestamp,
        }
    }
}

/// Resolve a header row to a [`ColumnMap`]
///
/// Pure function of the header; call it once per batch.
///
/// # Arguments
///
/// * `header` - Raw header cells in column order
///
/// # Examples
///
/// ```
/// use sonde_tracker::feed::schema::resolve_columns;
///
/// let header = ["ID", "Type", "DateTime", "Lat", "Lon"];
/// let columns = resolve_columns(&header);
///
/// assert_eq!(columns.identifier, Some(0));
/// assert_eq!(columns.timestamp, Some(2));
/// assert_eq!(columns.longitude, Some(4));
/// assert_eq!(columns.altitude, None);
/// ```
pub fn resolve_columns<S: AsRef<str>>(header: &[S]) -> ColumnMap {
    let normalized: Vec<String> = header
        .iter()
        .map(|h| h.as_ref().trim().to_lowercase())
        .collect();

    let mut columns = ColumnMap::default();
    for field in Field::ALL {
        *columns.slot(field) = find_column(&normalized, field.candidates())
            .or_else(|| fallback_column(normalized.len(), field));
    }
    columns
}

fn find_column(headers: &[String], candidates: &[&str]) -> Option<usize> {
    candidates
        .iter()
        .find_map(|name| headers.iter().position(|h| h == name))
        .or_else(|| {
            candidates
                .iter()
                .find_map(|name| headers.iter().position(|h| h.contains(name)))
        })
}

fn fallback_column(width: usize, field: Field) -> Option<usize> {
    let index = field.fallback_index();
    (width > index).then_some(index)
}
