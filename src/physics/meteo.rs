//! # Meteorological Quantities
//!
//! ## Dew Point
//!
//! Magnus approximation with `a = 17.27`, `b = 237.7 °C`:
//!
//! `α = a·T / (b + T) + ln(RH / 100)`, `Td = b·α / (a − α)`
//!
//! ## Potential Temperature
//!
//! `θ = (T + 273.15) · (1000 / p)^0.2854`, in kelvin.
//!
//! ## Lifting Condensation Level
//!
//! Espy's estimate: `125 m` per degree of dew point depression.
//!
//! ```
//! use sonde_tracker::physics::meteo::{dew_point, lcl_height};
//!
//! let td = dew_point(Some(20.0), Some(50.0)).unwrap();
//! assert!((td - 9.3).abs() < 0.1);
//!
//! let lcl = lcl_height(Some(20.0), Some(td)).unwrap();
//! assert!((lcl - 1343.0).abs() < 5.0);
//! ```

use super::finite;
use crate::feed::protocol::Sample;

/// Magnus coefficient `a`
pub const MAGNUS_A: f64 = 17.27;

/// Magnus coefficient `b` in °C
pub const MAGNUS_B: f64 = 237.7;

/// Offset between Celsius and Kelvin
pub const KELVIN_OFFSET: f64 = 273.15;

/// Poisson exponent R/cp for dry air
pub const POISSON_EXPONENT: f64 = 0.2854;

/// Reference pressure for potential temperature in hPa
pub const REFERENCE_PRESSURE_HPA: f64 = 1000.0;

/// LCL height per degree of dew point depression in metres
pub const LCL_METRES_PER_DEGREE: f64 = 125.0;

/// Dew point in °C from temperature (°C) and relative humidity (%)
///
/// Humidity is clamped to 0..=100 first. Zero humidity has no dew point.
pub fn dew_point(temp: Option<f64>, humidity: Option<f64>) -> Option<f64> {
    let t = temp.and_then(finite)?;
    let rh = humidity.and_then(finite)?.clamp(0.0, 100.0);

    let alpha = MAGNUS_A * t / (MAGNUS_B + t) + (rh / 100.0).ln();
    finite(MAGNUS_B * alpha / (MAGNUS_A - alpha))
}

/// Potential temperature in kelvin from temperature (°C) and pressure (hPa)
pub fn potential_temperature(temp: Option<f64>, pressure: Option<f64>) -> Option<f64> {
    let t = temp.and_then(finite)?;
    let p = pressure.and_then(finite).filter(|p| *p > 0.0)?;

    finite((t + KELVIN_OFFSET) * (REFERENCE_PRESSURE_HPA / p).powf(POISSON_EXPONENT))
}

/// Lifting condensation level height in metres above the sample
///
/// Only defined when the temperature is not below the dew point.
pub fn lcl_height(temp: Option<f64>, dew_point: Option<f64>) -> Option<f64> {
    let t = temp.and_then(finite)?;
    let td = dew_point.and_then(finite)?;

    if t < td {
        return None;
    }
    finite(LCL_METRES_PER_DEGREE * (t - td))
}

/// Altitude of the 0 °C crossing in the profile
///
/// Uses samples with finite altitude and temperature, ordered by altitude.
/// The first adjacent pair whose temperatures straddle zero is linearly
/// interpolated.
pub fn zero_isotherm<'a, I>(samples: I) -> Option<f64>
where
    I: IntoIterator<Item = &'a Sample>,
{
    let mut profile: Vec<(f64, f64)> = samples
        .into_iter()
        .filter_map(|s| Some((s.alt.and_then(finite)?, s.temp.and_then(finite)?)))
        .collect();
    profile.sort_by(|a, b| a.0.total_cmp(&b.0));

    profile.windows(2).find_map(|pair| {
        let (alt1, t1) = pair[0];
        let (alt2, t2) = pair[1];

        let crosses = (t1 <= 0.0 && t2 >= 0.0) || (t1 >= 0.0 && t2 <= 0.0);
        if !crosses {
            return None;
        }
        if t1 == t2 {
            // Both exactly at zero
            return Some(alt1);
        }
        finite(alt1 + (0.0 - t1) * (alt2 - alt1) / (t2 - t1))
    })
}
