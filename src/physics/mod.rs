//! # Derived-Quantity Module
//!
//! Pure functions computing derived fields for a sonde.
//!
//! This module handles:
//! - Thermodynamics (dew point, potential temperature, LCL, zero isotherm)
//! - Spherical geometry (great-circle distance, initial bearing)
//! - Kinematics from consecutive samples
//!
//! Every function returns `None` when an input is not finite; nothing is
//! silently defaulted to zero.

pub mod meteo;
pub mod geo;
pub mod kinematics;

/// Keep a value only if it is finite
#[inline]
pub(crate) fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}
