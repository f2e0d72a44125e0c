//! # Spherical Geometry
//!
//! Great-circle distance (haversine) and initial bearing on a spherical
//! Earth of radius 6 371 km.

use serde::{Deserialize, Serialize};

use super::finite;

/// Mean Earth radius in metres
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A latitude/longitude pair in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Great-circle distance in metres
///
/// # Examples
///
/// ```
/// use sonde_tracker::physics::geo::{haversine_m, GeoPoint};
///
/// // One degree of latitude is about 111.2 km
/// let d = haversine_m(GeoPoint::new(0.0, 0.0), GeoPoint::new(1.0, 0.0)).unwrap();
/// assert!((d - 111_195.0).abs() < 1.0);
/// ```
pub fn haversine_m(from: GeoPoint, to: GeoPoint) -> Option<f64> {
    let lat1 = finite(from.lat)?.to_radians();
    let lat2 = finite(to.lat)?.to_radians();
    let d_lat = lat2 - lat1;
    let d_lon = (finite(to.lon)? - finite(from.lon)?).to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    finite(EARTH_RADIUS_M * c)
}

/// Initial bearing from `from` to `to` in degrees, normalised to 0..360
///
/// 0° is north, 90° is east.
pub fn initial_bearing_deg(from: GeoPoint, to: GeoPoint) -> Option<f64> {
    let lat1 = finite(from.lat)?.to_radians();
    let lat2 = finite(to.lat)?.to_radians();
    let d_lon = (finite(to.lon)? - finite(from.lon)?).to_radians();

    let y = d_lon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lon.cos();
    finite(y.atan2(x).to_degrees().rem_euclid(360.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_same_point() {
        let p = GeoPoint::new(54.5, 18.5);
        assert_eq!(haversine_m(p, p), Some(0.0));
    }

    #[test]
    fn test_haversine_known_distance() {
        // Gdansk to Warsaw, roughly 283 km
        let gdansk = GeoPoint::new(54.352, 18.646);
        let warsaw = GeoPoint::new(52.230, 21.011);
        let d = haversine_m(gdansk, warsaw).unwrap();
        assert!((d - 283_000.0).abs() < 3_000.0, "distance was {}", d);
    }

    #[test]
    fn test_haversine_nan_coords() {
        let p = GeoPoint::new(54.5, 18.5);
        assert_eq!(haversine_m(GeoPoint::new(f64::NAN, 18.5), p), None);
        assert_eq!(haversine_m(p, GeoPoint::new(54.5, f64::INFINITY)), None);
    }

    #[test]
    fn test_bearing_cardinal_directions() {
        let origin = GeoPoint::new(0.0, 0.0);

        let north = initial_bearing_deg(origin, GeoPoint::new(1.0, 0.0)).unwrap();
        let east = initial_bearing_deg(origin, GeoPoint::new(0.0, 1.0)).unwrap();
        let south = initial_bearing_deg(origin, GeoPoint::new(-1.0, 0.0)).unwrap();
        let west = initial_bearing_deg(origin, GeoPoint::new(0.0, -1.0)).unwrap();

        assert!(north.abs() < 1e-9);
        assert!((east - 90.0).abs() < 1e-9);
        assert!((south - 180.0).abs() < 1e-9);
        assert!((west - 270.0).abs() < 1e-9);
    }

    #[test]
    fn test_bearing_nan_coords() {
        let p = GeoPoint::new(54.5, 18.5);
        assert_eq!(initial_bearing_deg(p, GeoPoint::new(f64::NAN, 0.0)), None);
    }
}
