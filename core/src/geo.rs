//! Geographic primitives: locations and great-circle distance.
//!
//! Distance is straight-line Haversine over a spherical earth; good enough
//! for candidate ranking and ETA estimation, and deliberately not a road
//! network model.

use serde::{Deserialize, Serialize};

/// Mean earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// A geographic point, optionally annotated with a human-readable address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Latitude in degrees, south negative.
    pub latitude: f64,
    /// Longitude in degrees, west negative.
    pub longitude: f64,
    /// Free-form address, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl Location {
    /// A bare coordinate pair.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            address: None,
        }
    }

    /// Great-circle distance to `other` in kilometers.
    #[must_use]
    pub fn distance_km(&self, other: &Self) -> f64 {
        haversine_km(self.latitude, self.longitude, other.latitude, other.longitude)
    }
}

/// Haversine distance between two latitude/longitude pairs, in kilometers.
#[must_use]
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (d_lon / 2.0).sin().powi(2);

    EARTH_RADIUS_KM * 2.0 * a.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_distance_for_identical_points() {
        let p = Location::new(41.0082, 28.9784);
        assert_eq!(p.distance_km(&p), 0.0);
    }

    #[test]
    fn istanbul_to_ankara_is_about_350_km() {
        // Istanbul (41.0082, 28.9784) to Ankara (39.9334, 32.8597).
        let d = haversine_km(41.0082, 28.9784, 39.9334, 32.8597);
        assert!((d - 351.0).abs() < 5.0, "got {d} km");
    }

    #[test]
    fn small_latitude_step_is_tens_of_meters() {
        // 0.0005 degrees of latitude is roughly 55 meters anywhere on earth.
        let d = haversine_km(41.0, 29.0, 41.0005, 29.0);
        assert!((d - 0.0556).abs() < 0.002, "got {d} km");
    }

    #[test]
    fn distance_is_symmetric() {
        let a = Location::new(41.0, 29.0);
        let b = Location::new(40.5, 29.5);
        let ab = a.distance_km(&b);
        let ba = b.distance_km(&a);
        assert!((ab - ba).abs() < 1e-9);
    }
}
