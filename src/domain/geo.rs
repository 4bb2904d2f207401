//! Geographic primitives: WGS84 points and great-circle math.

use serde::{Deserialize, Serialize};
use std::fmt;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle (haversine) distance to another point, in meters.
    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = (other.latitude - self.latitude).to_radians();
        let dlon = (other.longitude - self.longitude).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_M * c
    }

    /// Point reached by moving `step_m` meters from `self` toward `to`.
    ///
    /// Linear interpolation in degree space, accurate enough for the short
    /// per-tick legs the movement simulator takes.
    pub fn step_toward(&self, to: &GeoPoint, step_m: f64) -> GeoPoint {
        let total = self.distance_m(to);
        if total <= f64::EPSILON || step_m >= total {
            return *to;
        }
        let f = step_m / total;
        GeoPoint {
            latitude: self.latitude + (to.latitude - self.latitude) * f,
            longitude: self.longitude + (to.longitude - self.longitude) * f,
        }
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_to_self_is_zero() {
        let p = GeoPoint::new(40.7128, -74.0060);
        assert!(p.distance_m(&p) < 1e-9);
    }

    #[test]
    fn distance_known_pair() {
        // ~111.2km per degree of latitude at the equator
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(1.0, 0.0);
        let d = a.distance_m(&b);
        assert!((d - 111_195.0).abs() < 200.0, "got {d}");
    }

    #[test]
    fn step_toward_overshoot_clamps_to_destination() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(0.001, 0.0);
        let stepped = a.step_toward(&b, 1_000_000.0);
        assert_eq!(stepped, b);
    }

    #[test]
    fn step_toward_advances_proportionally() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(0.01, 0.0); // ~1112m
        let total = a.distance_m(&b);
        let stepped = a.step_toward(&b, total / 2.0);
        let travelled = a.distance_m(&stepped);
        assert!((travelled - total / 2.0).abs() < 1.0);
    }
}
