//! Great-circle distance between stop coordinates.

use serde::{Deserialize, Serialize};

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Geographic position of a stop, degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// Arc distance in meters, spherical law of cosines.
pub fn distance(from: Coordinates, to: Coordinates) -> f64 {
    if from == to {
        return 0.0;
    }
    let dr = std::f64::consts::PI / 180.0;
    ((from.lat * dr).sin() * (to.lat * dr).sin()
        + (from.lat * dr).cos() * (to.lat * dr).cos() * ((from.lng - to.lng).abs() * dr).cos())
    .acos()
        * EARTH_RADIUS_M
}
