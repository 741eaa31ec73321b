//! Bearing geometry and GPS coordinate types.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Signed shortest-arc difference between two bearings, in degrees.
///
/// The result lies in `(-180, 180]`. `signed_angle_difference(10.0, 350.0)`
/// is `20.0`: the first bearing sits 20 degrees past the second going
/// through north. Both inputs are reduced modulo 360 first, so any real
/// bearing is accepted; non-finite inputs propagate NaN instead of
/// panicking.
pub fn signed_angle_difference(angle1: f64, angle2: f64) -> f64 {
    // rem_euclid keeps the reduction in [0, 360) for negative bearings
    // and still turns non-finite inputs into NaN.
    let a1 = angle1.rem_euclid(360.0);
    let a2 = angle2.rem_euclid(360.0);
    let mut diff = (a1 - a2).abs();
    let crosses_north = diff > 180.0;

    let sign = if a1 >= a2 {
        if crosses_north {
            -1.0
        } else {
            1.0
        }
    } else if crosses_north {
        1.0
    } else {
        -1.0
    };

    if crosses_north {
        diff = 360.0 - diff;
    }

    let result = sign * diff;
    // Fold the open end of the interval: -180 and 180 are the same arc.
    if result == -180.0 {
        180.0
    } else {
        result
    }
}

/// A GPS fix with an optional direction of travel.
///
/// `bearing` is absent when the device cannot determine the direction of
/// travel (stationary, or a cached fix without orientation).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub bearing: Option<f64>,
}

impl GpsFix {
    pub fn new(lat: f64, lon: f64, bearing: Option<f64>) -> Self {
        Self { lat, lon, bearing }
    }

    /// Haversine distance to another fix, in kilometers.
    pub fn distance_to(&self, other: &GpsFix) -> f64 {
        let lat1 = self.lat.to_radians();
        let lon1 = self.lon.to_radians();
        let lat2 = other.lat.to_radians();
        let lon2 = other.lon.to_radians();
        let dlat = lat2 - lat1;
        let dlon = lon2 - lon1;

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_KM * c
    }
}
