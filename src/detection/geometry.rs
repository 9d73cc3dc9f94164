//! Shared geometry for the location-based rules

use serde::Deserialize;

/// Mean Earth radius used by every distance computation
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Geographic coordinates in degrees
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoLocation {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        GeoLocation { latitude, longitude }
    }

    /// Build a location, treating exactly (0, 0) as "no data".
    ///
    /// Lookups and clients use the zero pair as their unknown marker, so it
    /// is normalized to `None` before reaching any rule.
    pub fn known(latitude: f64, longitude: f64) -> Option<Self> {
        if latitude == 0.0 && longitude == 0.0 {
            None
        } else {
            Some(GeoLocation { latitude, longitude })
        }
    }

    pub fn distance_to(&self, other: &GeoLocation) -> f64 {
        haversine_distance(*self, *other)
    }
}

/// Great-circle distance between two points using the Haversine formula.
/// Returns distance in kilometers.
pub fn haversine_distance(loc1: GeoLocation, loc2: GeoLocation) -> f64 {
    let lat1_rad = loc1.latitude.to_radians();
    let lat2_rad = loc2.latitude.to_radians();
    let delta_lat = (loc2.latitude - loc1.latitude).to_radians();
    let delta_lon = (loc2.longitude - loc1.longitude).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}
