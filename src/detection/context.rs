//! Ephemeral geographic context
//!
//! Coordinates needed by location-aware rules. A context is built by the
//! engine at the start of rule dispatch and dropped when dispatch ends; it
//! is never stored, returned or serialized.

use super::geometry::GeoLocation;

/// Coordinates available to location-aware rules for one evaluation.
///
/// Every point is optional: a failed lookup, a missing device fix or a first
/// login leaves the matching field empty.
#[derive(Debug, Default)]
pub struct GeoContext {
    /// City centroid of the current IP address
    pub ip_location: Option<GeoLocation>,
    /// GPS position reported by the device
    pub device_location: Option<GeoLocation>,
    /// City centroid of the previous login's network prefix
    pub previous_ip_location: Option<GeoLocation>,
}

impl GeoContext {
    /// Assemble a context from raw coordinates.
    ///
    /// A (0, 0) pair from any source counts as missing.
    pub fn new(
        ip_location: Option<GeoLocation>,
        device_location: Option<GeoLocation>,
        previous_ip_location: Option<GeoLocation>,
    ) -> Self {
        let normalize = |loc: Option<GeoLocation>| loc.and_then(|l| GeoLocation::known(l.latitude, l.longitude));
        GeoContext {
            ip_location: normalize(ip_location),
            device_location: normalize(device_location),
            previous_ip_location: normalize(previous_ip_location),
        }
    }

    /// A context with no coordinates at all
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn has_ip_location(&self) -> bool {
        self.ip_location.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_coordinates_are_dropped() {
        let ctx = GeoContext::new(
            Some(GeoLocation::new(0.0, 0.0)),
            Some(GeoLocation::new(39.92, 32.85)),
            Some(GeoLocation::new(0.0, 0.0)),
        );
        assert!(!ctx.has_ip_location());
        assert_eq!(ctx.device_location, Some(GeoLocation::new(39.92, 32.85)));
        assert!(ctx.previous_ip_location.is_none());
    }

    #[test]
    fn test_empty_context() {
        let ctx = GeoContext::empty();
        assert!(ctx.ip_location.is_none());
        assert!(ctx.device_location.is_none());
        assert!(ctx.previous_ip_location.is_none());
    }
}
