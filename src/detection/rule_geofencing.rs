use super::{GeoContext, GeoLocation, GeoRule, Rule, RuleError};
use crate::models::LoginRecord;

/// Flags logins whose IP centroid falls outside an allowed circle.
///
/// The IP-derived location is used rather than device GPS since it cannot be
/// spoofed from the client.
#[derive(Debug, Clone)]
pub struct GeofencingRule {
    pub center: GeoLocation,
    pub radius_km: f64,
    pub risk_score: u32,
}

impl GeofencingRule {
    pub fn new(center_latitude: f64, center_longitude: f64, radius_km: f64, risk_score: u32) -> Self {
        GeofencingRule {
            center: GeoLocation::new(center_latitude, center_longitude),
            radius_km,
            risk_score,
        }
    }
}

impl Rule for GeofencingRule {
    fn name(&self) -> &str {
        "Geofencing"
    }

    fn description(&self) -> String {
        format!(
            "Login location is outside the allowed {:.1} km radius around ({:.4}, {:.4}).",
            self.radius_km, self.center.latitude, self.center.longitude
        )
    }

    fn score(&self, _current: &LoginRecord, _previous: Option<&LoginRecord>) -> Result<u32, RuleError> {
        Ok(0)
    }

    fn as_geo_rule(&self) -> Option<&dyn GeoRule> {
        Some(self)
    }
}

impl GeoRule for GeofencingRule {
    fn score_with_context(
        &self,
        ctx: &GeoContext,
        _current: &LoginRecord,
        _previous: Option<&LoginRecord>,
    ) -> Result<u32, RuleError> {
        let location = match ctx.ip_location {
            Some(location) => location,
            None => return Ok(0),
        };

        if self.center.distance_to(&location) > self.radius_km {
            Ok(self.risk_score)
        } else {
            Ok(0)
        }
    }
}
