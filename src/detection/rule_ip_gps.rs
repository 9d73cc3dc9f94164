use super::{GeoContext, GeoRule, Rule, RuleError};
use crate::models::LoginRecord;

/// Cross-checks the IP centroid against the device's GPS fix.
///
/// A large gap between the two suggests the network location is masked.
#[derive(Debug, Clone)]
pub struct IpGpsRule {
    pub max_distance_km: f64,
    pub risk_score: u32,
}

impl IpGpsRule {
    pub fn new(max_distance_km: f64, risk_score: u32) -> Self {
        IpGpsRule {
            max_distance_km,
            risk_score,
        }
    }
}

impl Rule for IpGpsRule {
    fn name(&self) -> &str {
        "IP-GPS Crosscheck"
    }

    fn description(&self) -> String {
        format!(
            "IP location and device GPS location are more than {:.0} km apart.",
            self.max_distance_km
        )
    }

    fn score(&self, _current: &LoginRecord, _previous: Option<&LoginRecord>) -> Result<u32, RuleError> {
        Ok(0)
    }

    fn as_geo_rule(&self) -> Option<&dyn GeoRule> {
        Some(self)
    }
}

impl GeoRule for IpGpsRule {
    fn score_with_context(
        &self,
        ctx: &GeoContext,
        _current: &LoginRecord,
        _previous: Option<&LoginRecord>,
    ) -> Result<u32, RuleError> {
        match (ctx.ip_location, ctx.device_location) {
            (Some(ip), Some(device)) if ip.distance_to(&device) > self.max_distance_km => {
                Ok(self.risk_score)
            }
            _ => Ok(0),
        }
    }
}
