use super::{GeoContext, GeoRule, Rule, RuleError};
use crate::models::LoginRecord;

/// Distance two logins at the same instant may be apart before they count
/// as impossible travel
pub const SIMULTANEOUS_LOGIN_TOLERANCE_KM: f64 = 10.0;

/// Impossible travel detection between consecutive logins.
///
/// Compares the IP centroids of the current and previous login and flags the
/// login when the implied speed exceeds `max_speed_kmh` (900 km/h is a
/// commercial flight).
#[derive(Debug, Clone)]
pub struct VelocityRule {
    pub max_speed_kmh: f64,
    pub risk_score: u32,
}

impl VelocityRule {
    pub fn new(max_speed_kmh: f64, risk_score: u32) -> Self {
        VelocityRule {
            max_speed_kmh,
            risk_score,
        }
    }
}

impl Default for VelocityRule {
    fn default() -> Self {
        Self::new(900.0, 80)
    }
}

impl Rule for VelocityRule {
    fn name(&self) -> &str {
        "Impossible Travel"
    }

    fn description(&self) -> String {
        format!(
            "Travel speed between consecutive logins exceeded {:.0} km/h.",
            self.max_speed_kmh
        )
    }

    fn score(&self, _current: &LoginRecord, _previous: Option<&LoginRecord>) -> Result<u32, RuleError> {
        Ok(0)
    }

    fn as_geo_rule(&self) -> Option<&dyn GeoRule> {
        Some(self)
    }
}

impl GeoRule for VelocityRule {
    fn score_with_context(
        &self,
        ctx: &GeoContext,
        current: &LoginRecord,
        previous: Option<&LoginRecord>,
    ) -> Result<u32, RuleError> {
        let previous = match previous {
            Some(previous) => previous,
            None => return Ok(0),
        };

        let (here, there) = match (ctx.ip_location, ctx.previous_ip_location) {
            (Some(here), Some(there)) => (here, there),
            _ => return Ok(0),
        };

        let distance_km = here.distance_to(&there);
        let elapsed_hours =
            (current.timestamp - previous.timestamp).num_milliseconds() as f64 / 3_600_000.0;

        // Clock skew or two logins at the same instant
        if elapsed_hours <= 0.0 {
            return Ok(if distance_km > SIMULTANEOUS_LOGIN_TOLERANCE_KM {
                self.risk_score
            } else {
                0
            });
        }

        let speed_kmh = distance_km / elapsed_hours;
        if speed_kmh > self.max_speed_kmh {
            log::debug!(
                "User '{}' moved {:.1} km in {:.2} h ({:.0} km/h)",
                current.user_id,
                distance_km,
                elapsed_hours,
                speed_kmh
            );
            Ok(self.risk_score)
        } else {
            Ok(0)
        }
    }
}
