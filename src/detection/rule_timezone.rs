use super::{Rule, RuleError};
use crate::models::LoginRecord;

/// Compares the IP-derived timezone with the one the browser reports.
///
/// A mismatch is a common VPN/proxy signal, but travelers and manually
/// changed system clocks produce it too.
#[derive(Debug, Clone)]
pub struct TimezoneRule {
    pub risk_score: u32,
}

impl TimezoneRule {
    pub fn new(risk_score: u32) -> Self {
        TimezoneRule { risk_score }
    }
}

impl Rule for TimezoneRule {
    fn name(&self) -> &str {
        "Timezone Mismatch"
    }

    fn description(&self) -> String {
        "IP-derived timezone differs from the timezone reported by the client.".to_string()
    }

    fn score(&self, current: &LoginRecord, _previous: Option<&LoginRecord>) -> Result<u32, RuleError> {
        if current.ip_timezone.is_empty() || current.client_timezone.is_empty() {
            return Ok(0);
        }

        if current.ip_timezone != current.client_timezone {
            Ok(self.risk_score)
        } else {
            Ok(0)
        }
    }
}
