use super::{Rule, RuleError};
use crate::models::LoginRecord;

/// Flags a change of device fingerprint since the previous login
#[derive(Debug, Clone)]
pub struct FingerprintRule {
    pub risk_score: u32,
}

impl FingerprintRule {
    pub fn new(risk_score: u32) -> Self {
        FingerprintRule { risk_score }
    }
}

impl Rule for FingerprintRule {
    fn name(&self) -> &str {
        "Device Fingerprint Change"
    }

    fn description(&self) -> String {
        "Device fingerprint (user agent and language) changed since the previous login.".to_string()
    }

    fn score(&self, current: &LoginRecord, previous: Option<&LoginRecord>) -> Result<u32, RuleError> {
        match previous {
            Some(previous) if previous.fingerprint_hash != current.fingerprint_hash => Ok(self.risk_score),
            _ => Ok(0),
        }
    }
}
