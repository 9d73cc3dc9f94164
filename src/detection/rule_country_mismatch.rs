use super::{Rule, RuleError};
use crate::models::LoginRecord;

/// Flags a login from a different country than the previous one
#[derive(Debug, Clone)]
pub struct CountryMismatchRule {
    pub risk_score: u32,
}

impl CountryMismatchRule {
    pub fn new(risk_score: u32) -> Self {
        CountryMismatchRule { risk_score }
    }
}

impl Rule for CountryMismatchRule {
    fn name(&self) -> &str {
        "Country Change"
    }

    fn description(&self) -> String {
        "Login country differs from the country of the previous login.".to_string()
    }

    fn score(&self, current: &LoginRecord, previous: Option<&LoginRecord>) -> Result<u32, RuleError> {
        let previous = match previous {
            Some(previous) => previous,
            None => return Ok(0),
        };

        if previous.country_code.is_empty() || current.country_code.is_empty() {
            return Ok(0);
        }

        if previous.country_code != current.country_code {
            Ok(self.risk_score)
        } else {
            Ok(0)
        }
    }
}
