use serde::{Deserialize, Serialize};

use super::LoginRecord;

/// One triggered rule and the points it added
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub rule_name: String,
    pub score: u32,
    pub reason: String,
}

/// Aggregated, explainable outcome of an evaluation.
///
/// This is a score, not a verdict. Whether a login is blocked is up to the
/// host, usually by comparing `total_score` to a threshold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskResult {
    pub total_score: u32,
    /// In rule configuration order
    pub violations: Vec<Violation>,
}

impl RiskResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a rule contribution. Zero scores are ignored.
    pub fn add(&mut self, rule_name: &str, score: u32, reason: String) {
        if score == 0 {
            return;
        }
        self.total_score = self.total_score.saturating_add(score);
        self.violations.push(Violation {
            rule_name: rule_name.to_string(),
            score,
            reason,
        });
    }

    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn violation(&self, rule_name: &str) -> Option<&Violation> {
        self.violations.iter().find(|v| v.rule_name == rule_name)
    }
}

/// What the engine hands back for one attempt: the score and the
/// privacy-safe record the caller may choose to persist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub result: RiskResult,
    pub record: LoginRecord,
}
