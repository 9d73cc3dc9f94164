//! Scoring rules and the contracts the engine dispatches through
//!
//! Rules come in two capabilities:
//! - plain rules implement [`Rule`] and only ever see privacy-safe records
//! - location-aware rules additionally implement [`GeoRule`] and receive the
//!   ephemeral [`GeoContext`]; they expose that capability through
//!   [`Rule::as_geo_rule`]
//!
//! The engine only checks the capability, it never looks at the concrete
//! rule type.

pub mod blacklist;
pub mod context;
pub mod geometry;
pub mod rule_country_mismatch;
pub mod rule_datacenter;
pub mod rule_fingerprint;
pub mod rule_geo_velocity;
pub mod rule_geofencing;
pub mod rule_ip_gps;
pub mod rule_open_proxy;
pub mod rule_timezone;

pub use blacklist::{BlacklistError, ProxyBlacklist};
pub use context::GeoContext;
pub use geometry::{haversine_distance, GeoLocation, EARTH_RADIUS_KM};
pub use rule_country_mismatch::CountryMismatchRule;
pub use rule_datacenter::DataCenterRule;
pub use rule_fingerprint::FingerprintRule;
pub use rule_geo_velocity::VelocityRule;
pub use rule_geofencing::GeofencingRule;
pub use rule_ip_gps::IpGpsRule;
pub use rule_open_proxy::OpenProxyRule;
pub use rule_timezone::TimezoneRule;

use crate::models::LoginRecord;
use thiserror::Error;

/// Errors a rule may report instead of a score
#[derive(Error, Debug)]
pub enum RuleError {
    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("Rule evaluation failed: {0}")]
    Evaluation(String),
}

/// A pluggable scoring unit.
///
/// Rules hold configuration only; everything about the attempt arrives as
/// arguments. A score of 0 means the rule did not trigger.
pub trait Rule: Send + Sync {
    /// Stable identifier, used as the violation's rule name
    fn name(&self) -> &str;

    /// Full sentence explaining what the rule checks, used as the
    /// violation's reason
    fn description(&self) -> String;

    /// Score the current login against the previous one (`None` on a first
    /// login)
    fn score(&self, current: &LoginRecord, previous: Option<&LoginRecord>) -> Result<u32, RuleError>;

    /// Location-aware entry point, if this rule has one
    fn as_geo_rule(&self) -> Option<&dyn GeoRule> {
        None
    }
}

/// A rule that needs coordinates to score.
///
/// The engine prefers [`GeoRule::score_with_context`] over [`Rule::score`]
/// whenever [`Rule::as_geo_rule`] returns the rule.
///
/// Implementing this trait is not enough on its own: the rule must also
/// override [`Rule::as_geo_rule`] to return `Some(self)`. Without that the
/// engine only ever calls [`Rule::score`], which has no coordinates.
pub trait GeoRule: Rule {
    fn score_with_context(
        &self,
        ctx: &GeoContext,
        current: &LoginRecord,
        previous: Option<&LoginRecord>,
    ) -> Result<u32, RuleError>;
}
