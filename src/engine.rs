//! Risk evaluation engine
//!
//! Drives one login attempt through the pipeline:
//! 1. geolocate the raw IP (city + ASN)
//! 2. mask the IP and hash the device signals
//! 3. build the privacy-safe [`LoginRecord`]
//! 4. fetch the user's previous record
//! 5. build the ephemeral [`GeoContext`]
//! 6. score every rule in configuration order
//!
//! The engine never persists anything and never makes a block decision.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::detection::{GeoContext, GeoLocation, Rule};
use crate::geolocation::{AsnInfo, GeoData, GeoLookup};
use crate::models::{Evaluation, LoginAttempt, LoginRecord, RiskResult};
use crate::persistence::HistoryStore;
use crate::privacy::{fingerprint_hash, mask_ip, prefix_network_address};

/// Scores login attempts against a configured set of rules.
///
/// One instance can serve many concurrent evaluations. The rule list is
/// meant to be set up before the engine is shared and left alone afterwards.
pub struct Engine {
    geo: Arc<dyn GeoLookup>,
    history: Arc<dyn HistoryStore>,
    rules: Vec<Arc<dyn Rule>>,
}

impl Engine {
    pub fn new(geo: Arc<dyn GeoLookup>, history: Arc<dyn HistoryStore>) -> Self {
        Engine {
            geo,
            history,
            rules: Vec::new(),
        }
    }

    /// Replace the rule list
    pub fn with_rules(mut self, rules: Vec<Arc<dyn Rule>>) -> Self {
        self.rules = rules;
        self
    }

    /// Append a rule; rules are evaluated in the order they were added
    pub fn add_rule<R: Rule + 'static>(&mut self, rule: R) {
        self.rules.push(Arc::new(rule));
    }

    /// Append a rule the caller keeps a handle to
    pub fn add_shared_rule(&mut self, rule: Arc<dyn Rule>) {
        self.rules.push(rule);
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Score an attempt happening now
    pub fn validate(&self, attempt: &LoginAttempt) -> Evaluation {
        self.validate_at(attempt, Utc::now())
    }

    /// Score an attempt, stamping the record with the given time
    pub fn validate_at(&self, attempt: &LoginAttempt, timestamp: DateTime<Utc>) -> Evaluation {
        let geo_data = self.locate(&attempt.ip_address);
        let asn_info = self.locate_asn(&attempt.ip_address);

        let current = LoginRecord {
            user_id: attempt.user_id.clone(),
            timestamp,
            masked_ip_prefix: mask_ip(&attempt.ip_address),
            country_code: geo_data.country_code.clone(),
            city_id: geo_data.city_id,
            asn: asn_info.asn,
            org_name: asn_info.org_name,
            fingerprint_hash: fingerprint_hash(&attempt.user_agent, &attempt.accept_language),
            ip_timezone: geo_data.timezone.clone(),
            client_timezone: attempt.client_timezone.clone(),
        };

        let previous = self.fetch_previous(&current.user_id);

        let result = {
            let ctx = GeoContext::new(
                Some(GeoLocation::new(geo_data.latitude, geo_data.longitude)),
                attempt.device_location,
                self.locate_previous(previous.as_ref()),
            );
            self.score(&ctx, &current, previous.as_ref())
        };

        log::debug!(
            "Evaluated login for '{}' from {}: score {} ({} violations)",
            current.user_id,
            display_prefix(&current.masked_ip_prefix),
            result.total_score,
            result.violations.len()
        );

        Evaluation {
            result,
            record: current,
        }
    }

    fn score(&self, ctx: &GeoContext, current: &LoginRecord, previous: Option<&LoginRecord>) -> RiskResult {
        let mut result = RiskResult::new();

        for rule in &self.rules {
            let outcome = match rule.as_geo_rule() {
                Some(geo_rule) => geo_rule.score_with_context(ctx, current, previous),
                None => rule.score(current, previous),
            };

            match outcome {
                Ok(score) => result.add(rule.name(), score, rule.description()),
                Err(e) => {
                    log::warn!("Rule '{}' failed for user '{}', skipping: {}", rule.name(), current.user_id, e);
                }
            }
        }

        result
    }

    fn locate(&self, address: &str) -> GeoData {
        self.geo.locate_ip(address).unwrap_or_else(|e| {
            log::debug!("No geolocation for {}: {}", display_prefix(&mask_ip(address)), e);
            GeoData::default()
        })
    }

    fn locate_asn(&self, address: &str) -> AsnInfo {
        self.geo.locate_asn(address).unwrap_or_else(|e| {
            log::debug!("No ASN data for {}: {}", display_prefix(&mask_ip(address)), e);
            AsnInfo::default()
        })
    }

    fn fetch_previous(&self, user_id: &str) -> Option<LoginRecord> {
        match self.history.fetch_last(user_id) {
            Ok(previous) => previous,
            Err(e) => {
                log::warn!("Failed to fetch login history for '{}', treating as first login: {}", user_id, e);
                None
            }
        }
    }

    /// Approximate centroid of the previous login, looked up from its
    /// masked prefix
    fn locate_previous(&self, previous: Option<&LoginRecord>) -> Option<GeoLocation> {
        let network = prefix_network_address(&previous?.masked_ip_prefix)?;
        match self.geo.locate_ip(&network.to_string()) {
            Ok(data) => Some(GeoLocation::new(data.latitude, data.longitude)),
            Err(e) => {
                log::debug!("No geolocation for previous prefix {}: {}", network, e);
                None
            }
        }
    }
}

fn display_prefix(prefix: &str) -> &str {
    if prefix.is_empty() {
        "<unparseable address>"
    } else {
        prefix
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{
        CountryMismatchRule, DataCenterRule, FingerprintRule, GeoRule, GeofencingRule, IpGpsRule,
        OpenProxyRule, ProxyBlacklist, RuleError, TimezoneRule, VelocityRule,
    };
    use crate::geolocation::GeoError;
    use crate::persistence::{MemoryHistoryStore, PersistenceError};
    use chrono::{Duration, TimeZone};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Geo lookup keyed by masked prefix, so previous-prefix lookups resolve
    /// to the same city as the full address.
    #[derive(Default)]
    struct FakeGeo {
        cities: HashMap<String, GeoData>,
        networks: HashMap<String, AsnInfo>,
        lookups: AtomicUsize,
    }

    impl FakeGeo {
        fn with_city(mut self, ip: &str, country: &str, latitude: f64, longitude: f64, timezone: &str) -> Self {
            self.cities.insert(
                mask_ip(ip),
                GeoData {
                    country_code: country.to_string(),
                    city_name: String::new(),
                    city_id: (latitude.abs() * 1000.0) as u32,
                    latitude,
                    longitude,
                    timezone: timezone.to_string(),
                },
            );
            self
        }

        fn with_asn(mut self, ip: &str, asn: u32, org: &str) -> Self {
            self.networks.insert(
                mask_ip(ip),
                AsnInfo {
                    asn,
                    org_name: org.to_string(),
                },
            );
            self
        }
    }

    impl GeoLookup for FakeGeo {
        fn locate_ip(&self, address: &str) -> Result<GeoData, GeoError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            let prefix = mask_ip(address);
            if prefix.is_empty() {
                return Err(GeoError::InvalidAddress(address.to_string()));
            }
            self.cities.get(&prefix).cloned().ok_or(GeoError::NotFound)
        }

        fn locate_asn(&self, address: &str) -> Result<AsnInfo, GeoError> {
            self.networks.get(&mask_ip(address)).cloned().ok_or(GeoError::NotFound)
        }
    }

    struct BrokenHistory;

    impl HistoryStore for BrokenHistory {
        fn fetch_last(&self, _user_id: &str) -> Result<Option<LoginRecord>, PersistenceError> {
            Err(PersistenceError::InvalidData("disk on fire".to_string()))
        }

        fn store(&self, _record: &LoginRecord) -> Result<(), PersistenceError> {
            Err(PersistenceError::LockPoisoned)
        }
    }

    struct FailingRule;

    impl Rule for FailingRule {
        fn name(&self) -> &str {
            "Always Fails"
        }

        fn description(&self) -> String {
            "This rule always fails.".to_string()
        }

        fn score(&self, _current: &LoginRecord, _previous: Option<&LoginRecord>) -> Result<u32, RuleError> {
            Err(RuleError::Evaluation("boom".to_string()))
        }
    }

    struct FixedRule(&'static str, u32);

    impl Rule for FixedRule {
        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> String {
            format!("{} always scores {}.", self.0, self.1)
        }

        fn score(&self, _current: &LoginRecord, _previous: Option<&LoginRecord>) -> Result<u32, RuleError> {
            Ok(self.1)
        }
    }

    /// Scores 1 through the plain entry point and 2 with context
    struct DualRule;

    impl Rule for DualRule {
        fn name(&self) -> &str {
            "Dual"
        }

        fn description(&self) -> String {
            "Dual capability rule.".to_string()
        }

        fn score(&self, _current: &LoginRecord, _previous: Option<&LoginRecord>) -> Result<u32, RuleError> {
            Ok(1)
        }

        fn as_geo_rule(&self) -> Option<&dyn GeoRule> {
            Some(self)
        }
    }

    impl GeoRule for DualRule {
        fn score_with_context(
            &self,
            _ctx: &GeoContext,
            _current: &LoginRecord,
            _previous: Option<&LoginRecord>,
        ) -> Result<u32, RuleError> {
            Ok(2)
        }
    }

    const AMSTERDAM_IP: &str = "185.107.56.1";
    const ISTANBUL_IP: &str = "88.230.100.50";
    const LONDON_IP: &str = "81.2.69.142";
    const AWS_IP: &str = "52.94.76.1";

    fn fake_geo() -> FakeGeo {
        FakeGeo::default()
            .with_city(AMSTERDAM_IP, "NL", 52.3676, 4.9041, "Europe/Amsterdam")
            .with_city(ISTANBUL_IP, "TR", 41.0082, 28.9784, "Europe/Istanbul")
            .with_city(LONDON_IP, "GB", 51.5074, -0.1278, "Europe/London")
            .with_city(AWS_IP, "US", 39.0438, -77.4874, "America/New_York")
            .with_asn(ISTANBUL_IP, 9121, "Turk Telekom")
            .with_asn(AWS_IP, 16509, "Amazon.com, Inc.")
    }

    fn all_rules() -> Vec<Arc<dyn Rule>> {
        vec![
            Arc::new(DataCenterRule::with_default_providers(30)),
            Arc::new(OpenProxyRule::new(ProxyBlacklist::with_defaults(), 40)),
            Arc::new(IpGpsRule::new(50.0, 40)),
            Arc::new(TimezoneRule::new(45)),
            Arc::new(VelocityRule::new(900.0, 80)),
            Arc::new(FingerprintRule::new(35)),
            Arc::new(CountryMismatchRule::new(25)),
        ]
    }

    fn engine_with(history: Arc<dyn HistoryStore>) -> Engine {
        Engine::new(Arc::new(fake_geo()), history).with_rules(all_rules())
    }

    fn t0() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn browser_attempt(user: &str, ip: &str) -> LoginAttempt {
        LoginAttempt::new(user, ip)
            .with_user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/120.0")
            .with_accept_language("tr-TR")
            .with_client_timezone("Europe/Istanbul")
    }

    #[test]
    fn test_first_login_disables_stateful_rules() {
        let store = Arc::new(MemoryHistoryStore::new());
        let engine = engine_with(store.clone());

        let evaluation = engine.validate_at(&browser_attempt("alice", ISTANBUL_IP), t0());

        for stateful in ["Impossible Travel", "Device Fingerprint Change", "Country Change"] {
            assert!(evaluation.result.violation(stateful).is_none(), "{} should not fire", stateful);
        }
        assert!(evaluation.result.is_clean());
        assert_eq!(evaluation.result.total_score, 0);
        // the engine leaves persistence to the caller
        assert!(store.is_empty());
    }

    #[test]
    fn test_vpn_scenario_timezone_and_gps_mismatch() {
        let engine = engine_with(Arc::new(MemoryHistoryStore::new()));
        // Amsterdam exit IP, device actually in Ankara
        let attempt = browser_attempt("bob", AMSTERDAM_IP).with_device_location(39.92, 32.85);

        let evaluation = engine.validate_at(&attempt, t0());

        assert!(evaluation.result.violation("Timezone Mismatch").is_some());
        assert!(evaluation.result.violation("IP-GPS Crosscheck").is_some());
        assert_eq!(evaluation.result.total_score, 45 + 40);
        assert_eq!(evaluation.record.country_code, "NL");
        assert_eq!(evaluation.record.ip_timezone, "Europe/Amsterdam");
        assert_eq!(evaluation.record.client_timezone, "Europe/Istanbul");

        let json = serde_json::to_string(&evaluation.record).unwrap();
        assert!(!json.contains("latitude"));
        assert!(!json.contains("longitude"));
        assert!(!json.contains(AMSTERDAM_IP));
        assert!(!json.contains("Mozilla"));
    }

    #[test]
    fn test_impossible_travel_scenario() {
        let store = Arc::new(MemoryHistoryStore::new());
        let engine = engine_with(store.clone());

        let first = engine.validate_at(&browser_attempt("carol", ISTANBUL_IP), t0());
        store.store(&first.record).unwrap();

        // five minutes later from London, ~2,500 km away, same browser
        let attempt = browser_attempt("carol", LONDON_IP).with_client_timezone("Europe/London");
        let second = engine.validate_at(&attempt, t0() + Duration::minutes(5));

        let names: Vec<&str> = second.result.violations.iter().map(|v| v.rule_name.as_str()).collect();
        assert_eq!(names, vec!["Impossible Travel", "Country Change"]);
        assert_eq!(second.result.total_score, 80 + 25);
    }

    #[test]
    fn test_velocity_over_three_thousand_km() {
        let store = Arc::new(MemoryHistoryStore::new());
        let geo = fake_geo()
            .with_city("203.0.113.10", "EG", 30.0444, 31.2357, "Africa/Cairo")
            .with_city("198.51.100.10", "ES", 40.4168, -3.7038, "Europe/Madrid");
        let mut engine = Engine::new(Arc::new(geo), store.clone());
        engine.add_rule(VelocityRule::new(900.0, 80));
        engine.add_rule(FingerprintRule::new(35));

        let first = engine.validate_at(&browser_attempt("dave", "203.0.113.10"), t0());
        store.store(&first.record).unwrap();

        let second = engine.validate_at(&browser_attempt("dave", "198.51.100.10"), t0() + Duration::minutes(5));
        assert_eq!(second.result.total_score, 80);
        assert_eq!(second.result.violations.len(), 1);
        assert_eq!(second.result.violations[0].rule_name, "Impossible Travel");
    }

    #[test]
    fn test_failing_rule_is_isolated() {
        let mut engine = Engine::new(Arc::new(fake_geo()), Arc::new(MemoryHistoryStore::new()));
        engine.add_rule(FixedRule("Before", 10));
        engine.add_rule(FailingRule);
        engine.add_rule(FixedRule("After", 5));

        let evaluation = engine.validate_at(&browser_attempt("erin", ISTANBUL_IP), t0());

        assert_eq!(evaluation.result.total_score, 15);
        let names: Vec<&str> = evaluation.result.violations.iter().map(|v| v.rule_name.as_str()).collect();
        assert_eq!(names, vec!["Before", "After"]);
        assert_eq!(evaluation.result.violations[0].reason, "Before always scores 10.");
    }

    #[test]
    fn test_context_entry_point_preferred() {
        let mut engine = Engine::new(Arc::new(fake_geo()), Arc::new(MemoryHistoryStore::new()));
        engine.add_rule(DualRule);

        let evaluation = engine.validate_at(&browser_attempt("frank", ISTANBUL_IP), t0());
        assert_eq!(evaluation.result.total_score, 2);
    }

    /// Implements the context entry point but never advertises it
    struct UnadvertisedGeoRule;

    impl Rule for UnadvertisedGeoRule {
        fn name(&self) -> &str {
            "Unadvertised"
        }

        fn description(&self) -> String {
            "Context rule without the capability hook.".to_string()
        }

        fn score(&self, _current: &LoginRecord, _previous: Option<&LoginRecord>) -> Result<u32, RuleError> {
            Ok(1)
        }
    }

    impl GeoRule for UnadvertisedGeoRule {
        fn score_with_context(
            &self,
            _ctx: &GeoContext,
            _current: &LoginRecord,
            _previous: Option<&LoginRecord>,
        ) -> Result<u32, RuleError> {
            Ok(2)
        }
    }

    #[test]
    fn test_context_entry_point_requires_capability_hook() {
        let mut engine = Engine::new(Arc::new(fake_geo()), Arc::new(MemoryHistoryStore::new()));
        engine.add_rule(UnadvertisedGeoRule);

        let evaluation = engine.validate_at(&browser_attempt("frank", ISTANBUL_IP), t0());
        assert_eq!(evaluation.result.total_score, 1);
    }

    #[test]
    fn test_location_rules_advertise_capability() {
        let geo_rules: Vec<Arc<dyn Rule>> = vec![
            Arc::new(GeofencingRule::new(39.0, 35.0, 500.0, 50)),
            Arc::new(IpGpsRule::new(50.0, 40)),
            Arc::new(VelocityRule::default()),
        ];
        for rule in &geo_rules {
            assert!(rule.as_geo_rule().is_some(), "{} lost its context entry point", rule.name());
        }

        let plain_rules: Vec<Arc<dyn Rule>> = vec![
            Arc::new(TimezoneRule::new(45)),
            Arc::new(FingerprintRule::new(35)),
            Arc::new(CountryMismatchRule::new(25)),
        ];
        for rule in &plain_rules {
            assert!(rule.as_geo_rule().is_none());
        }
    }

    #[test]
    fn test_zero_score_rules_contribute_nothing() {
        let mut engine = Engine::new(Arc::new(fake_geo()), Arc::new(MemoryHistoryStore::new()));
        engine.add_rule(FixedRule("Quiet", 0));
        engine.add_rule(FixedRule("Loud", 7));

        let evaluation = engine.validate_at(&browser_attempt("gina", ISTANBUL_IP), t0());
        assert_eq!(evaluation.result.violations.len(), 1);
        assert_eq!(evaluation.result.total_score, 7);
    }

    #[test]
    fn test_unparseable_ip_still_scores() {
        let mut engine = engine_with(Arc::new(MemoryHistoryStore::new()));
        engine.add_rule(FixedRule("Non-geo", 3));

        let evaluation = engine.validate_at(&browser_attempt("hank", "not-an-ip"), t0());

        assert_eq!(evaluation.record.masked_ip_prefix, "");
        assert_eq!(evaluation.record.country_code, "");
        assert_eq!(evaluation.record.asn, 0);
        assert_eq!(evaluation.result.total_score, 3);
    }

    #[test]
    fn test_history_failure_treated_as_first_login() {
        let engine = engine_with(Arc::new(BrokenHistory));
        let attempt = browser_attempt("ivy", LONDON_IP).with_client_timezone("Europe/London");

        let evaluation = engine.validate_at(&attempt, t0());
        assert!(evaluation.result.is_clean());
    }

    #[test]
    fn test_data_center_and_record_fields() {
        let engine = engine_with(Arc::new(MemoryHistoryStore::new()));
        let attempt = LoginAttempt::new("judy", AWS_IP).with_user_agent("curl/7.68.0");

        let evaluation = engine.validate_at(&attempt, t0());

        assert_eq!(evaluation.result.violations.len(), 1);
        assert_eq!(evaluation.result.violations[0].rule_name, "Data Center IP");
        assert_eq!(evaluation.record.masked_ip_prefix, "52.94.76.0/24");
        assert_eq!(evaluation.record.asn, 16509);
        assert_eq!(evaluation.record.org_name, "Amazon.com, Inc.");
        assert_eq!(evaluation.record.timestamp, t0());
        assert_eq!(evaluation.record.fingerprint_hash, fingerprint_hash("curl/7.68.0", ""));
    }

    #[test]
    fn test_open_proxy_through_engine() {
        let blacklist = ProxyBlacklist::new();
        let mut engine = Engine::new(Arc::new(fake_geo()), Arc::new(MemoryHistoryStore::new()));
        engine.add_rule(OpenProxyRule::new(blacklist.clone(), 40));

        let attempt = browser_attempt("kim", LONDON_IP);
        assert!(engine.validate_at(&attempt, t0()).result.is_clean());

        blacklist.add_ip("81.2.69.1");
        assert_eq!(engine.validate_at(&attempt, t0()).result.total_score, 40);
    }

    #[test]
    fn test_previous_location_requires_second_lookup() {
        let store = Arc::new(MemoryHistoryStore::new());
        let geo = Arc::new(fake_geo());
        let engine = Engine::new(geo.clone(), store.clone()).with_rules(vec![Arc::new(VelocityRule::default())]);

        let first = engine.validate_at(&browser_attempt("leo", ISTANBUL_IP), t0());
        assert_eq!(geo.lookups.load(Ordering::SeqCst), 1);
        store.store(&first.record).unwrap();

        engine.validate_at(&browser_attempt("leo", LONDON_IP), t0() + Duration::hours(1));
        assert_eq!(geo.lookups.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_geofencing_uses_ip_location() {
        let mut engine = Engine::new(Arc::new(fake_geo()), Arc::new(MemoryHistoryStore::new()));
        engine.add_rule(GeofencingRule::new(39.0, 35.0, 500.0, 50));

        let outside = engine.validate_at(&browser_attempt("mia", AMSTERDAM_IP).with_device_location(39.0, 35.0), t0());
        assert_eq!(outside.result.total_score, 50);

        let unknown = engine.validate_at(&browser_attempt("mia", "192.0.2.1"), t0());
        assert_eq!(unknown.result.total_score, 0);
    }

    #[test]
    fn test_rule_names_in_order() {
        let engine = engine_with(Arc::new(MemoryHistoryStore::new()));
        assert_eq!(engine.rule_count(), 7);
        assert_eq!(engine.rule_names()[0], "Data Center IP");
        assert_eq!(engine.rule_names()[6], "Country Change");
    }

    #[test]
    fn test_engine_is_shareable_across_threads() {
        let engine = Arc::new(engine_with(Arc::new(MemoryHistoryStore::new())));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let engine = Arc::clone(&engine);
                std::thread::spawn(move || {
                    let attempt = browser_attempt(&format!("user{}", i), AMSTERDAM_IP);
                    engine.validate_at(&attempt, t0()).result.total_score
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 45);
        }
    }
}
