use super::{Rule, RuleError};
use crate::models::LoginRecord;
use std::collections::HashMap;

/// Cloud and hosting networks commonly used by bots and commercial proxies
pub const DEFAULT_DATA_CENTER_ASNS: &[(u32, &str)] = &[
    // Major cloud providers
    (16509, "Amazon.com (AWS)"),
    (14618, "Amazon.com (AWS)"),
    (15169, "Google Cloud"),
    (396982, "Google Cloud"),
    (8075, "Microsoft Azure"),
    (14061, "DigitalOcean"),
    // European hosting
    (24940, "Hetzner Online GmbH"),
    (16276, "OVH SAS"),
    (12876, "Online S.A.S. (Scaleway)"),
    (49981, "WorldStream"),
    // VPN/proxy infrastructure
    (20473, "Choopa, LLC (Vultr)"),
    (60068, "Datacamp Limited (CDN77)"),
    (9009, "M247 Europe"),
    (20940, "Akamai Technologies"),
    (13335, "Cloudflare"),
    // Other hosting
    (63949, "Linode"),
    (46606, "Unified Layer"),
    (36352, "ColoCrossing"),
];

/// Flags logins coming from a known data center network.
///
/// This only catches cloud-hosted proxies and bots; residential VPNs are not
/// visible at the ASN level.
#[derive(Debug, Clone)]
pub struct DataCenterRule {
    /// ASN -> provider name
    pub blacklisted_asns: HashMap<u32, String>,
    pub risk_score: u32,
}

impl DataCenterRule {
    pub fn new(blacklisted_asns: HashMap<u32, String>, risk_score: u32) -> Self {
        DataCenterRule {
            blacklisted_asns,
            risk_score,
        }
    }

    /// Rule preloaded with [`DEFAULT_DATA_CENTER_ASNS`]
    pub fn with_default_providers(risk_score: u32) -> Self {
        let blacklisted_asns = DEFAULT_DATA_CENTER_ASNS
            .iter()
            .map(|(asn, name)| (*asn, name.to_string()))
            .collect();
        Self::new(blacklisted_asns, risk_score)
    }

    /// Provider name for a blacklisted ASN
    pub fn provider(&self, asn: u32) -> Option<&str> {
        self.blacklisted_asns.get(&asn).map(String::as_str)
    }
}

impl Rule for DataCenterRule {
    fn name(&self) -> &str {
        "Data Center IP"
    }

    fn description(&self) -> String {
        "IP address belongs to a known cloud or hosting provider.".to_string()
    }

    fn score(&self, current: &LoginRecord, _previous: Option<&LoginRecord>) -> Result<u32, RuleError> {
        // ASN 0 means the lookup found nothing
        if current.asn == 0 {
            return Ok(0);
        }

        match self.provider(current.asn) {
            Some(provider) => {
                log::debug!("ASN {} matched data center provider '{}'", current.asn, provider);
                Ok(self.risk_score)
            }
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::test_support::record;

    #[test]
    fn test_known_provider_triggers() {
        let rule = DataCenterRule::with_default_providers(30);
        let mut current = record("u");
        current.asn = 16509;
        assert_eq!(rule.score(&current, None).unwrap(), 30);
        assert_eq!(rule.provider(16509), Some("Amazon.com (AWS)"));
    }

    #[test]
    fn test_residential_asn_passes() {
        let rule = DataCenterRule::with_default_providers(30);
        let current = record("u");
        assert_eq!(rule.score(&current, None).unwrap(), 0);
    }

    #[test]
    fn test_unknown_asn_never_triggers() {
        let mut blacklist = HashMap::new();
        blacklist.insert(0, "bogus".to_string());
        let rule = DataCenterRule::new(blacklist, 30);
        let mut current = record("u");
        current.asn = 0;
        assert_eq!(rule.score(&current, None).unwrap(), 0);
    }

    #[test]
    fn test_default_list_size() {
        let rule = DataCenterRule::with_default_providers(30);
        assert_eq!(rule.blacklisted_asns.len(), 18);
    }
}
