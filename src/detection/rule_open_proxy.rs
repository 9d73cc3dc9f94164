use super::{ProxyBlacklist, Rule, RuleError};
use crate::models::LoginRecord;

/// Flags logins from networks on an open proxy / Tor exit blacklist.
///
/// Matching happens on the masked prefix only; see [`ProxyBlacklist`].
/// Recommended sources are IPsum (level 3+), FireHOL and the Tor bulk exit
/// list.
#[derive(Debug, Clone)]
pub struct OpenProxyRule {
    blacklist: ProxyBlacklist,
    pub risk_score: u32,
}

impl OpenProxyRule {
    pub fn new(blacklist: ProxyBlacklist, risk_score: u32) -> Self {
        OpenProxyRule { blacklist, risk_score }
    }

    /// Handle for runtime updates; shares state with the rule
    pub fn blacklist(&self) -> ProxyBlacklist {
        self.blacklist.clone()
    }

    pub fn add_ip(&self, ip: &str) -> bool {
        self.blacklist.add_ip(ip)
    }

    pub fn remove_ip(&self, ip: &str) -> bool {
        self.blacklist.remove_ip(ip)
    }

    pub fn count(&self) -> usize {
        self.blacklist.len()
    }
}

impl Rule for OpenProxyRule {
    fn name(&self) -> &str {
        "Known Proxy/Tor Detection"
    }

    fn description(&self) -> String {
        "IP address belongs to a network of known open proxies or Tor exit nodes.".to_string()
    }

    fn score(&self, current: &LoginRecord, _previous: Option<&LoginRecord>) -> Result<u32, RuleError> {
        if current.masked_ip_prefix.is_empty() {
            return Ok(0);
        }

        if self.blacklist.contains_prefix(&current.masked_ip_prefix) {
            Ok(self.risk_score)
        } else {
            Ok(0)
        }
    }
}
