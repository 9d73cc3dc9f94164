//! Masked-prefix blacklist for open proxies and Tor exit nodes
//!
//! Entries are masked to /24 (IPv4) or /64 (IPv6) as they are loaded, so no
//! raw address is ever kept. Lookups take a read lock and administrative
//! updates the write lock, so scoring never waits on other scoring calls.

use crate::privacy::{mask_addr, IPV4_PREFIX_LEN, IPV6_PREFIX_LEN};
use std::collections::HashSet;
use ipnet::{IpNet, Ipv4Net};
use std::net::IpAddr;
use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

/// Shortest IPv4 CIDR that is expanded into /24 entries (256 of them)
const MAX_IPV4_EXPANSION_PREFIX: u8 = 16;

/// Sample entries for demos and tests; load a real list in production.
pub const DEFAULT_PROXY_IPS: &[&str] = &["185.220.101.1", "185.220.101.2", "185.220.102.1"];

/// Errors that can occur while loading a blacklist
#[derive(Error, Debug)]
pub enum BlacklistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Shared, thread-safe set of masked network prefixes.
///
/// Cloning yields another handle to the same set, so the host can keep a
/// handle for runtime updates after the owning rule is registered.
#[derive(Debug, Clone, Default)]
pub struct ProxyBlacklist {
    prefixes: Arc<RwLock<HashSet<String>>>,
}

impl ProxyBlacklist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw addresses, masking each one. Unparseable entries are dropped.
    pub fn from_ips<I, S>(ips: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let blacklist = Self::new();
        {
            let mut prefixes = blacklist.write();
            for ip in ips {
                prefixes.extend(parse_line(ip.as_ref()));
            }
        }
        blacklist
    }

    /// Blacklist containing [`DEFAULT_PROXY_IPS`]
    pub fn with_defaults() -> Self {
        Self::from_ips(DEFAULT_PROXY_IPS)
    }

    /// Load a list file. See [`parse_blacklist`] for the accepted format.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, BlacklistError> {
        let blacklist = Self::new();
        blacklist.extend_from_file(path)?;
        Ok(blacklist)
    }

    /// Merge the entries of a list file, returning how many prefixes were new
    pub fn extend_from_file<P: AsRef<Path>>(&self, path: P) -> Result<usize, BlacklistError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let added = self.extend(parse_blacklist(&contents));
        log::info!("Loaded proxy blacklist {} ({} new prefixes, {} total)", path.display(), added, self.len());
        Ok(added)
    }

    /// Download a list (e.g. IPsum or the Tor bulk exit list) and merge it
    pub async fn extend_from_url(&self, client: &reqwest::Client, url: &str) -> Result<usize, BlacklistError> {
        log::debug!("Fetching proxy blacklist from {}", url);

        let response = client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(BlacklistError::InvalidResponse(format!("HTTP {}", response.status())));
        }

        let body = response.text().await?;
        let added = self.extend(parse_blacklist(&body));
        log::info!("Loaded proxy blacklist from {} ({} new prefixes, {} total)", url, added, self.len());
        Ok(added)
    }

    /// Merge already-masked prefixes, returning how many were new
    pub fn extend<I: IntoIterator<Item = String>>(&self, prefixes: I) -> usize {
        let mut set = self.write();
        let mut added = 0;
        for prefix in prefixes {
            if set.insert(prefix) {
                added += 1;
            }
        }
        added
    }

    /// Swap the whole set for a freshly loaded one
    pub fn replace<I: IntoIterator<Item = String>>(&self, prefixes: I) {
        let fresh: HashSet<String> = prefixes.into_iter().collect();
        *self.write() = fresh;
    }

    /// Add the prefix of an address. Returns false if the address is invalid
    /// or its prefix was already listed.
    pub fn add_ip(&self, ip: &str) -> bool {
        match ip.trim().parse::<IpAddr>() {
            Ok(addr) => self.write().insert(mask_addr(addr)),
            Err(_) => false,
        }
    }

    /// Remove the prefix of an address. Returns whether it was listed.
    pub fn remove_ip(&self, ip: &str) -> bool {
        match ip.trim().parse::<IpAddr>() {
            Ok(addr) => self.write().remove(&mask_addr(addr)),
            Err(_) => false,
        }
    }

    pub fn contains_prefix(&self, prefix: &str) -> bool {
        self.read().contains(prefix)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    // The set stays consistent across a panicking writer, so a poisoned lock
    // is recovered rather than propagated.
    fn read(&self) -> RwLockReadGuard<'_, HashSet<String>> {
        self.prefixes.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashSet<String>> {
        self.prefixes.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Parse a blacklist document into masked prefixes.
///
/// Accepted lines:
/// - a single address (`1.2.3.4`)
/// - IPsum format, address followed by a hit count (`1.2.3.4\t5`)
/// - CIDR ranges; IPv4 ranges between /16 and /23 expand to their /24s
/// - blank lines and `#` comments are ignored
pub fn parse_blacklist(contents: &str) -> Vec<String> {
    contents.lines().flat_map(parse_line).collect()
}

fn parse_line(line: &str) -> Vec<String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Vec::new();
    }

    let token = match line.split_whitespace().next() {
        Some(token) => token,
        None => return Vec::new(),
    };

    if token.contains('/') {
        return match token.parse::<IpNet>() {
            Ok(net) => expand_network(net),
            Err(_) => {
                log::debug!("Skipping malformed CIDR entry '{}'", token);
                Vec::new()
            }
        };
    }

    match token.parse::<IpAddr>() {
        Ok(addr) => vec![mask_addr(addr)],
        Err(_) => {
            log::debug!("Skipping unparseable blacklist entry '{}'", token);
            Vec::new()
        }
    }
}

fn expand_network(net: IpNet) -> Vec<String> {
    match net {
        IpNet::V4(v4) => expand_ipv4(v4),
        IpNet::V6(v6) => match v6.addr().to_ipv4_mapped() {
            // ::ffff:0:0/96 covers all of IPv4
            Some(mapped) if v6.prefix_len() >= 96 => match Ipv4Net::new(mapped, v6.prefix_len() - 96) {
                Ok(v4) => expand_ipv4(v4),
                Err(_) => Vec::new(),
            },
            Some(_) => skip_wide(net),
            None if v6.prefix_len() >= IPV6_PREFIX_LEN => vec![mask_addr(IpAddr::V6(v6.network()))],
            None => skip_wide(net),
        },
    }
}

fn expand_ipv4(net: Ipv4Net) -> Vec<String> {
    if net.prefix_len() >= IPV4_PREFIX_LEN {
        return vec![mask_addr(IpAddr::V4(net.network()))];
    }
    if net.prefix_len() < MAX_IPV4_EXPANSION_PREFIX {
        return skip_wide(IpNet::V4(net));
    }
    match net.trunc().subnets(IPV4_PREFIX_LEN) {
        Ok(subnets) => subnets.map(|subnet| subnet.to_string()).collect(),
        Err(_) => Vec::new(),
    }
}

fn skip_wide(net: IpNet) -> Vec<String> {
    log::warn!("Skipping blacklist range {}: too wide to store as masked prefixes", net);
    Vec::new()
}
