//! Privacy transforms applied to raw request data
//!
//! Everything the engine keeps past the start of an evaluation goes through
//! one of these functions first: IP addresses are reduced to their network
//! prefix and device signals to a one-way hash.

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use sha2::{Digest, Sha256};
use std::net::IpAddr;

/// Prefix length kept for IPv4 addresses
pub const IPV4_PREFIX_LEN: u8 = 24;
/// Prefix length kept for IPv6 addresses
pub const IPV6_PREFIX_LEN: u8 = 64;

const FINGERPRINT_SEPARATOR: &str = "|";

/// Mask an IP address to its /24 (IPv4) or /64 (IPv6) network.
///
/// Returns the CIDR string, e.g. `"192.168.1.0/24"`, or an empty string if
/// the input is not an IP address. IPv4-mapped IPv6 addresses are masked as
/// IPv4.
pub fn mask_ip(address: &str) -> String {
    match address.trim().parse::<IpAddr>() {
        Ok(ip) => mask_addr(ip),
        Err(_) => String::new(),
    }
}

/// Mask an already parsed address. See [`mask_ip`].
pub fn mask_addr(ip: IpAddr) -> String {
    mask_network(ip).map(|net| net.to_string()).unwrap_or_default()
}

/// The /24 or /64 network containing `ip`
pub fn mask_network(ip: IpAddr) -> Option<IpNet> {
    let net = match ip {
        IpAddr::V4(v4) => IpNet::V4(Ipv4Net::new(v4, IPV4_PREFIX_LEN).ok()?),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => IpNet::V4(Ipv4Net::new(v4, IPV4_PREFIX_LEN).ok()?),
            None => IpNet::V6(Ipv6Net::new(v6, IPV6_PREFIX_LEN).ok()?),
        },
    };
    Some(net.trunc())
}

/// Recover the network address from a masked prefix such as `"10.1.2.0/24"`.
///
/// Used to geolocate a previous login without ever having its raw address.
/// Returns `None` for empty or malformed prefixes.
pub fn prefix_network_address(prefix: &str) -> Option<IpAddr> {
    let net: IpNet = prefix.trim().parse().ok()?;
    let expected = match net {
        IpNet::V4(_) => IPV4_PREFIX_LEN,
        IpNet::V6(_) => IPV6_PREFIX_LEN,
    };
    (net.prefix_len() == expected).then_some(net.network())
}

/// One-way fingerprint of the device signals.
///
/// SHA-256 over `user_agent | language`, hex encoded. The same inputs always
/// yield the same hash, so device changes can be detected without storing
/// either string.
pub fn fingerprint_hash(user_agent: &str, language: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_agent.as_bytes());
    hasher.update(FINGERPRINT_SEPARATOR.as_bytes());
    hasher.update(language.as_bytes());
    format!("{:x}", hasher.finalize())
}
