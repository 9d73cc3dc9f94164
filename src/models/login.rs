use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::detection::GeoLocation;

/// A raw login attempt as handed over by the host application.
///
/// Only lives for the duration of one evaluation. It intentionally does not
/// implement `Serialize` so it cannot be written to a store by accident.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginAttempt {
    pub user_id: String,
    pub ip_address: String,
    /// GPS position reported by the device, if the user granted it
    #[serde(default)]
    pub device_location: Option<GeoLocation>,
    #[serde(default)]
    pub user_agent: String,
    #[serde(default)]
    pub accept_language: String,
    /// IANA timezone reported by the client (e.g. "Europe/Istanbul")
    #[serde(default)]
    pub client_timezone: String,
}

impl LoginAttempt {
    pub fn new(user_id: impl Into<String>, ip_address: impl Into<String>) -> Self {
        LoginAttempt {
            user_id: user_id.into(),
            ip_address: ip_address.into(),
            device_location: None,
            user_agent: String::new(),
            accept_language: String::new(),
            client_timezone: String::new(),
        }
    }

    pub fn with_device_location(mut self, latitude: f64, longitude: f64) -> Self {
        self.device_location = Some(GeoLocation { latitude, longitude });
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_accept_language(mut self, accept_language: impl Into<String>) -> Self {
        self.accept_language = accept_language.into();
        self
    }

    pub fn with_client_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.client_timezone = timezone.into();
        self
    }
}

/// Privacy-safe record of a login, the only form that is ever persisted.
///
/// None of these fields can be turned back into the raw IP address or into
/// precise coordinates:
/// - the IP is masked to its /24 (IPv4) or /64 (IPv6) network
/// - location is reduced to a country code and a city identifier
/// - the user agent and language only survive as a one-way hash
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginRecord {
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    /// e.g. "192.168.1.0/24" or "2001:db8::/64"; empty when the address was unparseable
    pub masked_ip_prefix: String,
    /// ISO 3166-1 alpha-2 country code
    pub country_code: String,
    /// GeoNames city identifier
    pub city_id: u32,
    pub asn: u32,
    pub org_name: String,
    /// SHA-256 of user agent + accept-language
    pub fingerprint_hash: String,
    pub ip_timezone: String,
    pub client_timezone: String,
}
