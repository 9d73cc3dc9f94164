use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::detection::blacklist::DEFAULT_PROXY_IPS;
use crate::detection::{
    BlacklistError, CountryMismatchRule, DataCenterRule, FingerprintRule, GeofencingRule, IpGpsRule,
    OpenProxyRule, ProxyBlacklist, Rule, TimezoneRule, VelocityRule,
};

/// Errors that can occur while loading or applying configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to load blacklist: {0}")]
    Blacklist(#[from] BlacklistError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration for a GeoGuard deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// GeoIP database configuration
    pub geoip: GeoIpConfig,
    /// Login history backend configuration
    pub history: HistoryConfig,
    /// Scoring rules configuration
    pub rules: RulesConfig,
    /// Output configuration
    pub output: OutputConfig,
}

/// GeoIP database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoIpConfig {
    /// Path to GeoLite2-City.mmdb
    pub city_db: PathBuf,
    /// Path to GeoLite2-ASN.mmdb; ASN-based rules see ASN 0 without it
    pub asn_db: Option<PathBuf>,
}

/// Login history configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Backend type: "memory" or "sqlite"
    pub backend: String,
    /// Database path (if backend is "sqlite")
    pub sqlite_path: Option<PathBuf>,
}

/// Scoring rules configuration. A missing section disables the rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RulesConfig {
    pub geofencing: Option<GeofencingConfig>,
    pub data_center: Option<DataCenterConfig>,
    pub open_proxy: Option<OpenProxyConfig>,
    pub ip_gps: Option<IpGpsConfig>,
    pub timezone: Option<ScoreConfig>,
    pub velocity: Option<VelocityConfig>,
    pub fingerprint: Option<ScoreConfig>,
    pub country_mismatch: Option<ScoreConfig>,
}

/// Rules that only need a score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreConfig {
    pub score: u32,
}

/// Geofencing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeofencingConfig {
    pub center_latitude: f64,
    pub center_longitude: f64,
    pub radius_km: f64,
    pub score: u32,
}

/// Data center detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataCenterConfig {
    pub score: u32,
    /// Include the built-in cloud/hosting provider list
    #[serde(default = "default_true")]
    pub use_default_providers: bool,
    /// Additional ASN -> provider name entries (TOML keys are strings)
    #[serde(default)]
    pub extra_asns: BTreeMap<String, String>,
}

/// Open proxy / Tor detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenProxyConfig {
    pub score: u32,
    /// Blacklist file (plain, IPsum or CIDR lines)
    pub blacklist_file: Option<PathBuf>,
    /// Blacklist URL, fetched at startup by the host
    pub blacklist_url: Option<String>,
    /// Inline addresses, masked on load
    #[serde(default)]
    pub entries: Vec<String>,
}

/// IP-GPS cross-check configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpGpsConfig {
    pub max_distance_km: f64,
    pub score: u32,
}

/// Impossible travel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VelocityConfig {
    /// Maximum plausible travel speed in km/h
    pub max_speed_kmh: f64,
    pub score: u32,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output format: "json", "jsonl", or "console"
    pub format: String,
    /// Output file path (stdout if not set)
    pub file_path: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Config {
            geoip: GeoIpConfig {
                city_db: PathBuf::from("data/GeoLite2-City.mmdb"),
                asn_db: Some(PathBuf::from("data/GeoLite2-ASN.mmdb")),
            },
            history: HistoryConfig {
                backend: "memory".to_string(),
                sqlite_path: None,
            },
            rules: RulesConfig {
                geofencing: Some(GeofencingConfig {
                    center_latitude: 39.0,
                    center_longitude: 35.0,
                    radius_km: 500.0,
                    score: 50,
                }),
                data_center: Some(DataCenterConfig {
                    score: 30,
                    use_default_providers: true,
                    extra_asns: BTreeMap::new(),
                }),
                open_proxy: Some(OpenProxyConfig {
                    score: 40,
                    blacklist_file: None,
                    blacklist_url: None,
                    entries: DEFAULT_PROXY_IPS.iter().map(|ip| ip.to_string()).collect(),
                }),
                ip_gps: Some(IpGpsConfig {
                    max_distance_km: 50.0,
                    score: 40,
                }),
                timezone: Some(ScoreConfig { score: 45 }),
                velocity: Some(VelocityConfig {
                    max_speed_kmh: 900.0,
                    score: 80,
                }),
                fingerprint: Some(ScoreConfig { score: 35 }),
                country_mismatch: Some(ScoreConfig { score: 25 }),
            },
            output: OutputConfig {
                format: "console".to_string(),
                file_path: None,
            },
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

/// Rules built from configuration, in evaluation order
pub struct RuleSet {
    pub rules: Vec<Arc<dyn Rule>>,
    /// Handle to the open proxy blacklist, if that rule is enabled
    pub proxy_blacklist: Option<ProxyBlacklist>,
}

impl RulesConfig {
    /// Instantiate the enabled rules.
    ///
    /// Order is fixed: geofencing, data center, open proxy, IP-GPS,
    /// timezone, velocity, fingerprint, country mismatch. The blacklist URL
    /// is not fetched here; use the returned handle for that.
    pub fn build(&self) -> Result<RuleSet, ConfigError> {
        let mut rules: Vec<Arc<dyn Rule>> = Vec::new();
        let mut proxy_blacklist = None;

        if let Some(c) = &self.geofencing {
            if c.radius_km < 0.0 {
                return Err(ConfigError::Invalid("geofencing.radius_km must not be negative".to_string()));
            }
            rules.push(Arc::new(GeofencingRule::new(
                c.center_latitude,
                c.center_longitude,
                c.radius_km,
                c.score,
            )));
        }

        if let Some(c) = &self.data_center {
            let mut rule = if c.use_default_providers {
                DataCenterRule::with_default_providers(c.score)
            } else {
                DataCenterRule::new(Default::default(), c.score)
            };
            for (asn, name) in &c.extra_asns {
                let asn: u32 = asn
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::Invalid(format!("data_center.extra_asns: '{}' is not an ASN", asn)))?;
                rule.blacklisted_asns.insert(asn, name.clone());
            }
            rules.push(Arc::new(rule));
        }

        if let Some(c) = &self.open_proxy {
            let blacklist = ProxyBlacklist::from_ips(&c.entries);
            if let Some(path) = &c.blacklist_file {
                blacklist.extend_from_file(path)?;
            }
            proxy_blacklist = Some(blacklist.clone());
            rules.push(Arc::new(OpenProxyRule::new(blacklist, c.score)));
        }

        if let Some(c) = &self.ip_gps {
            rules.push(Arc::new(IpGpsRule::new(c.max_distance_km, c.score)));
        }

        if let Some(c) = &self.timezone {
            rules.push(Arc::new(TimezoneRule::new(c.score)));
        }

        if let Some(c) = &self.velocity {
            if c.max_speed_kmh <= 0.0 {
                return Err(ConfigError::Invalid("velocity.max_speed_kmh must be positive".to_string()));
            }
            rules.push(Arc::new(VelocityRule::new(c.max_speed_kmh, c.score)));
        }

        if let Some(c) = &self.fingerprint {
            rules.push(Arc::new(FingerprintRule::new(c.score)));
        }

        if let Some(c) = &self.country_mismatch {
            rules.push(Arc::new(CountryMismatchRule::new(c.score)));
        }

        log::info!("Configured {} scoring rules", rules.len());

        Ok(RuleSet {
            rules,
            proxy_blacklist,
        })
    }
}
