//! Privacy-preserving login risk scoring.
//!
//! An [`Engine`] turns a [`LoginAttempt`] into a [`RiskResult`] by running
//! a configurable list of rules against the attempt and the user's previous
//! login. Raw IP addresses, device coordinates and user agent strings never
//! leave an evaluation: the engine keeps only the masked network prefix,
//! coarse geolocation and a one-way fingerprint hash in the [`LoginRecord`]
//! it hands back for persistence.

pub mod config;
pub mod detection;
pub mod engine;
pub mod geolocation;
pub mod models;
pub mod output;
pub mod persistence;
pub mod privacy;

// Re-export commonly used types
pub use config::{Config, ConfigError, RuleSet};
pub use detection::{GeoContext, GeoLocation, GeoRule, ProxyBlacklist, Rule, RuleError};
pub use engine::Engine;
pub use geolocation::{GeoIpService, GeoLookup};
pub use models::{Evaluation, LoginAttempt, LoginRecord, RiskResult, Violation};
pub use persistence::{HistoryStore, MemoryHistoryStore, SqliteHistoryStore};
