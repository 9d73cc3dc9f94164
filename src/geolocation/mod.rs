//! IP geolocation port and its MaxMind GeoLite2 implementation
//!
//! The engine is the only caller of a [`GeoLookup`]; rules never see it.
//! [`GeoIpService`] reads the GeoLite2-City database and, optionally, the
//! GeoLite2-ASN database. Both must be downloaded separately from MaxMind
//! (free with registration).

use maxminddb::{geoip2, MaxMindDBError, Reader};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during geolocation lookups
#[derive(Error, Debug)]
pub enum GeoError {
    #[error("Invalid IP address: {0}")]
    InvalidAddress(String),

    #[error("IP address not found in database")]
    NotFound,

    #[error("No ASN database configured")]
    AsnUnavailable,

    #[error("Database error: {0}")]
    Database(#[from] MaxMindDBError),

    #[error("Database file not found: {0}")]
    FileNotFound(String),
}

/// Coarse location of an IP address.
///
/// Coordinates are city centroids and are only ever used for the duration
/// of one evaluation; the country code and city id are what gets stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoData {
    /// ISO 3166-1 alpha-2 country code
    pub country_code: String,
    /// City name in English
    pub city_name: String,
    /// GeoNames city identifier
    pub city_id: u32,
    pub latitude: f64,
    pub longitude: f64,
    /// IANA timezone (e.g. "Europe/Istanbul")
    pub timezone: String,
}

/// Network operator of an IP address
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AsnInfo {
    pub asn: u32,
    pub org_name: String,
}

/// Location and network lookups for IP addresses.
///
/// Implementations must be safe to call from many evaluations at once.
/// A failed lookup is reported as an error; the engine degrades it to "no
/// data" instead of aborting.
pub trait GeoLookup: Send + Sync {
    fn locate_ip(&self, address: &str) -> Result<GeoData, GeoError>;

    fn locate_asn(&self, address: &str) -> Result<AsnInfo, GeoError>;
}

/// GeoIP lookup service backed by MaxMind databases
///
/// # Example
///
/// ```ignore
/// use geoguard::geolocation::{GeoIpService, GeoLookup};
///
/// let service = GeoIpService::with_asn_database("GeoLite2-City.mmdb", "GeoLite2-ASN.mmdb")?;
/// let data = service.locate_ip("81.2.69.142")?;
/// println!("{} ({})", data.country_code, data.timezone);
/// ```
pub struct GeoIpService {
    city_reader: Arc<Reader<Vec<u8>>>,
    asn_reader: Option<Arc<Reader<Vec<u8>>>>,
}

impl GeoIpService {
    /// Open a City database without ASN support
    ///
    /// # Errors
    ///
    /// Returns an error if the database file cannot be opened or is invalid.
    pub fn new<P: AsRef<Path>>(city_db_path: P) -> Result<Self, GeoError> {
        Ok(GeoIpService {
            city_reader: Arc::new(open_reader(city_db_path.as_ref())?),
            asn_reader: None,
        })
    }

    /// Open both the City and the ASN database
    pub fn with_asn_database<P: AsRef<Path>, Q: AsRef<Path>>(
        city_db_path: P,
        asn_db_path: Q,
    ) -> Result<Self, GeoError> {
        Ok(GeoIpService {
            city_reader: Arc::new(open_reader(city_db_path.as_ref())?),
            asn_reader: Some(Arc::new(open_reader(asn_db_path.as_ref())?)),
        })
    }

    pub fn has_asn_database(&self) -> bool {
        self.asn_reader.is_some()
    }
}

impl GeoLookup for GeoIpService {
    fn locate_ip(&self, address: &str) -> Result<GeoData, GeoError> {
        let ip = parse_address(address)?;
        let city: geoip2::City = self.city_reader.lookup(ip).map_err(map_lookup_error)?;

        Ok(geo_data_from_city(city))
    }

    fn locate_asn(&self, address: &str) -> Result<AsnInfo, GeoError> {
        let reader = self.asn_reader.as_ref().ok_or(GeoError::AsnUnavailable)?;
        let ip = parse_address(address)?;
        let record: geoip2::Asn = reader.lookup(ip).map_err(map_lookup_error)?;

        Ok(AsnInfo {
            asn: record.autonomous_system_number.unwrap_or(0),
            org_name: record
                .autonomous_system_organization
                .map(String::from)
                .unwrap_or_default(),
        })
    }
}

impl Clone for GeoIpService {
    fn clone(&self) -> Self {
        GeoIpService {
            city_reader: Arc::clone(&self.city_reader),
            asn_reader: self.asn_reader.as_ref().map(Arc::clone),
        }
    }
}

/// Flatten a City record. A record without a location block keeps its
/// country and city; the coordinates stay (0,0), which means unknown.
fn geo_data_from_city(city: geoip2::City<'_>) -> GeoData {
    let location = city.location.as_ref();

    GeoData {
        country_code: city
            .country
            .and_then(|c| c.iso_code)
            .map(String::from)
            .unwrap_or_default(),
        city_name: city
            .city
            .as_ref()
            .and_then(|c| c.names.as_ref())
            .and_then(|n| n.get("en").copied())
            .map(String::from)
            .unwrap_or_default(),
        city_id: city.city.as_ref().and_then(|c| c.geoname_id).unwrap_or(0),
        latitude: location.and_then(|l| l.latitude).unwrap_or(0.0),
        longitude: location.and_then(|l| l.longitude).unwrap_or(0.0),
        timezone: location
            .and_then(|l| l.time_zone)
            .map(String::from)
            .unwrap_or_default(),
    }
}

fn open_reader(path: &Path) -> Result<Reader<Vec<u8>>, GeoError> {
    if !path.exists() {
        return Err(GeoError::FileNotFound(path.display().to_string()));
    }
    Ok(Reader::open_readfile(path)?)
}

fn parse_address(address: &str) -> Result<IpAddr, GeoError> {
    address
        .trim()
        .parse()
        .map_err(|_| GeoError::InvalidAddress(address.to_string()))
}

fn map_lookup_error(e: MaxMindDBError) -> GeoError {
    match e {
        MaxMindDBError::AddressNotFoundError(_) => GeoError::NotFound,
        other => GeoError::Database(other),
    }
}
