//! Environment-driven configuration for the ingest and viewer commands.
//!
//! Every struct is built from a key lookup function so that parsing can be
//! exercised without touching the process environment. `from_env` wraps the
//! lookup with `std::env::var`.

use anyhow::{Context, Result, anyhow};
use chrono_tz::Tz;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Key lookup used by all `from_lookup` constructors
pub trait ConfigLookup {
    fn get(&self, key: &str) -> Option<String>;
}

impl<F> ConfigLookup for F
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        self(key)
    }
}

/// Lookup backed by the process environment
pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn parse_or<T>(lookup: &impl ConfigLookup, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup.get(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}

fn string_or(lookup: &impl ConfigLookup, key: &str, default: &str) -> String {
    lookup.get(key).unwrap_or_else(|| default.to_string())
}

/// PostgreSQL connection target
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    /// `DATABASE_URL` takes precedence over the individual PG* keys
    pub url: Option<String>,
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&process_env)
    }

    pub fn from_lookup(lookup: &impl ConfigLookup) -> Result<Self> {
        Ok(Self {
            host: string_or(lookup, "PGHOST", "localhost"),
            port: parse_or(lookup, "PGPORT", 5432)?,
            database: string_or(lookup, "PGDATABASE", "flightlogs"),
            user: string_or(lookup, "PGUSER", "flightview"),
            password: string_or(lookup, "PGPASSWORD", "flightview"),
            url: lookup.get("DATABASE_URL").filter(|u| !u.is_empty()),
        })
    }

    /// Connection string accepted by libpq: either `DATABASE_URL` verbatim or
    /// a keyword/value conninfo string built from the PG* settings.
    pub fn connection_string(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        format!(
            "host={} port={} dbname={} user={} password={}",
            conninfo_quote(&self.host),
            self.port,
            conninfo_quote(&self.database),
            conninfo_quote(&self.user),
            conninfo_quote(&self.password),
        )
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("url", &self.url.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Quote a libpq conninfo value: single quotes, with `\` and `'` escaped
fn conninfo_quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{}'", escaped)
}

/// Rectangular geofence in WGS84 degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub lamin: f64,
    pub lomin: f64,
    pub lamax: f64,
    pub lomax: f64,
}

impl Default for BoundingBox {
    /// Phoenix Sky Harbor and surroundings
    fn default() -> Self {
        Self {
            lamin: 33.386590,
            lomin: -112.036858,
            lamax: 33.444190,
            lomax: -111.893005,
        }
    }
}

impl BoundingBox {
    pub fn from_lookup(lookup: &impl ConfigLookup) -> Result<Self> {
        let defaults = Self::default();
        let bbox = Self {
            lamin: parse_or(lookup, "GEOFENCE_LAMIN", defaults.lamin)?,
            lomin: parse_or(lookup, "GEOFENCE_LOMIN", defaults.lomin)?,
            lamax: parse_or(lookup, "GEOFENCE_LAMAX", defaults.lamax)?,
            lomax: parse_or(lookup, "GEOFENCE_LOMAX", defaults.lomax)?,
        };
        bbox.validate()?;
        Ok(bbox)
    }

    fn validate(&self) -> Result<()> {
        if !(-90.0..=90.0).contains(&self.lamin) || !(-90.0..=90.0).contains(&self.lamax) {
            return Err(anyhow!("Geofence latitude out of range: {:?}", self));
        }
        if !(-180.0..=180.0).contains(&self.lomin) || !(-180.0..=180.0).contains(&self.lomax) {
            return Err(anyhow!("Geofence longitude out of range: {:?}", self));
        }
        if self.lamin > self.lamax || self.lomin > self.lomax {
            return Err(anyhow!("Geofence minimum exceeds maximum: {:?}", self));
        }
        Ok(())
    }

    /// Query parameters understood by `/api/states/all`
    pub fn query_params(&self) -> [(&'static str, f64); 4] {
        [
            ("lamin", self.lamin),
            ("lomin", self.lomin),
            ("lamax", self.lamax),
            ("lomax", self.lomax),
        ]
    }
}

/// OAuth2 client credentials for the OpenSky identity provider
#[derive(Clone, PartialEq, Eq)]
pub struct OpenSkyCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for OpenSkyCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenSkyCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Settings for the `ingest` command
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub credentials: OpenSkyCredentials,
    pub bbox: BoundingBox,
    pub poll_interval: Duration,
    /// Retention cap; zero or negative disables pruning
    pub max_rows: i64,
    pub metrics_port: Option<u16>,
}

impl IngestConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&process_env)
    }

    pub fn from_lookup(lookup: &impl ConfigLookup) -> Result<Self> {
        let client_id = required(lookup, "OPENSKY_CLIENT_ID")?;
        let client_secret = required(lookup, "OPENSKY_CLIENT_SECRET")?;

        let poll_seconds: u64 = parse_or(lookup, "POLL_SECONDS", 30)?;
        if poll_seconds == 0 {
            return Err(anyhow!("POLL_SECONDS must be at least 1"));
        }

        let metrics_port = match lookup.get("METRICS_PORT") {
            Some(raw) => Some(
                raw.trim()
                    .parse::<u16>()
                    .with_context(|| format!("Invalid value for METRICS_PORT: {:?}", raw))?,
            ),
            None => None,
        };

        Ok(Self {
            credentials: OpenSkyCredentials {
                client_id,
                client_secret,
            },
            bbox: BoundingBox::from_lookup(lookup)?,
            poll_interval: Duration::from_secs(poll_seconds),
            max_rows: parse_or(lookup, "MAX_ROWS", 100)?,
            metrics_port,
        })
    }
}

fn required(lookup: &impl ConfigLookup, key: &str) -> Result<String> {
    lookup
        .get(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| anyhow!("{} environment variable not set", key))
}

/// Settings for the `view` command
#[derive(Debug, Clone)]
pub struct ViewerConfig {
    pub limit: i64,
    pub refresh: Duration,
    pub timezone: Tz,
}

impl ViewerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&process_env)
    }

    pub fn from_lookup(lookup: &impl ConfigLookup) -> Result<Self> {
        let limit: i64 = parse_or(lookup, "VIEW_LIMIT", 10)?;
        if limit < 1 {
            return Err(anyhow!("VIEW_LIMIT must be at least 1"));
        }

        let refresh_seconds: u64 = parse_or(lookup, "VIEW_REFRESH", 5)?;
        if refresh_seconds == 0 {
            return Err(anyhow!("VIEW_REFRESH must be at least 1"));
        }

        let tz_name = string_or(lookup, "VIEW_TZ", "America/Phoenix");
        let timezone = tz_name
            .parse::<Tz>()
            .map_err(|e| anyhow!("Invalid value for VIEW_TZ: {:?} ({})", tz_name, e))?;

        Ok(Self {
            limit,
            refresh: Duration::from_secs(refresh_seconds),
            timezone,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn credentials() -> Vec<(&'static str, &'static str)> {
        vec![
            ("OPENSKY_CLIENT_ID", "tracker-client"),
            ("OPENSKY_CLIENT_SECRET", "s3cret"),
        ]
    }

    #[test]
    fn test_ingest_defaults() {
        let config = IngestConfig::from_lookup(&lookup(&credentials())).unwrap();

        assert_eq!(config.credentials.client_id, "tracker-client");
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.max_rows, 100);
        assert_eq!(config.bbox, BoundingBox::default());
        assert!(config.metrics_port.is_none());
    }

    #[test]
    fn test_ingest_requires_credentials() {
        let err = IngestConfig::from_lookup(&lookup(&[])).unwrap_err();
        assert!(err.to_string().contains("OPENSKY_CLIENT_ID"));

        let err =
            IngestConfig::from_lookup(&lookup(&[("OPENSKY_CLIENT_ID", "id")])).unwrap_err();
        assert!(err.to_string().contains("OPENSKY_CLIENT_SECRET"));
    }

    #[test]
    fn test_ingest_overrides() {
        let mut pairs = credentials();
        pairs.extend([
            ("POLL_SECONDS", "10"),
            ("MAX_ROWS", "0"),
            ("GEOFENCE_LAMIN", "40.0"),
            ("GEOFENCE_LOMIN", "-75.0"),
            ("GEOFENCE_LAMAX", "41.0"),
            ("GEOFENCE_LOMAX", "-73.0"),
            ("METRICS_PORT", "9184"),
        ]);
        let config = IngestConfig::from_lookup(&lookup(&pairs)).unwrap();

        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.max_rows, 0);
        assert_eq!(config.bbox.lamin, 40.0);
        assert_eq!(config.bbox.lomax, -73.0);
        assert_eq!(config.metrics_port, Some(9184));
    }

    #[test]
    fn test_invalid_number_names_the_key() {
        let mut pairs = credentials();
        pairs.push(("MAX_ROWS", "lots"));
        let err = IngestConfig::from_lookup(&lookup(&pairs)).unwrap_err();
        assert!(err.to_string().contains("MAX_ROWS"));
    }

    #[test]
    fn test_inverted_geofence_is_rejected() {
        let err = BoundingBox::from_lookup(&lookup(&[
            ("GEOFENCE_LAMIN", "34.0"),
            ("GEOFENCE_LAMAX", "33.0"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("minimum exceeds maximum"));
    }

    #[test]
    fn test_query_params_order() {
        let params = BoundingBox::default().query_params();
        assert_eq!(params[0], ("lamin", 33.386590));
        assert_eq!(params[3], ("lomax", -111.893005));
    }

    #[test]
    fn test_database_conninfo_from_pg_keys() {
        let config = DatabaseConfig::from_lookup(&lookup(&[
            ("PGHOST", "db.internal"),
            ("PGPASSWORD", "it's"),
        ]))
        .unwrap();

        assert_eq!(
            config.connection_string(),
            "host='db.internal' port=5432 dbname='flightlogs' user='flightview' password='it\\'s'"
        );
    }

    #[test]
    fn test_database_url_takes_precedence() {
        let config = DatabaseConfig::from_lookup(&lookup(&[
            ("DATABASE_URL", "postgres://u:p@h/db"),
            ("PGHOST", "ignored"),
        ]))
        .unwrap();
        assert_eq!(config.connection_string(), "postgres://u:p@h/db");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = IngestConfig::from_lookup(&lookup(&credentials())).unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("s3cret"));

        let db = DatabaseConfig::from_lookup(&lookup(&[("PGPASSWORD", "hunter2")])).unwrap();
        assert!(!format!("{:?}", db).contains("hunter2"));
    }

    #[test]
    fn test_viewer_defaults_and_timezone() {
        let config = ViewerConfig::from_lookup(&lookup(&[])).unwrap();
        assert_eq!(config.limit, 10);
        assert_eq!(config.refresh, Duration::from_secs(5));
        assert_eq!(config.timezone, chrono_tz::America::Phoenix);

        let err = ViewerConfig::from_lookup(&lookup(&[("VIEW_TZ", "Mars/Olympus")])).unwrap_err();
        assert!(err.to_string().contains("VIEW_TZ"));
    }
}
