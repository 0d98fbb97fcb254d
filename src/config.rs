use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// Configuration
// ============================================================================
//
// Everything comes from the process environment, optionally seeded from a
// `.env` file. Only DATABASE_URL is mandatory.
//
// ============================================================================

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key}={value:?} is not valid: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// How many stored orders to load into the cache at start-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheWarm {
    MostRecent(usize),
    All,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub kafka_brokers: String,
    pub kafka_topic: String,
    pub kafka_group_id: String,
    pub http_host: String,
    pub http_port: u16,
    pub cache_capacity: usize,
    pub cache_warm: CacheWarm,
    pub receive_backoff: Duration,
    pub shutdown_timeout: Duration,
}

impl Config {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "Loaded .env file"),
            Err(e) if e.not_found() => {}
            Err(e) => tracing::warn!(error = %e, "Ignoring unreadable .env file"),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let database_url = var("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let cache_capacity = parse_or(&var, "CACHE_CAPACITY", 1000usize)?;

        let cache_warm = match var("CACHE_WARM_LIMIT") {
            None => CacheWarm::MostRecent(cache_capacity),
            Some(v) if v.eq_ignore_ascii_case("all") => CacheWarm::All,
            Some(v) => CacheWarm::MostRecent(parse_value("CACHE_WARM_LIMIT", v)?),
        };

        Ok(Self {
            database_url,
            db_max_connections: parse_or(&var, "DB_MAX_CONNECTIONS", 10)?,
            kafka_brokers: var("KAFKA_BROKERS").unwrap_or_else(|| "localhost:9092".into()),
            kafka_topic: var("KAFKA_TOPIC").unwrap_or_else(|| "orders".into()),
            kafka_group_id: var("KAFKA_GROUP_ID").unwrap_or_else(|| "order-service".into()),
            http_host: var("HTTP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            http_port: parse_or(&var, "HTTP_PORT", 8081)?,
            cache_capacity,
            cache_warm,
            receive_backoff: Duration::from_millis(parse_or(&var, "RECEIVE_BACKOFF_MS", 1000)?),
            shutdown_timeout: Duration::from_secs(parse_or(&var, "SHUTDOWN_TIMEOUT_SECS", 5)?),
        })
    }

    pub fn http_addr(&self) -> (String, u16) {
        (self.http_host.clone(), self.http_port)
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        Some(value) => parse_value(key, value),
        None => Ok(default),
    }
}

fn parse_value<T>(key: &'static str, value: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: e.to_string(),
        value,
    })
}
