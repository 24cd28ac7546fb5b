//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::Balance;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL; the in-memory store is used when absent
    pub database_url: Option<String>,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Redis URL; the in-process cache is used when absent
    pub redis_url: Option<String>,

    /// Lifetime of a cache entry
    pub cache_ttl: Duration,

    /// Upper bound on one unit of work, lock waits included
    pub operation_timeout: Duration,

    /// Coins granted to a new employee's wallet
    pub starting_balance: Balance,

    /// Email that provisions as ADMIN
    pub admin_email: String,

    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").filter(|v| !v.is_empty());

        let database_max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?;

        let host = lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string());

        let port = parse_or(&lookup, "PORT", 8080)?;

        let environment = lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string());

        let redis_url = lookup("REDIS_URL").filter(|v| !v.is_empty());

        let cache_ttl = Duration::from_secs(parse_or(&lookup, "CACHE_TTL_SECS", 300)?);

        let operation_timeout_ms: u64 = parse_or(&lookup, "OPERATION_TIMEOUT_MS", 5000)?;
        if operation_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue("OPERATION_TIMEOUT_MS"));
        }
        let operation_timeout = Duration::from_millis(operation_timeout_ms);

        let starting_balance = Balance::new(parse_or(&lookup, "STARTING_BALANCE", 1000)?)
            .map_err(|_| ConfigError::InvalidValue("STARTING_BALANCE"))?;

        let admin_email = lookup("ADMIN_EMAIL").unwrap_or_else(|| "admin@admin".to_string());

        let log_format = match lookup("LOG_FORMAT").as_deref() {
            None => {
                if environment == "production" {
                    LogFormat::Json
                } else {
                    LogFormat::Pretty
                }
            }
            Some("json") => LogFormat::Json,
            Some("pretty") => LogFormat::Pretty,
            Some(_) => return Err(ConfigError::InvalidValue("LOG_FORMAT")),
        };

        Ok(Self {
            database_url,
            database_max_connections,
            host,
            port,
            environment,
            redis_url,
            cache_ttl,
            operation_timeout,
            starting_balance,
            admin_email,
            log_format,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue(name)),
        None => Ok(default),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();

        assert!(config.database_url.is_none());
        assert!(config.redis_url.is_none());
        assert_eq!(config.port, 8080);
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
        assert_eq!(config.operation_timeout, Duration::from_millis(5000));
        assert_eq!(config.starting_balance.value(), 1000);
        assert_eq!(config.admin_email, "admin@admin");
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("DATABASE_URL", "postgres://localhost/coins"),
            ("PORT", "9000"),
            ("ENVIRONMENT", "production"),
            ("STARTING_BALANCE", "250"),
        ])
        .unwrap();

        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/coins")
        );
        assert_eq!(config.port, 9000);
        assert!(config.is_production());
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.starting_balance.value(), 250);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            load(&[("PORT", "eighty")]),
            Err(ConfigError::InvalidValue("PORT"))
        ));
        assert!(matches!(
            load(&[("STARTING_BALANCE", "-5")]),
            Err(ConfigError::InvalidValue("STARTING_BALANCE"))
        ));
        assert!(matches!(
            load(&[("OPERATION_TIMEOUT_MS", "0")]),
            Err(ConfigError::InvalidValue("OPERATION_TIMEOUT_MS"))
        ));
        assert!(matches!(
            load(&[("LOG_FORMAT", "xml")]),
            Err(ConfigError::InvalidValue("LOG_FORMAT"))
        ));
    }
}
