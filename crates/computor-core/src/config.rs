//! Process configuration.
//!
//! Backend endpoints, credentials, and pool sizing are read from the process
//! environment once at startup; there is no runtime reconfiguration.

use std::time::Duration;

use computor_error::{CoreError, Result};

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_required(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| CoreError::Validation {
        message: format!("missing required environment variable {name}"),
    })
}

/// PostgreSQL connection and pool settings.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database host.
    pub host:            String,
    /// Database port.
    pub port:            u16,
    /// Role name.
    pub user:            String,
    /// Role password.
    pub password:        String,
    /// Database name.
    pub dbname:          String,
    /// Maximum pooled connections.
    pub pool_size:       usize,
    /// How long a request waits for a pooled connection before the operation
    /// surfaces as `StoreUnavailable`.
    pub acquire_timeout: Duration,
}

impl DatabaseConfig {
    /// Read configuration from `POSTGRES_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            host:            env_or("POSTGRES_HOST", "localhost"),
            port:            env_or("POSTGRES_PORT", "5432").parse().map_err(|_| {
                CoreError::validation("POSTGRES_PORT must be a port number")
            })?,
            user:            env_required("POSTGRES_USER")?,
            password:        env_required("POSTGRES_PASSWORD")?,
            dbname:          env_required("POSTGRES_DB")?,
            pool_size:       env_or("POSTGRES_POOL_SIZE", "10").parse().unwrap_or(10),
            acquire_timeout: Duration::from_secs(
                env_or("POSTGRES_POOL_TIMEOUT", "30").parse().unwrap_or(30),
            ),
        })
    }
}

/// Cache backend settings.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Redis endpoint, e.g. `redis://127.0.0.1:6379/0`.
    pub url:         String,
    /// Key namespace prefix.
    pub prefix:      String,
    /// Default TTL for entries stored without an explicit one.
    pub default_ttl: Duration,
}

impl CacheSettings {
    /// Read configuration from `REDIS_*` / `CACHE_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            url:         env_or("REDIS_URL", "redis://localhost:6379/0"),
            prefix:      env_or("CACHE_PREFIX", "computor"),
            default_ttl: Duration::from_secs(env_or("CACHE_DEFAULT_TTL", "600").parse().unwrap_or(600)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_settings_defaults() {
        let settings = CacheSettings::from_env();
        assert!(!settings.prefix.is_empty());
        assert!(settings.default_ttl.as_secs() > 0);
    }

    #[test]
    fn test_database_config_requires_credentials() {
        // With no POSTGRES_USER in the environment the config must refuse to
        // build rather than default to a guessable role.
        if std::env::var("POSTGRES_USER").is_err() {
            assert!(DatabaseConfig::from_env().is_err());
        }
    }
}
