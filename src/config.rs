use std::env;
use std::fmt::Display;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_ACCESS_TOKEN_MINUTES: i64 = 5;
pub const DEFAULT_REFRESH_TOKEN_DAYS: i64 = 1;
pub const DEFAULT_DB_POOL_SIZE: u32 = 10;

/// Runtime settings, read from the environment (and `.env` via dotenvy).
#[derive(Clone)]
#[cfg_attr(test, derive(Debug))]
pub struct Config {
    /// `None` runs the service on the in-memory store.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub access_token_minutes: i64,
    pub refresh_token_days: i64,
    pub bind_addr: String,
    pub db_pool_size: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = lookup("JWT_SECRET")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow!("JWT_SECRET must be set"))?;

        Ok(Self {
            database_url: lookup("DATABASE_URL").filter(|s| !s.is_empty()),
            jwt_secret,
            access_token_minutes: parse_or(
                &lookup,
                "ACCESS_TOKEN_MINUTES",
                DEFAULT_ACCESS_TOKEN_MINUTES,
            )?,
            refresh_token_days: parse_or(&lookup, "REFRESH_TOKEN_DAYS", DEFAULT_REFRESH_TOKEN_DAYS)?,
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            db_pool_size: parse_or(&lookup, "DB_POOL_SIZE", DEFAULT_DB_POOL_SIZE)?,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{e}"))
            .with_context(|| format!("{key} has an invalid value: {raw:?}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[("JWT_SECRET", "s")]).unwrap();
        assert!(config.database_url.is_none());
        assert_eq!(config.access_token_minutes, DEFAULT_ACCESS_TOKEN_MINUTES);
        assert_eq!(config.refresh_token_days, DEFAULT_REFRESH_TOKEN_DAYS);
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(config.db_pool_size, DEFAULT_DB_POOL_SIZE);
    }

    #[test]
    fn test_secret_is_required() {
        assert!(config_from(&[]).is_err());
        assert!(config_from(&[("JWT_SECRET", "")]).is_err());
    }

    #[test]
    fn test_overrides_and_bad_numbers() {
        let config = config_from(&[
            ("JWT_SECRET", "s"),
            ("DATABASE_URL", "postgres://localhost/medirecords"),
            ("ACCESS_TOKEN_MINUTES", "15"),
            ("BIND_ADDR", "0.0.0.0:9000"),
        ])
        .unwrap();
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/medirecords")
        );
        assert_eq!(config.access_token_minutes, 15);
        assert_eq!(config.bind_addr, "0.0.0.0:9000");

        let err = config_from(&[("JWT_SECRET", "s"), ("DB_POOL_SIZE", "lots")]).unwrap_err();
        assert!(err.to_string().contains("DB_POOL_SIZE"));
    }
}
