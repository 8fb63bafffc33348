//! Environment-driven store configuration.
//!
//! | variable                          | default             |
//! |-----------------------------------|---------------------|
//! | `DATABASE_URL`                    | required            |
//! | `USERSTORE_OPERATION_TIMEOUT_MS`  | `5000`              |
//! | `USERSTORE_MAX_IDLE_SESSIONS`     | `8`                 |
//! | `USERSTORE_LOG_LEVEL`             | per build mode      |
//! | `USERSTORE_LOG_DIR`               | unset (stderr)      |

use crate::db::DbOptions;
use crate::logging::default_log_level;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

pub const DATABASE_URL_VAR: &str = "DATABASE_URL";
pub const OPERATION_TIMEOUT_VAR: &str = "USERSTORE_OPERATION_TIMEOUT_MS";
pub const MAX_IDLE_SESSIONS_VAR: &str = "USERSTORE_MAX_IDLE_SESSIONS";
pub const LOG_LEVEL_VAR: &str = "USERSTORE_LOG_LEVEL";
pub const LOG_DIR_VAR: &str = "USERSTORE_LOG_DIR";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    MissingVar(&'static str),
    InvalidVar {
        name: &'static str,
        value: String,
        reason: String,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingVar(name) => write!(f, "{name} is not set"),
            Self::InvalidVar {
                name,
                value,
                reason,
            } => write!(f, "invalid {name}=`{value}`: {reason}"),
        }
    }
}

impl Error for ConfigError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub database_url: String,
    pub operation_timeout: Duration,
    pub max_idle_sessions: usize,
    pub log_level: String,
    pub log_dir: Option<PathBuf>,
}

impl StoreConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let database_url = read(DATABASE_URL_VAR).ok_or(ConfigError::MissingVar(DATABASE_URL_VAR))?;
        let defaults = DbOptions::default();

        let operation_timeout = match read(OPERATION_TIMEOUT_VAR) {
            Some(value) => Duration::from_millis(parse_number(OPERATION_TIMEOUT_VAR, &value)?),
            None => defaults.operation_timeout,
        };
        let max_idle_sessions = match read(MAX_IDLE_SESSIONS_VAR) {
            Some(value) => usize::try_from(parse_number(MAX_IDLE_SESSIONS_VAR, &value)?)
                .map_err(|err| invalid(MAX_IDLE_SESSIONS_VAR, &value, err.to_string()))?,
            None => defaults.max_idle_sessions,
        };

        Ok(Self {
            database_url: database_url.trim().to_string(),
            operation_timeout,
            max_idle_sessions,
            log_level: read(LOG_LEVEL_VAR).unwrap_or_else(|| default_log_level().to_string()),
            log_dir: read(LOG_DIR_VAR).map(PathBuf::from),
        })
    }

    pub fn db_options(&self) -> DbOptions {
        DbOptions {
            operation_timeout: self.operation_timeout,
            max_idle_sessions: self.max_idle_sessions,
        }
    }
}

fn parse_number(name: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|err| invalid(name, value, err.to_string()))
}

fn invalid(name: &'static str, value: &str, reason: String) -> ConfigError {
    ConfigError::InvalidVar {
        name,
        value: value.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, StoreConfig, DATABASE_URL_VAR, OPERATION_TIMEOUT_VAR};
    use std::collections::HashMap;
    use std::time::Duration;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn missing_database_url_is_reported() {
        let err = StoreConfig::from_lookup(lookup_from(&[(DATABASE_URL_VAR, "  ")])).unwrap_err();
        assert_eq!(err, ConfigError::MissingVar("DATABASE_URL"));
        assert_eq!(err.to_string(), "DATABASE_URL is not set");
    }

    #[test]
    fn defaults_apply_when_optional_vars_are_absent() {
        let config =
            StoreConfig::from_lookup(lookup_from(&[(DATABASE_URL_VAR, "sqlite::memory:")]))
                .unwrap();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.operation_timeout, Duration::from_secs(5));
        assert_eq!(config.max_idle_sessions, 8);
        assert_eq!(config.log_dir, None);
    }

    #[test]
    fn timeout_override_is_parsed_and_validated() {
        let config = StoreConfig::from_lookup(lookup_from(&[
            (DATABASE_URL_VAR, "sqlite:/tmp/users.db"),
            (OPERATION_TIMEOUT_VAR, "250"),
        ]))
        .unwrap();
        assert_eq!(config.db_options().operation_timeout, Duration::from_millis(250));

        let err = StoreConfig::from_lookup(lookup_from(&[
            (DATABASE_URL_VAR, "sqlite:/tmp/users.db"),
            (OPERATION_TIMEOUT_VAR, "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidVar {
                name: "USERSTORE_OPERATION_TIMEOUT_MS",
                ..
            }
        ));
    }
}
