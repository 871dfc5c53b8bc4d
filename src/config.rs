//! Runtime configuration from environment variables.
//!
//! - `BACKEND_URL`: base URL of the school backend (required for the API source)
//! - `DATABASE_URL`: Postgres mirror connection string (required for the DB source)
//! - `SCHOOL_SESSION_ID`: academic session used when none is given on the command line
//! - `HTTP_TIMEOUT_SECS`: request timeout for backend calls (default: 15)
//! - `RUST_LOG`: log filter (default: info)

use std::env;
use std::time::Duration;

pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SourceKind {
    /// Live school backend over HTTP
    #[default]
    Api,
    /// Local Postgres mirror
    Db,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub backend_url: Option<String>,
    pub database_url: Option<String>,
    pub session_id: Option<String>,
    pub http_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend_url: None,
            database_url: None,
            session_id: None,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        Self {
            backend_url: non_empty("BACKEND_URL"),
            database_url: non_empty("DATABASE_URL"),
            session_id: non_empty("SCHOOL_SESSION_ID"),
            http_timeout: Duration::from_secs(
                non_empty("HTTP_TIMEOUT_SECS")
                    .and_then(|value| value.trim().parse().ok())
                    .filter(|secs| *secs > 0)
                    .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
            ),
        }
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

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = AppConfig::from_lookup(lookup(&[]));
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn reads_all_keys() {
        let config = AppConfig::from_lookup(lookup(&[
            ("BACKEND_URL", "https://school.test/api"),
            ("DATABASE_URL", "postgres://localhost/school"),
            ("SCHOOL_SESSION_ID", "2024-25"),
            ("HTTP_TIMEOUT_SECS", "30"),
        ]));
        assert_eq!(config.backend_url.as_deref(), Some("https://school.test/api"));
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/school"));
        assert_eq!(config.session_id.as_deref(), Some("2024-25"));
        assert_eq!(config.http_timeout, Duration::from_secs(30));
    }

    #[test]
    fn bad_timeout_falls_back_to_default() {
        for value in ["abc", "0", "-5", ""] {
            let config = AppConfig::from_lookup(lookup(&[("HTTP_TIMEOUT_SECS", value)]));
            assert_eq!(
                config.http_timeout,
                Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS)
            );
        }
    }

    #[test]
    fn blank_values_count_as_unset() {
        let config = AppConfig::from_lookup(lookup(&[("BACKEND_URL", "  ")]));
        assert!(config.backend_url.is_none());
    }
}
