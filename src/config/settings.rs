//! Environment configuration
//!
//! Read once at startup, after `dotenv` has loaded any `.env` file.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::data::FetchSettings;
use crate::error::{AttesterError, Result};
use crate::network::EngineAddress;

pub const DEFAULT_ENGINE: &str = "127.0.0.1:8520";

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub engine: EngineAddress,
    pub page_size: usize,
    pub poll_interval: Duration,
    pub attest_timeout: Duration,
    /// Results fetched per element
    pub results_limit: usize,
    pub request_timeout: Duration,
    pub preferences_path: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine: EngineAddress::default(),
            page_size: 10,
            poll_interval: Duration::from_secs(30),
            attest_timeout: Duration::from_secs(60),
            results_limit: 20,
            request_timeout: Duration::from_secs(15),
            preferences_path: PathBuf::from("attester_preferences.json"),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup; unset keys keep
    /// their defaults, malformed ones are rejected.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let engine = match lookup("ATTESTER_ENGINE") {
            Some(raw) => EngineAddress::parse(&raw)?,
            None => defaults.engine,
        };

        Ok(Self {
            engine,
            page_size: positive(&lookup, "ATTESTER_PAGE_SIZE", defaults.page_size)?,
            poll_interval: seconds(&lookup, "ATTESTER_POLL_SECS", defaults.poll_interval)?,
            attest_timeout: seconds(
                &lookup,
                "ATTESTER_ATTEST_TIMEOUT_SECS",
                defaults.attest_timeout,
            )?,
            results_limit: positive(&lookup, "ATTESTER_RESULTS_LIMIT", defaults.results_limit)?,
            request_timeout: seconds(
                &lookup,
                "ATTESTER_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout,
            )?,
            preferences_path: lookup("ATTESTER_PREFERENCES")
                .map(PathBuf::from)
                .unwrap_or(defaults.preferences_path),
        })
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            page_size: self.page_size,
            poll_interval: self.poll_interval,
        }
    }
}

fn positive<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr + PartialEq + Default,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    match raw.trim().parse::<T>() {
        Ok(value) if value != T::default() => Ok(value),
        _ => Err(AttesterError::ConfigurationInvalid(format!("{}={}", key, raw))),
    }
}

fn seconds(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Result<Duration> {
    positive(lookup, key, default.as_secs()).map(Duration::from_secs)
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
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.engine.to_string(), DEFAULT_ENGINE);
        assert_eq!(config.fetch_settings().page_size, 10);
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("ATTESTER_ENGINE", "http://10.0.0.9:9000/"),
            ("ATTESTER_PAGE_SIZE", "25"),
            ("ATTESTER_POLL_SECS", "5"),
            ("ATTESTER_PREFERENCES", "/tmp/prefs.json"),
        ]))
        .unwrap();

        assert_eq!(config.engine.to_string(), "10.0.0.9:9000");
        assert_eq!(config.page_size, 25);
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.attest_timeout, Duration::from_secs(60));
        assert_eq!(config.preferences_path, PathBuf::from("/tmp/prefs.json"));
    }

    #[test]
    fn test_malformed_values_rejected() {
        for (key, value) in [
            ("ATTESTER_PAGE_SIZE", "ten"),
            ("ATTESTER_PAGE_SIZE", "0"),
            ("ATTESTER_POLL_SECS", "-1"),
            ("ATTESTER_ENGINE", "not an address"),
        ] {
            let err = AppConfig::from_lookup(lookup(&[(key, value)])).unwrap_err();
            assert!(matches!(err, AttesterError::ConfigurationInvalid(_)), "{key}={value}");
        }
    }
}
