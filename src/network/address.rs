//! Engine address parsing
//!
//! Operators type addresses as `host:port`; older preference files stored
//! the full `http://host:port/` form. Both are accepted.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AttesterError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EngineAddress {
    host: String,
    port: u16,
}

fn address_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?:https?://)?([A-Za-z0-9](?:[A-Za-z0-9.-]*[A-Za-z0-9])?):([0-9]{1,5})/?$")
            .unwrap_or_else(|e| unreachable!("static address pattern is valid: {e}"))
    })
}

impl EngineAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self> {
        let host = host.into();
        Self::parse(&format!("{}:{}", host, port))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let invalid =
            || AttesterError::ConfigurationInvalid(format!("engine address '{}'", trimmed));

        let caps = address_pattern().captures(trimmed).ok_or_else(invalid)?;
        let host = caps[1].to_string();
        let port: u16 = caps[2].parse().map_err(|_| invalid())?;
        if port == 0 || host.contains("..") {
            return Err(invalid());
        }
        Ok(Self { host, port })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `http://host:port/`
    pub fn base_url(&self) -> String {
        format!("http://{}:{}/", self.host, self.port)
    }
}

impl fmt::Display for EngineAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl Default for EngineAddress {
    /// Local engine on its standard port
    fn default() -> Self {
        Self { host: "127.0.0.1".to_string(), port: 8520 }
    }
}

impl FromStr for EngineAddress {
    type Err = AttesterError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_both_forms() {
        let plain = EngineAddress::parse("192.168.1.20:8520").unwrap();
        let url = EngineAddress::parse("http://192.168.1.20:8520/").unwrap();
        assert_eq!(plain, url);
        assert_eq!(plain.to_string(), "192.168.1.20:8520");
        assert_eq!(plain.base_url(), "http://192.168.1.20:8520/");

        let named: EngineAddress = "engine.lab.local:80".parse().unwrap();
        assert_eq!(named.host(), "engine.lab.local");
        assert_eq!(named.port(), 80);
    }

    #[test]
    fn test_rejects_malformed() {
        let malformed = [
            "", "localhost", ":8520", "host:", "host:0", "host:70000", "ho st:80", "a..b:80",
            "host:80/v2",
        ];
        for raw in malformed {
            let err = EngineAddress::parse(raw).unwrap_err();
            assert!(
                matches!(err, AttesterError::ConfigurationInvalid(_)),
                "{raw:?} should be rejected"
            );
        }
    }
}
