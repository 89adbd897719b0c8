//! Error taxonomy shared by the engine client, the sync engine and the
//! attestation session.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AttesterError {
    /// Engine unreachable or the transport failed mid-request
    #[error("network failure: {0}")]
    Network(String),

    /// Engine answered with a non-success status
    #[error("engine returned {status}: {message}")]
    Engine { status: u16, message: String },

    /// Malformed or missing fields in an engine payload
    #[error("malformed payload: {0}")]
    Decode(String),

    /// Same kind of request already outstanding
    #[error("duplicate request: {0}")]
    DuplicateRequest(&'static str),

    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(String),

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    #[error("attestation timed out after {0:?}")]
    Timeout(Duration),

    /// The request was superseded by a reset or an engine switch
    #[error("request cancelled: {0}")]
    Cancelled(&'static str),

    #[error("preferences storage failed: {0}")]
    Storage(String),
}

impl AttesterError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { kind, id: id.into() }
    }

    /// Network and engine failures are retried by the poll loop or the user.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Engine { .. } | Self::Timeout(_))
    }
}

impl From<reqwest::Error> for AttesterError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<std::io::Error> for AttesterError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for AttesterError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AttesterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(AttesterError::Network("refused".into()).is_transient());
        assert!(AttesterError::Engine { status: 500, message: "boom".into() }.is_transient());
        assert!(!AttesterError::DuplicateRequest("attest").is_transient());
        assert!(!AttesterError::ConfigurationInvalid("x".into()).is_transient());
    }

    #[test]
    fn test_display_includes_engine_message() {
        let err = AttesterError::Engine { status: 404, message: "no such element".into() };
        assert_eq!(err.to_string(), "engine returned 404: no such element");
        assert_eq!(
            AttesterError::not_found("element", "e1").to_string(),
            "element 'e1' not found"
        );
    }
}
