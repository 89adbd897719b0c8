//! Attestation Monitor
//!
//! Client-side core for monitoring a fleet of remote-attestable devices
//! ("elements") exposed by a remote attestation engine:
//! - Paged element sync into a local cache with single-flight fetches
//! - Background poll loop with immediate stop
//! - Composable keyword filters over the cached view
//! - Time-windowed pass/fail overview for the dashboard
//! - Attestation request state machine with bounded requests

pub mod attestation;
pub mod config;
pub mod data;
pub mod error;
pub mod model;
pub mod monitor;
pub mod network;
pub mod utils;

// Re-exports for convenience
pub use attestation::{AttestationSession, AttestationState};
pub use data::{DataFilter, FetchCoordinator, MatchType};
pub use error::{AttesterError, Result};
pub use monitor::AttestationMonitor;
pub use network::{EngineAddress, RemoteEngineClient, Response};
