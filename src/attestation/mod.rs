//! Attestation Module

pub mod session;

pub use session::{AttestRequest, AttestationSession, AttestationState};
