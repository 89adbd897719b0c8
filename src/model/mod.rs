//! Model Module
//!
//! Data shapes exchanged with the attestation engine.

pub mod claim;
pub mod element;
pub mod policy;

pub use claim::{Claim, NamedRef, Payload, Pcr, Quote};
pub use element::{Element, ElementResult, GeoPoint, CODE_RESULT_OK};
pub use policy::{Policy, Rule};
