//! Network Module
//!
//! Engine addressing, the remote engine client seam and the loading-state
//! wrapper handed to observers.

pub mod address;
pub mod client;
pub mod response;

pub use address::EngineAddress;
pub use client::{
    AttestationReceipt, ElementPage, EngineConnector, HttpConnector, HttpEngineClient,
    RemoteEngineClient,
};
pub use response::{Response, Status};
