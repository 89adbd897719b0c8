//! Attestation evidence (claims)
//!
//! Claims are deeply nested, engine- and device-specific JSON documents. The
//! accessors below pull out the handful of structures the monitor displays and
//! return `None` whenever a piece is missing or has an unexpected shape. A
//! malformed sub-structure is indistinguishable from an absent one; the
//! decoder only leaves a `debug!` trace behind.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::element::epoch_seconds;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub itemid: String,
    #[serde(default)]
    pub header: Value,
    pub payload: Payload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default)]
    pub footer: Value,
    #[serde(default)]
    pub header: Value,
    #[serde(default)]
    pub payload: Value,
}

/// A TPM quote extracted from the claim payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub digest: String,
    pub clock: String,
    pub reset: String,
    pub restart: String,
    pub safe: String,
    pub firmware_version: String,
    pub extra: String,
    pub magic: String,
    pub kind: String,
    pub signer: String,
}

/// One PCR bank: hash algorithm key and register index -> value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pcr {
    pub key: String,
    pub values: BTreeMap<String, String>,
}

/// Identifier and display name pair embedded in a claim header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedRef {
    pub itemid: String,
    pub name: String,
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn text_at(root: &Value, pointer: &str) -> Option<String> {
    root.pointer(pointer).and_then(text)
}

impl Claim {
    /// (time requested, time received) as recorded by the engine
    pub fn timestamps(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        let parse = |key: &str| {
            let raw = text_at(&self.header, key)?;
            match raw.trim().parse::<f64>() {
                Ok(secs) => epoch_seconds::from_secs_f64(secs),
                Err(e) => {
                    debug!("claim {}: bad timestamp at {}: {}", self.itemid, key, e);
                    None
                }
            }
        };
        (parse("/as_requested"), parse("/as_received"))
    }

    pub fn element_data(&self) -> Option<NamedRef> {
        self.named_ref("/element")
    }

    pub fn policy_data(&self) -> Option<NamedRef> {
        self.named_ref("/policy")
    }

    fn named_ref(&self, pointer: &str) -> Option<NamedRef> {
        let node = self.header.pointer(pointer);
        let decoded = node.and_then(|n| {
            Some(NamedRef {
                itemid: text_at(n, "/itemid")?,
                name: text_at(n, "/name")?,
            })
        });
        if decoded.is_none() {
            debug!("claim {}: no usable {} reference", self.itemid, pointer);
        }
        decoded
    }

    pub fn quote(&self) -> Option<Quote> {
        self.payload.quote()
    }

    pub fn pcrs(&self) -> Option<Vec<Pcr>> {
        self.payload.pcrs()
    }
}

impl Payload {
    pub fn quote(&self) -> Option<Quote> {
        let quote = self.payload.get("quote")?;
        let decoded = (|| {
            Some(Quote {
                digest: text_at(quote, "/attested/quote/pcrDigest")?,
                clock: text_at(quote, "/clockInfo/clock")?,
                reset: text_at(quote, "/clockInfo/resetCount")?,
                restart: text_at(quote, "/clockInfo/restartCount")?,
                safe: text_at(quote, "/clockInfo/safe")?,
                firmware_version: text_at(quote, "/firmwareVersion")?,
                extra: quote.get("extraData")?.to_string(),
                magic: text_at(quote, "/magic")?,
                kind: text_at(quote, "/type")?,
                signer: text_at(quote, "/qualifiedSigner")?,
            })
        })();
        if decoded.is_none() {
            debug!("quote present but malformed");
        }
        decoded
    }

    pub fn pcrs(&self) -> Option<Vec<Pcr>> {
        let banks = self.payload.get("pcrs")?;
        let decoded = banks.as_object().and_then(|banks| {
            banks
                .iter()
                .map(|(key, bank)| {
                    let values = bank
                        .as_object()?
                        .iter()
                        .map(|(index, v)| Some((index.clone(), text(v)?)))
                        .collect::<Option<BTreeMap<_, _>>>()?;
                    Some(Pcr { key: key.clone(), values })
                })
                .collect::<Option<Vec<_>>>()
        });
        if decoded.is_none() {
            debug!("pcrs present but malformed");
        }
        decoded
    }
}
