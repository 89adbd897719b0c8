//! In-memory engine doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::json;
use tokio::sync::Notify;

use attestation_monitor::model::{Claim, Element, ElementResult, Policy, Rule};
use attestation_monitor::network::{AttestationReceipt, ElementPage, EngineConnector};
use attestation_monitor::{AttesterError, EngineAddress, RemoteEngineClient, Result};

/// Engine double serving a fixed element list. Calls are counted, and with
/// `hold` set every listing/attest call parks until `release` is called.
pub struct MockEngine {
    elements: Vec<Element>,
    pub list_calls: AtomicUsize,
    pub attest_calls: AtomicUsize,
    pub policy_calls: AtomicUsize,
    pub fail: AtomicBool,
    hold: AtomicBool,
    gate: Notify,
}

impl MockEngine {
    pub fn new(elements: Vec<Element>) -> Arc<Self> {
        Arc::new(Self {
            elements,
            list_calls: AtomicUsize::new(0),
            attest_calls: AtomicUsize::new(0),
            policy_calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            hold: AtomicBool::new(false),
            gate: Notify::new(),
        })
    }

    /// `count` plain elements named `{prefix}-{n}`
    pub fn with_ids(prefix: &str, count: usize) -> Arc<Self> {
        Self::new(
            (0..count)
                .map(|n| {
                    let id = format!("{prefix}-{n}");
                    let name = format!("{prefix} node {n}");
                    Element::new(id, name, "tcp://10.0.0.1", "A10HTTPRESTv2")
                })
                .collect(),
        )
    }

    pub fn hold(&self) {
        self.hold.store(true, Ordering::SeqCst);
    }

    /// Lets one parked call through and stops holding new ones.
    pub fn release(&self) {
        self.hold.store(false, Ordering::SeqCst);
        self.gate.notify_one();
    }

    pub fn lists(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn attests(&self) -> usize {
        self.attest_calls.load(Ordering::SeqCst)
    }

    async fn wait_if_held(&self) {
        if self.hold.load(Ordering::SeqCst) {
            self.gate.notified().await;
        }
    }

    fn check_failure(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AttesterError::Network("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteEngineClient for MockEngine {
    async fn list_elements(&self, offset: usize, limit: usize) -> Result<ElementPage> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.wait_if_held().await;
        self.check_failure()?;
        let elements: Vec<Element> =
            self.elements.iter().skip(offset).take(limit).cloned().collect();
        Ok(ElementPage {
            has_more: offset + limit < self.elements.len(),
            elements,
        })
    }

    async fn get_element(&self, id: &str) -> Result<Element> {
        self.check_failure()?;
        self.elements
            .iter()
            .find(|e| e.itemid == id)
            .cloned()
            .ok_or_else(|| AttesterError::not_found("element", id))
    }

    async fn list_policies(&self) -> Result<Vec<Policy>> {
        self.policy_calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![Policy {
            itemid: "pol-1".into(),
            name: "tpm2 quote".into(),
            intent: Some("tpm2/quote".into()),
            parameters: json!({"pcrSelection": "0,1,2"}),
            description: None,
        }])
    }

    async fn list_rules(&self) -> Result<Vec<Rule>> {
        Ok(vec![Rule {
            name: "tpm2rules/TPM2QuoteCheck".into(),
            description: Some("Checks the quote".into()),
            parameters: json!({}),
        }])
    }

    async fn attest(
        &self,
        element_id: &str,
        policy_id: &str,
        rule_id: Option<&str>,
    ) -> Result<AttestationReceipt> {
        self.attest_calls.fetch_add(1, Ordering::SeqCst);
        self.wait_if_held().await;
        self.check_failure()?;
        Ok(AttestationReceipt {
            session_id: "sess-1".into(),
            claim_id: format!("claim-{element_id}-{policy_id}"),
            result_id: rule_id.map(|_| "res-1".to_string()),
        })
    }

    /// Claims exist for every id this engine handed out in a receipt.
    async fn get_claim(&self, claim_id: &str) -> Result<Claim> {
        self.check_failure()?;
        let Some(element_id) = claim_id.strip_prefix("claim-") else {
            return Err(AttesterError::not_found("claim", claim_id));
        };
        let claim = json!({
            "itemid": claim_id,
            "header": {
                "as_requested": "1650000000",
                "as_received": "1650000002",
                "element": {"itemid": element_id, "name": "edge"},
                "policy": {"itemid": "pol-1", "name": "tpm2 quote"}
            },
            "payload": {
                "header": {},
                "footer": {},
                "payload": {"pcrs": {"sha256": {"0": "00ab", "7": "77cd"}}}
            }
        });
        serde_json::from_value(claim).map_err(AttesterError::from)
    }
}

/// Hands out a registered `MockEngine` per address.
#[derive(Default)]
pub struct MockConnector {
    engines: Mutex<HashMap<String, Arc<MockEngine>>>,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, address: &str, engine: Arc<MockEngine>) {
        self.engines.lock().unwrap().insert(address.to_string(), engine);
    }
}

impl EngineConnector for MockConnector {
    fn connect(&self, address: &EngineAddress) -> Result<Arc<dyn RemoteEngineClient>> {
        let engines = self.engines.lock().unwrap();
        match engines.get(&address.to_string()) {
            Some(engine) => Ok(engine.clone()),
            None => Err(AttesterError::Network(format!("no engine at {address}"))),
        }
    }
}

/// Element carrying results `(id, code, hours ago)`
pub fn element_with_results(id: &str, results: &[(&str, i64, i64)]) -> Element {
    let now = Utc::now();
    Element::new(id, id, "tcp://10.0.0.1", "A10HTTPRESTv2").with_results(
        results
            .iter()
            .map(|(rid, code, hours)| {
                ElementResult::new(*rid, id, *code, now - Duration::hours(*hours))
            })
            .collect(),
    )
}
