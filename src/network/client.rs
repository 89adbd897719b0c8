//! Remote engine client
//!
//! `RemoteEngineClient` is the narrow seam between the sync engine and the
//! attestation engine. `HttpEngineClient` talks to the engine's REST v2 API.

use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::try_join_all;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::address::EngineAddress;
use crate::error::{AttesterError, Result};
use crate::model::{Claim, Element, ElementResult, Policy, Rule};

/// One page of the engine's element listing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementPage {
    pub elements: Vec<Element>,
    pub has_more: bool,
}

/// Handle to the evidence produced by an accepted attestation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationReceipt {
    pub session_id: String,
    pub claim_id: String,
    pub result_id: Option<String>,
}

#[async_trait]
pub trait RemoteEngineClient: Send + Sync {
    async fn list_elements(&self, offset: usize, limit: usize) -> Result<ElementPage>;

    async fn get_element(&self, id: &str) -> Result<Element>;

    async fn list_policies(&self) -> Result<Vec<Policy>>;

    async fn list_rules(&self) -> Result<Vec<Rule>>;

    async fn attest(
        &self,
        element_id: &str,
        policy_id: &str,
        rule_id: Option<&str>,
    ) -> Result<AttestationReceipt>;

    async fn get_claim(&self, claim_id: &str) -> Result<Claim> {
        Err(AttesterError::not_found("claim", claim_id))
    }
}

/// Builds a client for an engine address
pub trait EngineConnector: Send + Sync {
    fn connect(&self, address: &EngineAddress) -> Result<Arc<dyn RemoteEngineClient>>;
}

/// Connector producing [`HttpEngineClient`]s
#[derive(Debug, Clone)]
pub struct HttpConnector {
    request_timeout: Duration,
    results_limit: usize,
}

impl HttpConnector {
    pub fn new(request_timeout: Duration, results_limit: usize) -> Self {
        Self { request_timeout, results_limit }
    }
}

impl EngineConnector for HttpConnector {
    fn connect(&self, address: &EngineAddress) -> Result<Arc<dyn RemoteEngineClient>> {
        let client = HttpEngineClient::new(address, self.request_timeout, self.results_limit)?;
        Ok(Arc::new(client))
    }
}

#[derive(Deserialize)]
struct IdList {
    #[serde(default)]
    elements: Vec<String>,
    #[serde(default)]
    policies: Vec<String>,
}

#[derive(Deserialize)]
struct ResultList {
    #[serde(default)]
    results: Vec<ElementResult>,
}

pub struct HttpEngineClient {
    client: Client,
    base_url: String,
    results_limit: usize,
}

impl HttpEngineClient {
    pub fn new(
        address: &EngineAddress,
        request_timeout: Duration,
        results_limit: usize,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("attestation_monitor/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: format!("{}v2", address.base_url()),
            results_limit,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, format!("{}/{}", self.base_url, path))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            return Err(engine_error(status, &body));
        }
        Ok(serde_json::from_slice(&body)?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        debug!("GET {}/{}", self.base_url, path);
        self.send(self.request(Method::GET, path)).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T> {
        debug!("POST {}/{}", self.base_url, path);
        self.send(self.request(Method::POST, path).json(body)).await
    }

    async fn latest_results(&self, element_id: &str) -> Result<Vec<ElementResult>> {
        let path = format!(
            "results/element/latest/{}?timestamp=0&limit={}",
            urlencoding::encode(element_id),
            self.results_limit
        );
        let list: ResultList = self.get(&path).await?;
        Ok(list.results)
    }

    async fn get_policy(&self, id: &str) -> Result<Policy> {
        self.get(&format!("policy/{}", urlencoding::encode(id))).await
    }

    async fn close_session(&self, session_id: &str) {
        let path = format!("session/{}", urlencoding::encode(session_id));
        let outcome = self.request(Method::DELETE, &path).send().await;
        if let Err(e) = outcome.and_then(|r| r.error_for_status()) {
            warn!("Failed to close engine session {}: {}", session_id, e);
        }
    }
}

fn engine_error(status: StatusCode, body: &[u8]) -> AttesterError {
    let message = serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| v.get("msg").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unexpected response")
                .to_string()
        });
    AttesterError::Engine { status: status.as_u16(), message }
}

/// Indices of an id listing covered by a page, and whether ids remain past it.
fn page_window(total: usize, offset: usize, limit: usize) -> (Range<usize>, bool) {
    let end = offset.saturating_add(limit);
    (offset.min(total)..end.min(total), end < total)
}

fn id_field(value: &Value, field: &str) -> Result<String> {
    value
        .get(field)
        .and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .ok_or_else(|| AttesterError::Decode(format!("response is missing '{}'", field)))
}

#[async_trait]
impl RemoteEngineClient for HttpEngineClient {
    async fn list_elements(&self, offset: usize, limit: usize) -> Result<ElementPage> {
        let ids: IdList = self.get("elements").await?;
        let (window, has_more) = page_window(ids.elements.len(), offset, limit);

        let fetches = ids.elements[window].iter().map(|id| self.get_element(id));
        let elements = try_join_all(fetches).await?;
        Ok(ElementPage { elements, has_more })
    }

    async fn get_element(&self, id: &str) -> Result<Element> {
        let element: Element = self.get(&format!("element/{}", urlencoding::encode(id))).await?;
        let results = self.latest_results(id).await?;
        Ok(element.with_results(results))
    }

    async fn list_policies(&self) -> Result<Vec<Policy>> {
        let ids: IdList = self.get("policies").await?;
        try_join_all(ids.policies.iter().map(|id| self.get_policy(id))).await
    }

    async fn list_rules(&self) -> Result<Vec<Rule>> {
        self.get("rules").await
    }

    async fn attest(
        &self,
        element_id: &str,
        policy_id: &str,
        rule_id: Option<&str>,
    ) -> Result<AttestationReceipt> {
        let opened: Value = self.post("sessions/open", &json!({})).await?;
        let session_id = id_field(&opened, "itemid")?;

        let outcome = async {
            let attested: Value = self
                .post(
                    "attest",
                    &json!({ "eid": element_id, "pid": policy_id, "cps": {}, "sid": session_id }),
                )
                .await?;
            let claim_id = id_field(&attested, "claim")?;

            let result_id = match rule_id {
                Some(rule) => {
                    let verified: Value = self
                        .post(
                            "verify",
                            &json!({ "cid": claim_id, "rule": rule, "sid": session_id }),
                        )
                        .await?;
                    Some(id_field(&verified, "result")?)
                }
                None => None,
            };
            Ok::<_, AttesterError>((claim_id, result_id))
        }
        .await;

        self.close_session(&session_id).await;

        let (claim_id, result_id) = outcome?;
        Ok(AttestationReceipt { session_id, claim_id, result_id })
    }

    async fn get_claim(&self, claim_id: &str) -> Result<Claim> {
        #[derive(Deserialize)]
        struct Wrapped {
            claim: Claim,
        }
        let path = format!("claim/{}", urlencoding::encode(claim_id));
        let wrapped: Wrapped = self.get(&path).await?;
        Ok(wrapped.claim)
    }
}
