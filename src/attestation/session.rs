//! Attestation Session
//!
//! Submits attestation requests for one element at a time and tracks their
//! lifecycle: `Idle -> Loading -> {Success, Error}`, back to `Idle` through
//! `reset`. Also caches the engine's policies and rules for the picker.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::data::Observable;
use crate::error::{AttesterError, Result};
use crate::model::{Claim, Policy, Rule};
use crate::network::{AttestationReceipt, RemoteEngineClient};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum AttestationState {
    Idle,
    Loading,
    /// Request accepted by the engine, evidence retrievable
    Success(AttestationReceipt),
    Error(String),
}

impl AttestationState {
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Error(message) => Some(message),
            _ => None,
        }
    }
}

/// The element/policy/rule triple of the last submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttestRequest {
    pub element_id: String,
    pub policy_id: String,
    pub rule_id: Option<String>,
}

struct SessionCore {
    client: Arc<dyn RemoteEngineClient>,
    /// Bumped on hard reset so catalog fetches from a previous engine are dropped
    generation: u64,
    request: Option<Uuid>,
    selection: Option<AttestRequest>,
    policies: Option<Vec<Policy>>,
    rules: Option<Vec<Rule>>,
}

pub struct AttestationSession {
    core: Mutex<SessionCore>,
    state: Observable<AttestationState>,
    catalog: tokio::sync::Mutex<()>,
    attest_timeout: Duration,
}

/// Moves the session to `Error` if an attest future is dropped mid-request.
struct RequestGuard<'a> {
    session: &'a AttestationSession,
    ticket: Uuid,
    armed: bool,
}

impl RequestGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for RequestGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut core = self.session.lock_core();
        if core.request == Some(self.ticket) {
            core.request = None;
            warn!("Attestation request {} abandoned before completion", self.ticket);
            self.session
                .state
                .set(AttestationState::Error("attestation request abandoned".to_string()));
        }
    }
}

impl AttestationSession {
    pub fn new(client: Arc<dyn RemoteEngineClient>, attest_timeout: Duration) -> Self {
        Self {
            core: Mutex::new(SessionCore {
                client,
                generation: 0,
                request: None,
                selection: None,
                policies: None,
                rules: None,
            }),
            state: Observable::new(AttestationState::Idle),
            catalog: tokio::sync::Mutex::new(()),
            attest_timeout,
        }
    }

    fn lock_core(&self) -> MutexGuard<'_, SessionCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> AttestationState {
        self.state.get()
    }

    pub fn subscribe(&self) -> watch::Receiver<AttestationState> {
        self.state.subscribe()
    }

    pub fn selection(&self) -> Option<AttestRequest> {
        self.lock_core().selection.clone()
    }

    /// Submits an attestation request.
    ///
    /// Rejected with `DuplicateRequest` while another one is loading and
    /// with `InvalidState` after a success until `reset` is called. The
    /// request is bounded by the configured timeout.
    pub async fn attest(
        &self,
        element_id: &str,
        policy_id: &str,
        rule_id: Option<&str>,
    ) -> Result<AttestationReceipt> {
        let (ticket, client) = self.begin(AttestRequest {
            element_id: element_id.to_string(),
            policy_id: policy_id.to_string(),
            rule_id: rule_id.map(str::to_string),
        })?;

        let guard = RequestGuard { session: self, ticket, armed: true };
        let outcome = tokio::time::timeout(
            self.attest_timeout,
            client.attest(element_id, policy_id, rule_id),
        )
        .await
        .unwrap_or(Err(AttesterError::Timeout(self.attest_timeout)));
        guard.disarm();

        self.complete(ticket, outcome)
    }

    fn begin(&self, request: AttestRequest) -> Result<(Uuid, Arc<dyn RemoteEngineClient>)> {
        let mut core = self.lock_core();
        match self.state.get() {
            AttestationState::Loading => {
                debug!("Attestation already in flight, rejecting {:?}", request);
                return Err(AttesterError::DuplicateRequest("attestation already in flight"));
            }
            AttestationState::Success(_) => {
                let reason = "attestation already succeeded, reset first";
                return Err(AttesterError::InvalidState(reason));
            }
            AttestationState::Idle | AttestationState::Error(_) => {}
        }

        let ticket = Uuid::new_v4();
        info!(
            "Attesting element {} against policy {} (request {})",
            request.element_id, request.policy_id, ticket
        );
        core.request = Some(ticket);
        core.selection = Some(request);
        self.state.set(AttestationState::Loading);
        Ok((ticket, core.client.clone()))
    }

    fn complete(
        &self,
        ticket: Uuid,
        outcome: Result<AttestationReceipt>,
    ) -> Result<AttestationReceipt> {
        let mut core = self.lock_core();
        if core.request != Some(ticket) {
            debug!("Discarding response of reset attestation request {}", ticket);
            return Err(AttesterError::Cancelled("attestation was reset while in flight"));
        }
        core.request = None;

        match outcome {
            Ok(receipt) => {
                info!("Attestation accepted, claim {}", receipt.claim_id);
                self.state.set(AttestationState::Success(receipt.clone()));
                Ok(receipt)
            }
            Err(e) => {
                warn!("Attestation failed: {}", e);
                self.state.set(AttestationState::Error(e.to_string()));
                Err(e)
            }
        }
    }

    /// Re-submits the last selection after a failure.
    pub async fn retry(&self) -> Result<AttestationReceipt> {
        let selection = {
            let core = self.lock_core();
            if self.state.get().error_message().is_none() {
                return Err(AttesterError::InvalidState("only a failed attestation can be retried"));
            }
            core.selection.clone()
        };
        let Some(request) = selection else {
            return Err(AttesterError::InvalidState("no attestation to retry"));
        };
        self.attest(&request.element_id, &request.policy_id, request.rule_id.as_deref())
            .await
    }

    /// Back to `Idle` from any state; a response still in flight is ignored
    /// when it arrives. A hard reset also drops the policy and rule caches
    /// and the selection.
    pub fn reset(&self, hard: bool) {
        let mut core = self.lock_core();
        Self::reset_locked(&mut core, hard);
        self.state.set(AttestationState::Idle);
    }

    fn reset_locked(core: &mut SessionCore, hard: bool) {
        core.request = None;
        if hard {
            core.generation += 1;
            core.policies = None;
            core.rules = None;
            core.selection = None;
        }
    }

    /// Targets a new engine. Equivalent to a hard reset.
    pub fn switch_engine(&self, client: Arc<dyn RemoteEngineClient>) {
        let mut core = self.lock_core();
        core.client = client;
        Self::reset_locked(&mut core, true);
        self.state.set(AttestationState::Idle);
    }

    /// Fetched on first use, then served from cache until a hard reset.
    pub async fn policies(&self) -> Result<Vec<Policy>> {
        let cached = self.lock_core().policies.clone();
        if let Some(policies) = cached {
            return Ok(policies);
        }

        let _fetching = self.catalog.lock().await;
        let (generation, client) = {
            let core = self.lock_core();
            if let Some(policies) = &core.policies {
                return Ok(policies.clone());
            }
            (core.generation, core.client.clone())
        };

        let policies = client.list_policies().await?;
        let mut core = self.lock_core();
        if core.generation != generation {
            return Err(AttesterError::Cancelled("engine switched while fetching policies"));
        }
        debug!("Cached {} policies", policies.len());
        core.policies = Some(policies.clone());
        Ok(policies)
    }

    pub async fn rules(&self) -> Result<Vec<Rule>> {
        let cached = self.lock_core().rules.clone();
        if let Some(rules) = cached {
            return Ok(rules);
        }

        let _fetching = self.catalog.lock().await;
        let (generation, client) = {
            let core = self.lock_core();
            if let Some(rules) = &core.rules {
                return Ok(rules.clone());
            }
            (core.generation, core.client.clone())
        };

        let rules = client.list_rules().await?;
        let mut core = self.lock_core();
        if core.generation != generation {
            return Err(AttesterError::Cancelled("engine switched while fetching rules"));
        }
        debug!("Cached {} rules", rules.len());
        core.rules = Some(rules.clone());
        Ok(rules)
    }

    /// Evidence behind a receipt, fetched from the current engine.
    pub async fn claim(&self, claim_id: &str) -> Result<Claim> {
        let client = self.lock_core().client.clone();
        client.get_claim(claim_id).await
    }

    /// Cache lookup only; `None` until policies were fetched.
    pub fn policy_from_cache(&self, id: &str) -> Option<Policy> {
        let core = self.lock_core();
        core.policies.as_ref()?.iter().find(|p| p.itemid == id).cloned()
    }

    /// First cached policy with this display name.
    pub fn policy_by_name(&self, name: &str) -> Option<Policy> {
        let core = self.lock_core();
        core.policies.as_ref()?.iter().find(|p| p.name == name).cloned()
    }

    pub fn rule_from_cache(&self, name: &str) -> Option<Rule> {
        let core = self.lock_core();
        core.rules.as_ref()?.iter().find(|r| r.id() == name).cloned()
    }
}
