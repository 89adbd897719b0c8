//! Attestation Monitor
//!
//! The operator-facing facade. Wires one `FetchCoordinator` and one
//! `AttestationSession` to the current engine and keeps them on the same
//! engine when it changes.
//!
//! Switches are serialized by `switch_lock`; reads are not. A reader racing
//! a switch may observe the element cache already cleared while the policy
//! cache is not yet, but never data from two engines merged into one view:
//! both caches are emptied before the new engine's first response can land.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tracing::info;

use crate::attestation::AttestationSession;
use crate::config::AppConfig;
use crate::data::{Dashboard, DataFilter, FetchCoordinator, FetchSettings, Observable};
use crate::error::Result;
use crate::model::{Claim, Element, ElementResult, Policy};
use crate::network::{EngineAddress, EngineConnector, HttpConnector};

pub struct AttestationMonitor {
    connector: Arc<dyn EngineConnector>,
    coordinator: FetchCoordinator,
    session: AttestationSession,
    current: Observable<EngineAddress>,
    switch_lock: Mutex<()>,
}

impl AttestationMonitor {
    pub fn new(
        connector: Arc<dyn EngineConnector>,
        address: EngineAddress,
        settings: FetchSettings,
        attest_timeout: Duration,
    ) -> Result<Self> {
        let client = connector.connect(&address)?;
        Ok(Self {
            coordinator: FetchCoordinator::new(client.clone(), settings),
            session: AttestationSession::new(client, attest_timeout),
            current: Observable::new(address),
            switch_lock: Mutex::new(()),
            connector,
        })
    }

    /// Monitor talking HTTP to `address`, tuned by `config`.
    pub fn from_config(config: &AppConfig, address: EngineAddress) -> Result<Self> {
        let connector = HttpConnector::new(config.request_timeout, config.results_limit);
        Self::new(Arc::new(connector), address, config.fetch_settings(), config.attest_timeout)
    }

    pub fn coordinator(&self) -> &FetchCoordinator {
        &self.coordinator
    }

    pub fn session(&self) -> &AttestationSession {
        &self.session
    }

    pub fn current_address(&self) -> watch::Receiver<EngineAddress> {
        self.current.subscribe()
    }

    pub fn current_engine(&self) -> EngineAddress {
        self.current.get()
    }

    /// Points everything at a new engine.
    ///
    /// The address is validated first; a malformed one is rejected with
    /// nothing changed. Otherwise the element cache, the pagination cursor
    /// and the policy/rule caches are invalidated together and the first
    /// page of the new engine is loaded.
    ///
    /// Concurrent switches apply one at a time. Readers do not take the
    /// switch lock, so between the two cache invalidations they can see one
    /// cache cleared and the other still holding the previous engine's data.
    pub async fn switch_base_url(&self, raw: &str) -> Result<()> {
        let address = EngineAddress::parse(raw)?;
        let client = self.connector.connect(&address)?;

        let _switching = self.switch_lock.lock().await;
        let label = address.to_string();
        self.coordinator.switch_engine(client.clone(), &label);
        self.session.switch_engine(client);
        self.current.set(address);
        info!("Switched engine to {}", label);

        self.coordinator.refresh(true).await
    }

    pub fn element_from_cache(&self, id: &str) -> Option<Element> {
        self.coordinator.get_element(id)
    }

    pub fn apply_filter(&self, filter: Option<DataFilter>) {
        self.coordinator.apply_filters(filter.into_iter().collect());
    }

    pub fn apply_filters(&self, filters: Vec<DataFilter>) {
        self.coordinator.apply_filters(filters);
    }

    pub async fn get_more_elements(&self) -> Result<()> {
        self.coordinator.fetch_next_batch().await
    }

    pub async fn refresh_elements(&self) -> Result<()> {
        self.coordinator.refresh(false).await
    }

    pub async fn refresh_element(&self, id: &str) -> Result<Element> {
        self.coordinator.refresh_single_value(id).await
    }

    pub fn start_element_fetch_loop(&self) {
        self.coordinator.start_poll_loop();
    }

    pub fn stop_element_fetch_loop(&self) {
        self.coordinator.stop_poll_loop();
    }

    pub fn find_element_result(&self, result_id: &str) -> Option<ElementResult> {
        self.coordinator.find_result(result_id)
    }

    pub fn policy_from_cache(&self, id: &str) -> Option<Policy> {
        self.session.policy_from_cache(id)
    }

    pub async fn claim(&self, claim_id: &str) -> Result<Claim> {
        self.session.claim(claim_id).await
    }

    pub fn latest_results(&self, hours_since: Option<u32>) -> Vec<ElementResult> {
        self.coordinator.overview(hours_since)
    }

    pub fn dashboard(&self) -> Dashboard {
        self.coordinator.dashboard()
    }
}
