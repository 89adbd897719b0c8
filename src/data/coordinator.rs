//! Fetch Coordinator
//!
//! Owns the element cache, the pagination cursor and the background poll
//! loop, and publishes the filtered element view to observers.
//!
//! All cache state lives in one `SyncState` behind a single mutex. Network
//! calls happen outside the lock; each bulk fetch carries a ticket, and its
//! result is only merged if that ticket is still the one recorded as in
//! flight (and, for pages, if no refresh reset the cursor meanwhile). This
//! gives single-flight per fetch kind and makes late results from a
//! superseded refresh or a previous engine harmless.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::cache::{ElementCache, MergeMode};
use super::events::{SyncEvent, SyncEventBus};
use super::filter::{apply_filters, DataFilter};
use super::observable::Observable;
use super::overview::{overview, Dashboard};
use crate::error::{AttesterError, Result};
use crate::model::{Element, ElementResult};
use crate::network::{RemoteEngineClient, Response};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchSettings {
    pub page_size: usize,
    pub poll_interval: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            page_size: 10,
            poll_interval: Duration::from_secs(30),
        }
    }
}

/// Status of bulk (paged) operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkStatus {
    Idle,
    Loading,
    Error(String),
}

struct SyncState {
    client: Arc<dyn RemoteEngineClient>,
    cache: ElementCache,
    filters: Vec<DataFilter>,
    cursor: usize,
    has_more: bool,
    /// Bumped when the engine changes
    engine_epoch: u64,
    /// Bumped whenever the cursor is reset
    page_epoch: u64,
    next_ticket: u64,
    refresh_in_flight: Option<u64>,
    batch_in_flight: Option<u64>,
    last_error: Option<String>,
    /// Outcome of the latest applied refresh, shared with joined callers
    last_refresh: Option<(u64, Result<()>)>,
}

impl SyncState {
    fn issue_ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }

    fn reset_cursor(&mut self) {
        self.page_epoch += 1;
        self.cursor = 0;
        self.has_more = true;
    }
}

struct PollLoop {
    id: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct PollSlot {
    next_id: u64,
    active: Option<PollLoop>,
}

#[derive(Clone, Copy, Debug)]
enum Flight {
    Refresh,
    Batch,
}

struct Inner {
    settings: FetchSettings,
    state: Mutex<SyncState>,
    poll: Mutex<PollSlot>,
    filtered: Observable<Response<Vec<Element>>>,
    element_count: Observable<Response<usize>>,
    loading: Observable<bool>,
    refreshing: Observable<bool>,
    bulk_status: Observable<BulkStatus>,
    events: SyncEventBus,
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_poll(&self) -> MutexGuard<'_, PollSlot> {
        self.poll.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Re-derives the observable views. Called with the state lock held so
    /// observers see updates in mutation order.
    fn publish_view(&self, st: &SyncState) {
        if st.cache.is_empty() && st.refresh_in_flight.is_some() {
            self.filtered.set(Response::Loading);
            self.element_count.set(Response::Loading);
            return;
        }

        let visible = apply_filters(st.cache.elements(), &st.filters);
        let count = st.cache.count();
        match &st.last_error {
            None => {
                self.filtered.set(Response::success(visible));
                self.element_count.set(Response::success(count));
            }
            Some(message) => {
                self.filtered.set(Response::error(message.clone(), Some(visible)));
                self.element_count.set(Response::error(message.clone(), Some(count)));
            }
        }
    }

    /// Bulk status implied by the state once a fetch has settled.
    fn settle_bulk_status(&self, st: &SyncState) {
        let status = if st.batch_in_flight.is_some() {
            BulkStatus::Loading
        } else if let Some(message) = &st.last_error {
            BulkStatus::Error(message.clone())
        } else {
            BulkStatus::Idle
        };
        self.bulk_status.set(status);
    }

    fn record_failure(&self, st: &mut SyncState, err: &AttesterError) {
        let message = err.to_string();
        st.last_error = Some(message.clone());
        self.publish_view(st);
        self.bulk_status.set(BulkStatus::Error(message.clone()));
        self.events.publish(SyncEvent::FetchFailed { message });
    }

    /// Clears an in-flight marker whose future was dropped before completing.
    fn abandon(&self, flight: Flight, ticket: u64) {
        let mut st = self.lock_state();
        match flight {
            Flight::Refresh if st.refresh_in_flight == Some(ticket) => {
                st.refresh_in_flight = None;
                self.publish_view(&st);
                self.refreshing.set(false);
            }
            Flight::Batch if st.batch_in_flight == Some(ticket) => {
                st.batch_in_flight = None;
                self.loading.set(false);
                self.settle_bulk_status(&st);
            }
            _ => return,
        }
        debug!("Abandoned {:?} fetch {}", flight, ticket);
    }

    /// Dispatches one poll refresh if loop `id` is still the active one.
    fn dispatch_poll_tick(self: &Arc<Self>, id: u64) -> bool {
        let slot = self.lock_poll();
        match &slot.active {
            Some(active) if active.id == id => {}
            _ => return false,
        }

        // Detached so stopping the loop never cuts a request in half
        let coordinator = FetchCoordinator { inner: Arc::clone(self) };
        tokio::spawn(async move {
            if let Err(e) = coordinator.refresh(false).await {
                debug!("Poll refresh failed: {}", e);
            }
        });
        true
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let slot = self.poll.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(active) = slot.active.take() {
            active.handle.abort();
        }
    }
}

struct FlightGuard {
    inner: Option<Arc<Inner>>,
    flight: Flight,
    ticket: u64,
}

impl FlightGuard {
    fn new(inner: &Arc<Inner>, flight: Flight, ticket: u64) -> Self {
        Self { inner: Some(Arc::clone(inner)), flight, ticket }
    }

    fn disarm(mut self) {
        self.inner = None;
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            inner.abandon(self.flight, self.ticket);
        }
    }
}

/// Synchronizes the engine's paged element collection into the local cache.
///
/// Cheap to clone; clones share the same cache and observers.
#[derive(Clone)]
pub struct FetchCoordinator {
    inner: Arc<Inner>,
}

impl FetchCoordinator {
    pub fn new(client: Arc<dyn RemoteEngineClient>, settings: FetchSettings) -> Self {
        let state = SyncState {
            client,
            cache: ElementCache::new(),
            filters: Vec::new(),
            cursor: 0,
            has_more: true,
            engine_epoch: 0,
            page_epoch: 0,
            next_ticket: 0,
            refresh_in_flight: None,
            batch_in_flight: None,
            last_error: None,
            last_refresh: None,
        };
        Self {
            inner: Arc::new(Inner {
                settings,
                state: Mutex::new(state),
                poll: Mutex::new(PollSlot::default()),
                filtered: Observable::new(Response::Idle),
                element_count: Observable::new(Response::Idle),
                loading: Observable::new(false),
                refreshing: Observable::new(false),
                bulk_status: Observable::new(BulkStatus::Idle),
                events: SyncEventBus::default(),
            }),
        }
    }

    pub fn settings(&self) -> FetchSettings {
        self.inner.settings
    }

    /// Reloads the first page and makes it the new truth.
    ///
    /// While a refresh is outstanding further calls wait for it instead of
    /// issuing their own request, unless `force` is set; a forced refresh
    /// supersedes the outstanding one, whose result is then discarded.
    /// A caller that joined gets the outcome of the refresh it waited on.
    pub async fn refresh(&self, force: bool) -> Result<()> {
        let start = {
            let mut st = self.inner.lock_state();
            match st.refresh_in_flight {
                Some(joined) if !force => Err(joined),
                _ => {
                    let ticket = st.issue_ticket();
                    st.reset_cursor();
                    st.refresh_in_flight = Some(ticket);
                    self.inner.refreshing.set(true);
                    if st.cache.is_empty() {
                        self.inner.publish_view(&st);
                    }
                    Ok((ticket, st.client.clone()))
                }
            }
        };

        let (ticket, client) = match start {
            Ok(flight) => flight,
            Err(joined) => {
                debug!("Refresh {} already in flight, joining it", joined);
                return self.join_refresh(joined).await;
            }
        };

        let guard = FlightGuard::new(&self.inner, Flight::Refresh, ticket);
        let outcome = client.list_elements(0, self.inner.settings.page_size).await;
        guard.disarm();

        let mut st = self.inner.lock_state();
        if st.refresh_in_flight != Some(ticket) {
            debug!("Discarding superseded refresh {}", ticket);
            return outcome.map(|_| ());
        }
        st.refresh_in_flight = None;

        let result = match outcome {
            Ok(page) => {
                let returned = page.elements.len();
                let count = st.cache.merge(page.elements, MergeMode::Replace);
                st.cursor = returned;
                st.has_more = page.has_more && returned > 0;
                st.last_error = None;
                self.inner.publish_view(&st);
                self.inner.settle_bulk_status(&st);
                self.inner.events.publish(SyncEvent::Replaced { count });
                info!("Refreshed elements: {} cached, more available: {}", count, st.has_more);
                Ok(())
            }
            Err(e) => {
                warn!("Element refresh failed: {}", e);
                self.inner.record_failure(&mut st, &e);
                Err(e)
            }
        };
        st.last_refresh = Some((ticket, result.clone()));
        self.inner.refreshing.set(false);
        result
    }

    /// Waits for refresh `joined` (or one that superseded it) and returns its
    /// outcome.
    async fn join_refresh(&self, joined: u64) -> Result<()> {
        let mut rx = self.inner.refreshing.subscribe();
        let _ = rx.wait_for(|refreshing| !*refreshing).await;

        let st = self.inner.lock_state();
        match &st.last_refresh {
            Some((ticket, outcome)) if *ticket >= joined => outcome.clone(),
            _ => Err(AttesterError::Cancelled("joined refresh did not complete")),
        }
    }

    /// Appends the next page. No-op while any bulk fetch is outstanding or
    /// once the engine reported the last page.
    pub async fn fetch_next_batch(&self) -> Result<()> {
        let start = {
            let mut st = self.inner.lock_state();
            if st.batch_in_flight.is_some() || st.refresh_in_flight.is_some() {
                debug!("Fetch already in flight, skipping next batch");
                None
            } else if !st.has_more {
                debug!("All elements fetched, skipping next batch");
                None
            } else {
                let ticket = st.issue_ticket();
                st.batch_in_flight = Some(ticket);
                self.inner.loading.set(true);
                self.inner.bulk_status.set(BulkStatus::Loading);
                Some((ticket, st.page_epoch, st.cursor, st.client.clone()))
            }
        };
        let Some((ticket, epoch, offset, client)) = start else {
            return Ok(());
        };

        let guard = FlightGuard::new(&self.inner, Flight::Batch, ticket);
        let outcome = client.list_elements(offset, self.inner.settings.page_size).await;
        guard.disarm();

        let mut st = self.inner.lock_state();
        if st.batch_in_flight != Some(ticket) {
            debug!("Discarding batch {} from a previous engine", ticket);
            return outcome.map(|_| ());
        }
        st.batch_in_flight = None;
        self.inner.loading.set(false);

        if st.page_epoch != epoch {
            debug!("Discarding batch {} fetched before a refresh", ticket);
            self.inner.settle_bulk_status(&st);
            return Ok(());
        }

        match outcome {
            Ok(page) => {
                let returned = page.elements.len();
                let added = st.cache.merge(page.elements, MergeMode::Append);
                // Advance by what the engine returned, short final pages included
                st.cursor += returned;
                st.has_more = page.has_more && returned > 0;
                st.last_error = None;
                self.inner.publish_view(&st);
                self.inner.settle_bulk_status(&st);
                let total = st.cache.count();
                self.inner.events.publish(SyncEvent::Appended { added, total });
                debug!("Fetched batch at offset {}: {} new, {} total", offset, added, total);
                Ok(())
            }
            Err(e) => {
                warn!("Fetching next batch failed: {}", e);
                self.inner.record_failure(&mut st, &e);
                Err(e)
            }
        }
    }

    /// Re-fetches one element and replaces it in the cache if present.
    ///
    /// Failures leave the bulk status alone; they are returned to the caller
    /// and published as [`SyncEvent::ElementRefreshFailed`].
    pub async fn refresh_single_value(&self, id: &str) -> Result<Element> {
        let (epoch, client) = {
            let st = self.inner.lock_state();
            (st.engine_epoch, st.client.clone())
        };

        match client.get_element(id).await {
            Ok(element) => {
                let mut st = self.inner.lock_state();
                if st.engine_epoch != epoch {
                    return Err(AttesterError::Cancelled("engine switched during element refresh"));
                }
                if st.cache.update(element.clone()) {
                    self.inner.publish_view(&st);
                    self.inner.events.publish(SyncEvent::ElementUpdated { itemid: id.to_string() });
                } else {
                    debug!("Refreshed element {} is not cached, ignoring", id);
                }
                Ok(element)
            }
            Err(e) => {
                warn!("Refreshing element {} failed: {}", id, e);
                self.inner.events.publish(SyncEvent::ElementRefreshFailed {
                    itemid: id.to_string(),
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Replaces the active filters and re-derives the view from the cache.
    pub fn apply_filters(&self, filters: Vec<DataFilter>) {
        let mut st = self.inner.lock_state();
        st.filters = filters;
        self.inner.publish_view(&st);
        let visible = apply_filters(st.cache.elements(), &st.filters).len();
        self.inner.events.publish(SyncEvent::FiltersApplied { visible });
    }

    /// Points the coordinator at a different engine: the cache is emptied,
    /// the cursor reset and any outstanding fetch orphaned, all in one step.
    pub fn switch_engine(&self, client: Arc<dyn RemoteEngineClient>, engine: &str) {
        let mut st = self.inner.lock_state();
        st.client = client;
        st.engine_epoch += 1;
        st.reset_cursor();
        st.cache.clear();
        st.refresh_in_flight = None;
        st.batch_in_flight = None;
        st.last_error = None;
        st.last_refresh = None;

        self.inner.filtered.set(Response::Loading);
        self.inner.element_count.set(Response::Loading);
        self.inner.loading.set(false);
        self.inner.refreshing.set(false);
        self.inner.bulk_status.set(BulkStatus::Idle);
        self.inner.events.publish(SyncEvent::Cleared { engine: engine.to_string() });
        info!("Element cache cleared for engine {}", engine);
    }

    /// Refreshes every `poll_interval` until stopped. The first refresh is
    /// issued immediately. Must be called from within a tokio runtime.
    pub fn start_poll_loop(&self) {
        let mut slot = self.inner.lock_poll();
        if slot.active.is_some() {
            debug!("Poll loop already running");
            return;
        }
        slot.next_id += 1;
        let id = slot.next_id;
        let interval = self.inner.settings.poll_interval;
        let weak = Arc::downgrade(&self.inner);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                if !inner.dispatch_poll_tick(id) {
                    break;
                }
            }
        });
        slot.active = Some(PollLoop { id, handle });
        info!("Started element poll loop every {:?}", interval);
    }

    /// No tick fires after this returns. A refresh already dispatched is
    /// left to complete.
    pub fn stop_poll_loop(&self) {
        let mut slot = self.inner.lock_poll();
        if let Some(active) = slot.active.take() {
            active.handle.abort();
            info!("Stopped element poll loop");
        }
    }

    pub fn is_polling(&self) -> bool {
        self.inner.lock_poll().active.is_some()
    }

    pub fn filtered_elements(&self) -> watch::Receiver<Response<Vec<Element>>> {
        self.inner.filtered.subscribe()
    }

    pub fn current_elements(&self) -> Response<Vec<Element>> {
        self.inner.filtered.get()
    }

    pub fn element_count(&self) -> watch::Receiver<Response<usize>> {
        self.inner.element_count.subscribe()
    }

    pub fn current_count(&self) -> Response<usize> {
        self.inner.element_count.get()
    }

    pub fn loading(&self) -> watch::Receiver<bool> {
        self.inner.loading.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.loading.get()
    }

    pub fn refreshing(&self) -> watch::Receiver<bool> {
        self.inner.refreshing.subscribe()
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.refreshing.get()
    }

    pub fn bulk_status(&self) -> BulkStatus {
        self.inner.bulk_status.get()
    }

    pub fn events(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    pub fn get_element(&self, id: &str) -> Option<Element> {
        self.inner.lock_state().cache.get(id).cloned()
    }

    pub fn find_result(&self, result_id: &str) -> Option<ElementResult> {
        self.inner.lock_state().cache.find_result(result_id).cloned()
    }

    /// Unfiltered copy of the cache in insertion order
    pub fn snapshot(&self) -> Vec<Element> {
        self.inner.lock_state().cache.elements().to_vec()
    }

    pub fn has_more(&self) -> bool {
        self.inner.lock_state().has_more
    }

    pub fn active_filters(&self) -> Vec<DataFilter> {
        self.inner.lock_state().filters.clone()
    }

    /// Latest result per element, optionally limited to the last hours.
    pub fn overview(&self, hours_since: Option<u32>) -> Vec<ElementResult> {
        let st = self.inner.lock_state();
        overview(st.cache.elements(), hours_since, Utc::now())
    }

    pub fn dashboard(&self) -> Dashboard {
        let st = self.inner.lock_state();
        Dashboard::compute(st.cache.elements(), Utc::now())
    }
}
