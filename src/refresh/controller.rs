//! The refresh controller: per-query registry, fetch pipeline, and
//! subscriber bookkeeping.
//!
//! Fetch pipeline per trigger: remote (while online, with the query's retry
//! budget) → local snapshot cache → error. A successful remote fetch is
//! written through to the cache before the state settles. Errors with a
//! cache fallback available are downgraded and never surface to
//! subscribers.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use rand::RngExt;
use tokio::sync::{watch, Notify};
use uuid::Uuid;

use crate::cache::SnapshotStore;
use crate::error::{FetchError, RefreshError};
use crate::latency::{FetchLatency, LatencyRollupsPayload};
use crate::remote::RemoteSource;
use crate::types::{QuerySpec, RefreshReason, RefreshState, RefreshStatus, Snapshot, SnapshotSource};

use super::scheduler;

/// Base delay between remote retry attempts; grows linearly per attempt.
const RETRY_BASE_DELAY_MS: u64 = 100;
/// Random jitter added on top of the base delay.
const RETRY_JITTER_MS: u64 = 100;

/// Per-query bookkeeping. The watch sender is the single point of state
/// publication; snapshot, status, source, and error always change in one
/// send, so subscribers never observe a torn combination.
pub(crate) struct QueryEntry {
    pub(crate) spec: QuerySpec,
    pub(crate) state: watch::Sender<RefreshState>,
    in_flight: AtomicBool,
    subscribers: Mutex<HashSet<Uuid>>,
    pub(crate) shutdown: Notify,
    active: AtomicBool,
    /// Bumped on every (re)activation; a scheduler task exits once its
    /// captured epoch is no longer current.
    epoch: AtomicU64,
}

impl QueryEntry {
    fn new(spec: QuerySpec) -> Self {
        let (state, _) = watch::channel(RefreshState::loading(spec.stale_after));
        Self {
            spec,
            state,
            in_flight: AtomicBool::new(false),
            subscribers: Mutex::new(HashSet::new()),
            shutdown: Notify::new(),
            active: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub(crate) fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }
}

/// A live subscription to one query's refresh state.
///
/// Holds a read-only, always-current view; the initial state is available
/// synchronously via [`Subscription::current`].
pub struct Subscription {
    name: String,
    id: Uuid,
    receiver: watch::Receiver<RefreshState>,
}

impl Subscription {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The most recently published state for this query.
    pub fn current(&self) -> RefreshState {
        self.receiver.borrow().clone()
    }

    /// Wait for the next state publication. Errors only if the controller
    /// entry was dropped.
    pub async fn changed(&mut self) -> Result<(), watch::error::RecvError> {
        self.receiver.changed().await
    }

    /// A fresh receiver for consumers that want their own change cursor.
    pub fn watch(&self) -> watch::Receiver<RefreshState> {
        self.receiver.clone()
    }
}

enum FetchOutcome {
    Remote(Snapshot),
    Cache(Snapshot, String),
    Unavailable(FetchError),
}

/// Owns the query registry and the fetch pipeline. One instance per app.
pub struct RefreshController {
    remote: Arc<dyn RemoteSource>,
    store: Arc<dyn SnapshotStore>,
    connectivity: watch::Receiver<bool>,
    registry: DashMap<String, Arc<QueryEntry>>,
    latency: FetchLatency,
}

impl RefreshController {
    pub fn new(
        remote: Arc<dyn RemoteSource>,
        store: Arc<dyn SnapshotStore>,
        connectivity: watch::Receiver<bool>,
        fetch_budget_ms: u64,
    ) -> Self {
        Self {
            remote,
            store,
            connectivity,
            registry: DashMap::new(),
            latency: FetchLatency::new(u128::from(fetch_budget_ms)),
        }
    }

    pub fn is_online(&self) -> bool {
        *self.connectivity.borrow()
    }

    pub(crate) fn connectivity_rx(&self) -> watch::Receiver<bool> {
        self.connectivity.clone()
    }

    pub fn latency_rollups(&self) -> LatencyRollupsPayload {
        self.latency.snapshot()
    }

    /// The most recently published state for a registered query, if any.
    pub fn current_state(&self, name: &str) -> Option<RefreshState> {
        self.registry.get(name).map(|e| e.state.borrow().clone())
    }

    /// Subscribe to a query, registering it on first use.
    ///
    /// Returns synchronously with the most recently computed state — before
    /// any asynchronous fetch completes. A query with no snapshot yet reads
    /// as Loading with an absent snapshot. The first subscriber (re)starts
    /// the scheduler task and kicks off an immediate fetch; the spec of an
    /// already-registered query is not replaced.
    pub fn subscribe(self: &Arc<Self>, spec: QuerySpec) -> Subscription {
        let name = spec.name.clone();
        let entry = self
            .registry
            .entry(name.clone())
            .or_insert_with(|| Arc::new(QueryEntry::new(spec)))
            .value()
            .clone();

        let id = Uuid::new_v4();
        let first_subscriber = {
            let mut subs = entry.subscribers.lock();
            let was_empty = subs.is_empty();
            subs.insert(id);
            was_empty
        };

        let receiver = entry.state.subscribe();

        if first_subscriber {
            let epoch = entry.epoch.fetch_add(1, Ordering::SeqCst) + 1;
            entry.active.store(true, Ordering::SeqCst);
            log::info!(
                "Refresh: {} subscribed (interval {:?})",
                name,
                entry.spec.refresh_interval
            );

            // Fresh data whenever a surface attaches
            let controller = self.clone();
            let fetch_name = name.clone();
            tokio::spawn(async move {
                let _ = controller
                    .trigger_fetch(&fetch_name, RefreshReason::ManualRefresh)
                    .await;
            });

            tokio::spawn(scheduler::run_query_scheduler(
                self.clone(),
                entry.clone(),
                epoch,
            ));
        }

        Subscription { name, id, receiver }
    }

    /// Drop one subscriber. When the last subscriber leaves, the scheduler
    /// stops and any in-flight fetch result is discarded; the cached
    /// snapshot and last published state are retained.
    pub fn unsubscribe(&self, subscription: &Subscription) {
        let Some(entry) = self.registry.get(subscription.name()) else {
            return;
        };

        let now_empty = {
            let mut subs = entry.subscribers.lock();
            subs.remove(&subscription.id);
            subs.is_empty()
        };

        if now_empty {
            entry.active.store(false, Ordering::SeqCst);
            entry.shutdown.notify_waiters();
            log::info!(
                "Refresh: {} has no subscribers, scheduler stopped",
                subscription.name()
            );
        }
    }

    /// Run one fetch for a registered query.
    ///
    /// At most one fetch is in flight per query: a second trigger while
    /// Loading performs no work and returns the in-flight result once it
    /// settles.
    pub async fn trigger_fetch(
        &self,
        name: &str,
        reason: RefreshReason,
    ) -> Result<RefreshState, String> {
        let entry = self
            .registry
            .get(name)
            .map(|e| e.value().clone())
            .ok_or_else(|| format!("Unknown query: {}", name))?;

        if entry
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(Self::await_settled(&entry).await);
        }

        log::debug!("Refresh: {} fetch started ({})", name, reason.as_str());
        entry.state.send_modify(|s| {
            s.status = RefreshStatus::Loading;
        });

        let started = Instant::now();
        let outcome = self.execute_fetch(&entry.spec).await;
        let elapsed_ms = started.elapsed().as_millis();
        self.latency.record_fetch(name, elapsed_ms);

        if !entry.is_active() {
            // Last subscriber left while we were fetching. The state stays
            // Loading; the next subscribe triggers a fresh fetch anyway.
            entry.in_flight.store(false, Ordering::SeqCst);
            log::debug!("Refresh: {} result discarded (no subscribers)", name);
            return Ok(entry.state.borrow().clone());
        }

        match outcome {
            FetchOutcome::Remote(snapshot) => {
                log::debug!("Refresh: {} updated from remote in {}ms", name, elapsed_ms);
                entry.state.send_modify(|s| {
                    s.snapshot = Some(snapshot);
                    s.status = RefreshStatus::Idle;
                    s.source = SnapshotSource::Remote;
                    s.last_error = None;
                });
            }
            FetchOutcome::Cache(snapshot, cause) => {
                self.latency.increment_degraded(name);
                log::warn!("Refresh: {} served from cache ({})", name, cause);
                entry.state.send_modify(|s| {
                    s.snapshot = Some(snapshot);
                    s.status = RefreshStatus::Idle;
                    s.source = SnapshotSource::Cache;
                    s.last_error = None;
                });
            }
            FetchOutcome::Unavailable(err) => {
                log::warn!("Refresh: {} failed with no fallback: {}", name, err);
                entry.state.send_modify(|s| {
                    // Snapshot and source are preserved: errors never erase
                    // previously displayed data
                    s.status = RefreshStatus::Error;
                    s.last_error = Some(RefreshError::from(&err));
                });
            }
        }

        entry.in_flight.store(false, Ordering::SeqCst);
        let result = entry.state.borrow().clone();
        Ok(result)
    }

    async fn await_settled(entry: &QueryEntry) -> RefreshState {
        let mut rx = entry.state.subscribe();
        loop {
            {
                let state = rx.borrow_and_update();
                if state.status != RefreshStatus::Loading {
                    return state.clone();
                }
            }
            if rx.changed().await.is_err() {
                return entry.state.borrow().clone();
            }
        }
    }

    /// The fetch pipeline: remote while online (with retry budget), then
    /// cache, then error.
    async fn execute_fetch(&self, spec: &QuerySpec) -> FetchOutcome {
        let online = *self.connectivity.borrow();
        let mut remote_failure: Option<FetchError> = None;

        if online {
            let mut attempt = 0;
            loop {
                attempt += 1;
                match self.remote.fetch(&spec.name, spec.params.as_ref()).await {
                    Ok(value) => {
                        let snapshot = Snapshot::now(value);
                        // Write-through: persist before the state settles so
                        // the cache always holds the latest displayed value
                        if let Err(e) = self.store.set(&spec.name, &snapshot).await {
                            log::warn!("Refresh: {} write-through failed: {}", spec.name, e);
                        }
                        return FetchOutcome::Remote(snapshot);
                    }
                    Err(e) if e.is_retryable() && attempt < spec.max_attempts => {
                        let delay = retry_delay(attempt);
                        log::debug!(
                            "Refresh: {} attempt {} failed ({}), retrying in {:?}",
                            spec.name,
                            attempt,
                            e,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                    }
                    Err(e) => {
                        remote_failure = Some(e);
                        break;
                    }
                }
            }
        }

        let cause = remote_failure
            .map(|e| e.to_string())
            .unwrap_or_else(|| "offline".to_string());

        match self.store.get(&spec.name).await {
            Some(snapshot) => FetchOutcome::Cache(snapshot, cause),
            None => {
                log::debug!("Refresh: {} has no cached fallback ({})", spec.name, cause);
                FetchOutcome::Unavailable(FetchError::NoDataAvailable)
            }
        }
    }
}

fn retry_delay(attempt: u32) -> Duration {
    let base = RETRY_BASE_DELAY_MS * u64::from(attempt);
    let jitter = rand::rng().random_range(0..RETRY_JITTER_MS);
    Duration::from_millis(base + jitter)
}
