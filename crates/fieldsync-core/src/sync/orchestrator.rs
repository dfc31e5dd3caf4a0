//! Sync orchestrator.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::connectivity::{Connectivity, ConnectivityWatch};
use crate::gateway::{GatewayError, RemoteGateway};
use crate::models::{Collection, Operation, QueueEntry, RecordId};
use crate::queue::SyncQueue;
use crate::state::{SyncState, SyncStatus};
use crate::store::{keys, LocalStore};

use super::{
    backoff_delay, CollectionSync, EventBus, FullSyncReport, RetryScheduler, Subscription,
    SyncConfig, SyncError, SyncEvent, SyncGate, SyncPermit,
};

#[derive(Debug, Default)]
struct Session {
    syncing: bool,
    retry_count: u32,
    consecutive_failures: u32,
    last_sync_time: Option<DateTime<Utc>>,
    local_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Retry,
    Online,
    Interval,
}

struct Inner {
    store: LocalStore,
    queue: SyncQueue,
    gateway: Arc<dyn RemoteGateway>,
    connectivity: ConnectivityWatch,
    scheduler: Arc<dyn RetryScheduler>,
    gate: SyncGate,
    config: SyncConfig,
    events: EventBus,
    session: Mutex<Session>,
    triggers: Mutex<Option<mpsc::UnboundedSender<Trigger>>>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

/// Clears the session's `syncing` flag even if the pass is dropped mid-flight.
struct ActivePass<'a> {
    inner: &'a Inner,
    _permit: SyncPermit,
}

impl Drop for ActivePass<'_> {
    fn drop(&mut self) {
        self.inner.session().syncing = false;
    }
}

/// Drives the sync lifecycle over the store, queue and gateway.
///
/// Cloning is cheap; clones share one session.
#[derive(Clone)]
pub struct SyncOrchestrator {
    inner: Arc<Inner>,
}

impl SyncOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: LocalStore,
        queue: SyncQueue,
        gateway: Arc<dyn RemoteGateway>,
        connectivity: ConnectivityWatch,
        scheduler: Arc<dyn RetryScheduler>,
        gate: SyncGate,
        config: SyncConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                queue,
                gateway,
                connectivity,
                scheduler,
                gate,
                config,
                events: EventBus::new(),
                session: Mutex::new(Session::default()),
                triggers: Mutex::new(None),
                driver: Mutex::new(None),
            }),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(handler)
    }

    pub fn status(&self) -> SyncStatus {
        let session = self.inner.session();
        SyncStatus {
            state: if session.syncing {
                SyncState::Syncing
            } else {
                SyncState::Idle
            },
            retry_count: session.retry_count,
            consecutive_failures: session.consecutive_failures,
            last_sync_time: session.last_sync_time,
            local_only: session.local_only,
        }
    }

    /// Drain the queue once if online and idle.
    ///
    /// Returns `Ok(false)` without any remote call when offline, in local-only
    /// mode, or when another session (or a tenant wipe) holds the gate.
    pub async fn check_and_sync(&self) -> Result<bool, SyncError> {
        if !self.inner.connectivity.is_online() {
            tracing::debug!("Skipping sync: offline");
            return Ok(false);
        }
        if self.inner.session().local_only {
            tracing::debug!("Skipping sync: local-only mode");
            return Ok(false);
        }
        let Some(permit) = self.inner.gate.try_acquire() else {
            tracing::debug!("Skipping sync: a session is already running");
            return Ok(false);
        };
        self.inner.run_pass(permit).await
    }

    /// Leave local-only mode, wait for any running session, then drain.
    pub async fn force_sync_now(&self) -> Result<bool, SyncError> {
        self.inner.leave_local_only();
        if !self.inner.connectivity.is_online() {
            return Ok(false);
        }
        let permit = self.inner.gate.acquire().await;
        if !self.inner.connectivity.is_online() {
            return Ok(false);
        }
        self.inner.run_pass(permit).await
    }

    /// Pull authoritative templates and vehicles into the store.
    ///
    /// On first access the whole snapshot is fetched and local records it no
    /// longer lists are dropped; otherwise only records updated since the last
    /// successful fetch are requested. Each collection is fetched
    /// independently.
    pub async fn perform_full_sync(&self, is_first_access: bool) -> Result<FullSyncReport, SyncError> {
        if !self.inner.connectivity.is_online() {
            return Err(SyncError::Offline);
        }
        let permit = self.inner.gate.acquire().await;
        let _pass = self.inner.begin(permit);
        self.inner.events.emit(&SyncEvent::start(if is_first_access {
            "Downloading templates and vehicles"
        } else {
            "Refreshing templates and vehicles"
        }));

        let mut report = FullSyncReport::default();
        for collection in Collection::SNAPSHOTS {
            let outcome = match self.inner.refresh(collection, is_first_access).await {
                Ok(outcome) => outcome,
                Err(error) => {
                    tracing::warn!("Full sync of {collection} failed: {error}");
                    self.inner
                        .events
                        .emit(&SyncEvent::error(format!("Could not refresh {collection}: {error}")));
                    CollectionSync {
                        collection,
                        fetched: 0,
                        removed: 0,
                        error: Some(error.to_string()),
                    }
                }
            };
            report.collections.push(outcome);
        }

        let fetched: usize = report.collections.iter().map(|outcome| outcome.fetched).sum();
        self.inner.events.emit(&SyncEvent::complete(
            format!("Refreshed {fetched} records"),
            fetched,
        ));
        Ok(report)
    }

    /// Spawn the driver that reacts to connectivity edges, retry wake-ups and
    /// the optional auto-sync interval. Calling twice restarts it.
    pub fn start(&self) {
        let (tx, rx) = mpsc::unbounded_channel();
        *self
            .inner
            .triggers
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(tx);

        let orchestrator = self.clone();
        let connectivity = self.inner.connectivity.clone();
        let handle = tokio::spawn(async move { orchestrator.drive(rx, connectivity).await });

        if let Some(previous) = self
            .inner
            .driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle)
        {
            previous.abort();
        }
    }

    /// Cancel retry timers, stop the driver and drop its connectivity
    /// subscription.
    pub fn shutdown(&self) {
        self.inner.scheduler.cancel_all();
        self.inner
            .triggers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(driver) = self
            .inner
            .driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            driver.abort();
        }
        tracing::debug!("Sync orchestrator stopped");
    }

    async fn drive(&self, mut triggers: mpsc::UnboundedReceiver<Trigger>, mut connectivity: ConnectivityWatch) {
        let mut interval = self.inner.config.auto_sync_interval.map(|period| {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            interval
        });

        loop {
            let trigger = tokio::select! {
                trigger = triggers.recv() => match trigger {
                    Some(trigger) => trigger,
                    None => break,
                },
                edge = connectivity.changed() => match edge {
                    Some(Connectivity::Online) => Trigger::Online,
                    Some(Connectivity::Offline) => continue,
                    None => break,
                },
                () = tick(interval.as_mut()) => Trigger::Interval,
            };

            if trigger == Trigger::Online {
                self.inner.leave_local_only();
            }
            tracing::debug!("Sync triggered by {trigger:?}");
            if let Err(error) = self.check_and_sync().await {
                tracing::warn!("Background sync failed: {error}");
            }
        }
    }
}

async fn tick(interval: Option<&mut tokio::time::Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

impl Inner {
    fn session(&self) -> std::sync::MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self, permit: SyncPermit) -> ActivePass<'_> {
        self.session().syncing = true;
        ActivePass {
            inner: self,
            _permit: permit,
        }
    }

    fn leave_local_only(&self) {
        let mut session = self.session();
        if session.local_only {
            tracing::info!("Leaving local-only mode");
        }
        session.local_only = false;
        session.consecutive_failures = 0;
    }

    async fn run_pass(self: &Arc<Self>, permit: SyncPermit) -> Result<bool, SyncError> {
        let outcome = {
            let _pass = self.begin(permit);
            self.drain().await
        };
        self.settle(&outcome);
        outcome
    }

    async fn drain(&self) -> Result<bool, SyncError> {
        let mut pending = self.queue.pending().await?;
        if pending.is_empty() {
            self.events.emit(&SyncEvent::complete("Nothing to sync", 0));
            return Ok(true);
        }
        pending.sort_by_key(|entry| entry.id);

        let total = pending.len();
        self.events.emit(&SyncEvent::start(format!(
            "Syncing {total} {}",
            if total == 1 { "item" } else { "items" }
        )));

        let deleted: HashSet<(Collection, RecordId)> = pending
            .iter()
            .filter(|entry| entry.operation == Operation::Delete)
            .map(|entry| (entry.collection, entry.record_id.clone()))
            .collect();
        let mut converged: HashSet<(Collection, RecordId)> = HashSet::new();

        for (index, entry) in pending.iter().enumerate() {
            if !self.connectivity.is_online() {
                return Err(SyncError::Interrupted(format!(
                    "connection lost after {index} of {total} items"
                )));
            }

            let key = (entry.collection, entry.record_id.clone());
            if !converged.contains(&key) {
                self.push(entry, deleted.contains(&key)).await?;
                converged.insert(key);
            }
            self.queue.mark_synced(entry.id).await?;
            self.events.emit(&SyncEvent::progress(index + 1, total));
        }

        self.events.emit(&SyncEvent::complete(
            format!(
                "Synced {total} {}",
                if total == 1 { "item" } else { "items" }
            ),
            total,
        ));
        Ok(true)
    }

    /// Bring the remote copy of one record in line with the local one.
    async fn push(&self, entry: &QueueEntry, has_delete: bool) -> Result<(), SyncError> {
        let collection = entry.collection;
        let id = &entry.record_id;

        match self.store.get(collection, id).await? {
            Some(record) => {
                self.remote(self.gateway.submit(collection, &record)).await?;
                if !self
                    .store
                    .mark_record_synced(collection, id, record.revision)
                    .await?
                {
                    tracing::debug!("{collection}/{id} changed while sending; left unsynced");
                }
            }
            None if has_delete => {
                self.remote(self.gateway.delete(collection, id)).await?;
            }
            None => {
                tracing::debug!("{collection}/{id} no longer exists; skipping entry {}", entry.id);
            }
        }
        Ok(())
    }

    /// Run a gateway call bounded by the request timeout and cancelled by an
    /// offline edge.
    async fn remote<T>(
        &self,
        call: impl Future<Output = Result<T, GatewayError>>,
    ) -> Result<T, SyncError> {
        let mut connectivity = self.connectivity.clone();
        let timeout = self.config.request_timeout;
        tokio::select! {
            biased;
            () = connectivity.wait_for(Connectivity::Offline) => Err(SyncError::Interrupted(
                "connection lost during a remote call".to_string(),
            )),
            result = tokio::time::timeout(timeout, call) => match result {
                Ok(result) => result.map_err(SyncError::from),
                Err(_) => Err(GatewayError::Timeout(timeout).into()),
            },
        }
    }

    async fn refresh(
        &self,
        collection: Collection,
        is_first_access: bool,
    ) -> Result<CollectionSync, SyncError> {
        let cursor_key = keys::last_fetch(collection);
        let since = if is_first_access {
            None
        } else {
            self.store
                .get_setting(&cursor_key)
                .await?
                .and_then(|value| DateTime::parse_from_rfc3339(&value).ok())
                .map(|value| value.with_timezone(&Utc))
        };

        let started = Utc::now();
        let records = self
            .remote(self.gateway.fetch_collection(collection, since))
            .await?;

        let mut seen = HashSet::new();
        for mut record in records {
            record.collection = collection;
            record.synced = true;
            self.store.put(&record).await?;
            seen.insert(record.id);
        }

        let mut removed = 0;
        if since.is_none() {
            for stale in self.store.get_all(collection).await? {
                if !seen.contains(&stale.id) {
                    self.store.delete(collection, &stale.id).await?;
                    removed += 1;
                }
            }
        }

        self.store
            .set_setting(&cursor_key, &started.to_rfc3339())
            .await?;
        tracing::info!(
            "Refreshed {collection}: {} records, {removed} removed",
            seen.len()
        );
        Ok(CollectionSync {
            collection,
            fetched: seen.len(),
            removed,
            error: None,
        })
    }

    fn settle(self: &Arc<Self>, outcome: &Result<bool, SyncError>) {
        let error = match outcome {
            Ok(false) => return,
            Ok(true) => {
                let mut session = self.session();
                session.retry_count = 0;
                session.consecutive_failures = 0;
                session.last_sync_time = Some(Utc::now());
                return;
            }
            Err(error) => error,
        };

        self.events.emit(&SyncEvent::error(error.to_string()));
        if !error.is_retryable() {
            tracing::warn!("Sync failed: {error}");
            return;
        }

        let (retry_count, failures) = {
            let mut session = self.session();
            session.retry_count += 1;
            session.consecutive_failures += 1;
            (session.retry_count, session.consecutive_failures)
        };

        if failures >= self.config.max_consecutive_failures {
            self.session().local_only = true;
            tracing::warn!("Sync failed {failures} times in a row; switching to local-only mode");
            self.events.emit(&SyncEvent::error(
                "Sync paused after repeated failures; changes are kept on this device",
            ));
            return;
        }

        let delay = backoff_delay(retry_count, self.config.retry_base, self.config.retry_cap);
        tracing::info!("Sync failed ({error}); retry {retry_count} in {delay:?}");
        let weak: Weak<Self> = Arc::downgrade(self);
        self.scheduler.schedule(
            delay,
            Box::new(move || {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let sender = inner
                    .triggers
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                match sender {
                    Some(sender) => {
                        sender.send(Trigger::Retry).ok();
                    }
                    None => tracing::debug!("Retry due but the sync driver is not running"),
                }
            }),
        );
    }
}
