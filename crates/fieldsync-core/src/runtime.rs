//! Wiring for the store, queue, connectivity monitor, orchestrator and
//! tenant manager behind one handle.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::FieldSyncConfig;
use crate::connectivity::{
    Connectivity, ConnectivityConfig, ConnectivityMonitor, HttpProbe, ReachabilityProbe,
};
use crate::error::{Error, Result};
use crate::gateway::{HttpGateway, RemoteGateway};
use crate::models::{Attachment, AttachmentRef, Collection, QueueEntry, Record, RecordId};
use crate::queue::SyncQueue;
use crate::state::SyncStatus;
use crate::store::LocalStore;
use crate::sync::{
    FullSyncReport, RetryScheduler, SyncConfig, SyncError, SyncGate, SyncOrchestrator,
    TokioRetryScheduler,
};
use crate::tenant::{MemorySessionCache, SessionCache, TenantManager};

/// Everything [`FieldSync`] needs that is not derived from the store.
pub struct Components {
    pub store: LocalStore,
    pub gateway: Arc<dyn RemoteGateway>,
    pub probe: Arc<dyn ReachabilityProbe>,
    pub scheduler: Arc<dyn RetryScheduler>,
    pub cache: Arc<dyn SessionCache>,
    pub sync: SyncConfig,
    pub connectivity: ConnectivityConfig,
}

/// Result of [`FieldSync::login`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    /// Local data belonged to another tenant and was wiped
    pub wiped: bool,
    /// `None` when offline at login
    pub full_sync: Option<FullSyncReport>,
    /// Whether the queue drain ran
    pub drained: bool,
}

#[derive(Clone)]
pub struct FieldSync {
    store: LocalStore,
    queue: SyncQueue,
    gateway: Arc<dyn RemoteGateway>,
    monitor: ConnectivityMonitor,
    orchestrator: SyncOrchestrator,
    tenants: TenantManager,
}

impl FieldSync {
    /// Build against the HTTP gateway described by `config`.
    pub fn from_config(config: &FieldSyncConfig, database_path: PathBuf) -> Result<Self> {
        config.validate().map_err(Error::Config)?;
        let api_url = config
            .api_url
            .as_deref()
            .ok_or_else(|| Error::Config("api_url is not configured".to_string()))?;

        let gateway = HttpGateway::new(api_url, config.api_token.clone(), config.request_timeout())?;
        let probe = HttpProbe::new(
            config.effective_probe_url().unwrap_or(api_url),
            config.probe_timeout(),
        )?;

        Ok(Self::from_components(Components {
            store: LocalStore::open_path(database_path, config.store_config()),
            gateway: Arc::new(gateway),
            probe: Arc::new(probe),
            scheduler: Arc::new(TokioRetryScheduler::new()),
            cache: Arc::new(MemorySessionCache::new()),
            sync: config.sync_config(),
            connectivity: config.connectivity_config(),
        }))
    }

    pub fn from_components(components: Components) -> Self {
        let Components {
            store,
            gateway,
            probe,
            scheduler,
            cache,
            sync,
            connectivity,
        } = components;

        let queue = SyncQueue::new(store.clone());
        let gate = SyncGate::new();
        let monitor = ConnectivityMonitor::new(probe, connectivity);
        let orchestrator = SyncOrchestrator::new(
            store.clone(),
            queue.clone(),
            Arc::clone(&gateway),
            monitor.subscribe(),
            scheduler,
            gate.clone(),
            sync,
        );
        let tenants = TenantManager::new(store.clone(), queue.clone(), cache, gate);

        Self {
            store,
            queue,
            gateway,
            monitor,
            orchestrator,
            tenants,
        }
    }

    /// Open the store and finish any interrupted tenant wipe.
    ///
    /// No background task is spawned; long-lived hosts follow up with
    /// [`FieldSync::start_background`].
    pub async fn init(&self) -> Result<()> {
        self.store.init().await?;
        if self.tenants.recover_interrupted_wipe().await? {
            tracing::info!("Recovered interrupted tenant wipe");
        }
        Ok(())
    }

    /// Spawn the periodic re-probe and the sync driver, which drains the
    /// queue on online edges, retry wake-ups and the auto-sync interval.
    /// Must be called from within a tokio runtime.
    pub fn start_background(&self) {
        self.monitor.start();
        self.orchestrator.start();
    }

    pub fn shutdown(&self) {
        self.orchestrator.shutdown();
        self.monitor.shutdown();
    }

    /// Record a raw link signal and probe immediately.
    pub async fn refresh_connectivity(&self, link_up: bool) -> Connectivity {
        self.monitor.report_link_state(link_up);
        self.monitor.check_now().await
    }

    /// Persist a record. Checklist writes, and any write made while
    /// offline, are also queued for upload.
    pub async fn save(&self, record: &Record) -> Result<Option<QueueEntry>> {
        if record.collection.tracks_sync() || !self.monitor.is_online() {
            return Ok(Some(self.store.write_and_enqueue(record).await?));
        }
        self.store.put(record).await?;
        Ok(None)
    }

    pub async fn remove(&self, collection: Collection, id: &RecordId) -> Result<Option<QueueEntry>> {
        if collection.tracks_sync() || !self.monitor.is_online() {
            return Ok(self.store.delete_and_enqueue(collection, id).await?);
        }
        self.store.delete(collection, id).await?;
        Ok(None)
    }

    /// Switch to `tenant_id`, refresh snapshots and drain the queue.
    ///
    /// The snapshot refresh is a first access when local data was wiped or
    /// no templates or vehicles are cached yet.
    pub async fn login(&self, tenant_id: &str) -> Result<LoginOutcome> {
        let wiped = self.tenants.handle_tenant_change(tenant_id).await?;
        if !self.monitor.is_online() {
            tracing::info!("Logged in offline; sync deferred until connectivity returns");
            return Ok(LoginOutcome {
                wiped,
                full_sync: None,
                drained: false,
            });
        }

        let first_access = wiped || self.snapshots_empty().await?;
        let report = self.orchestrator.perform_full_sync(first_access).await?;
        let drained = self.orchestrator.check_and_sync().await?;
        Ok(LoginOutcome {
            wiped,
            full_sync: Some(report),
            drained,
        })
    }

    pub async fn upload_attachment(&self, attachment: &Attachment) -> Result<AttachmentRef> {
        if !self.monitor.is_online() {
            return Err(SyncError::Offline.into());
        }
        Ok(self.gateway.upload_attachment(attachment).await?)
    }

    async fn snapshots_empty(&self) -> Result<bool> {
        for collection in Collection::SNAPSHOTS {
            if self.store.count(collection).await? > 0 {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn status(&self) -> SyncStatus {
        self.orchestrator.status()
    }

    pub const fn store(&self) -> &LocalStore {
        &self.store
    }

    pub const fn queue(&self) -> &SyncQueue {
        &self.queue
    }

    pub const fn monitor(&self) -> &ConnectivityMonitor {
        &self.monitor
    }

    pub const fn orchestrator(&self) -> &SyncOrchestrator {
        &self.orchestrator
    }

    pub const fn tenants(&self) -> &TenantManager {
        &self.tenants
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::keys;
    use crate::testing::{FakeGateway, ManualScheduler, StaticProbe};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;

    struct Harness {
        app: FieldSync,
        gateway: Arc<FakeGateway>,
        cache: Arc<MemorySessionCache>,
    }

    fn harness() -> Harness {
        let gateway = Arc::new(FakeGateway::new());
        let cache = Arc::new(MemorySessionCache::new());
        let app = FieldSync::from_components(Components {
            store: LocalStore::in_memory(),
            gateway: gateway.clone(),
            probe: Arc::new(StaticProbe::new(true)),
            scheduler: Arc::new(ManualScheduler::default()),
            cache: cache.clone(),
            sync: SyncConfig::default(),
            connectivity: ConnectivityConfig {
                debounce: Duration::ZERO,
                probe_interval: Duration::from_secs(3600),
            },
        });
        Harness {
            app,
            gateway,
            cache,
        }
    }

    fn record(collection: Collection, id: &str) -> Record {
        Record::new(collection, RecordId::new(id).unwrap(), json!({"name": id}))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn save_queues_checklists_and_offline_writes() {
        let harness = harness();
        harness.app.init().await.unwrap();

        assert!(harness
            .app
            .save(&record(Collection::Templates, "T1"))
            .await
            .unwrap()
            .is_some());

        harness.app.refresh_connectivity(true).await;
        assert!(harness
            .app
            .save(&record(Collection::Templates, "T2"))
            .await
            .unwrap()
            .is_none());
        assert!(harness
            .app
            .save(&record(Collection::Checklists, "C1"))
            .await
            .unwrap()
            .is_some());

        assert_eq!(harness.app.queue().pending_count().await.unwrap(), 2);
        harness.app.shutdown();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn login_as_new_tenant_wipes_and_downloads_snapshots() {
        let harness = harness();
        harness.app.init().await.unwrap();
        harness.app.refresh_connectivity(true).await;
        harness.app.login("acme").await.unwrap();
        harness
            .app
            .store()
            .put(&record(Collection::Vehicles, "acme-truck"))
            .await
            .unwrap();
        harness.cache.insert("draft", json!({"step": 2}));

        let mut snapshot = record(Collection::Vehicles, "globex-van");
        snapshot.synced = true;
        harness.gateway.set_snapshot(Collection::Vehicles, vec![snapshot]);

        let outcome = harness.app.login("globex").await.unwrap();
        assert!(outcome.wiped);
        let report = outcome.full_sync.unwrap();
        assert!(report.is_complete());

        let vehicles = harness.app.store().get_all(Collection::Vehicles).await.unwrap();
        let ids: Vec<_> = vehicles.iter().map(|record| record.id.to_string()).collect();
        assert_eq!(ids, vec!["globex-van"]);
        assert!(harness.cache.is_empty());
        assert_eq!(
            harness
                .app
                .store()
                .get_setting(keys::CURRENT_TENANT_ID)
                .await
                .unwrap()
                .as_deref(),
            Some("globex")
        );
        harness.app.shutdown();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn login_with_cached_snapshots_is_incremental() {
        let harness = harness();
        harness.app.init().await.unwrap();
        harness.app.refresh_connectivity(true).await;
        harness
            .gateway
            .set_snapshot(Collection::Templates, vec![record(Collection::Templates, "T1")]);

        harness.app.login("acme").await.unwrap();
        harness.app.login("acme").await.unwrap();

        let fetches = harness.gateway.fetches();
        let templates: Vec<_> = fetches
            .iter()
            .filter(|(collection, _)| *collection == Collection::Templates)
            .collect();
        assert_eq!(templates.len(), 2);
        assert!(templates[0].1.is_none());
        assert!(templates[1].1.is_some());
        harness.app.shutdown();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn login_offline_defers_sync() {
        let harness = harness();
        harness.app.init().await.unwrap();
        harness
            .app
            .save(&record(Collection::Checklists, "C1"))
            .await
            .unwrap();

        let outcome = harness.app.login("acme").await.unwrap();
        assert_eq!(
            outcome,
            LoginOutcome {
                wiped: false,
                full_sync: None,
                drained: false,
            }
        );
        assert!(harness.gateway.fetches().is_empty());
        assert_eq!(harness.app.queue().pending_count().await.unwrap(), 1);
        harness.app.shutdown();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn attachments_need_connectivity() {
        let harness = harness();
        harness.app.init().await.unwrap();
        let attachment = Attachment::new("image/png", vec![1, 2, 3])
            .unwrap()
            .with_filename("dent.png");

        let error = harness.app.upload_attachment(&attachment).await.unwrap_err();
        assert!(matches!(error, Error::Sync(SyncError::Offline)));

        harness.app.refresh_connectivity(true).await;
        let reference = harness.app.upload_attachment(&attachment).await.unwrap();
        assert_eq!(reference.as_str(), "https://files.test/dent.png");
        harness.app.shutdown();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn explicit_sync_after_init_is_not_preempted() {
        for _ in 0..10 {
            let harness = harness();
            harness.app.init().await.unwrap();
            harness
                .app
                .save(&record(Collection::Checklists, "C1"))
                .await
                .unwrap();
            harness.gateway.set_latency(Duration::from_millis(20));

            harness.app.refresh_connectivity(true).await;
            assert!(harness.app.orchestrator().check_and_sync().await.unwrap());
            harness.app.shutdown();

            assert_eq!(harness.app.queue().pending_count().await.unwrap(), 0);
            assert_eq!(harness.gateway.submissions().len(), 1);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn background_driver_drains_on_online_edge() {
        let harness = harness();
        harness.app.init().await.unwrap();
        harness.app.start_background();
        harness
            .app
            .save(&record(Collection::Checklists, "C1"))
            .await
            .unwrap();

        harness.app.refresh_connectivity(true).await;
        tokio::time::timeout(Duration::from_secs(2), async {
            while harness.app.status().last_sync_time.is_none() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(harness.app.queue().pending_count().await.unwrap(), 0);
        harness.app.shutdown();
    }

    #[test]
    fn from_config_requires_api_url() {
        let error = FieldSync::from_config(&FieldSyncConfig::default(), PathBuf::from("x.db"))
            .err()
            .unwrap();
        assert!(matches!(error, Error::Config(_)));
    }
}
