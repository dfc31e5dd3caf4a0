//! In-process fakes for the gateway, retry scheduler and reachability probe.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::connectivity::{Connectivity, ConnectivityConfig, ConnectivityMonitor, ReachabilityProbe};
use crate::gateway::{GatewayError, RemoteGateway};
use crate::models::{Attachment, AttachmentRef, Collection, Record, RecordId};
use crate::sync::{RetryScheduler, Wake};

pub struct StaticProbe {
    reachable: AtomicBool,
    calls: AtomicUsize,
}

impl StaticProbe {
    pub fn new(reachable: bool) -> Self {
        Self {
            reachable: AtomicBool::new(reachable),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReachabilityProbe for StaticProbe {
    async fn probe(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reachable.load(Ordering::SeqCst)
    }
}

/// Monitor with an always-reachable probe and no debounce.
pub fn instant_monitor() -> ConnectivityMonitor {
    ConnectivityMonitor::new(
        Arc::new(StaticProbe::new(true)),
        ConnectivityConfig {
            debounce: Duration::ZERO,
            probe_interval: Duration::from_secs(3600),
        },
    )
}

pub async fn online_monitor() -> ConnectivityMonitor {
    let monitor = instant_monitor();
    monitor.report_link_state(true);
    monitor.subscribe().wait_for(Connectivity::Online).await;
    monitor
}

#[derive(Default)]
pub struct ManualScheduler {
    delays: Mutex<Vec<Duration>>,
    wakes: Mutex<Vec<Wake>>,
}

impl ManualScheduler {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }

    pub fn last_delay(&self) -> Option<Duration> {
        self.delays.lock().unwrap().last().copied()
    }

    pub fn pending(&self) -> usize {
        self.wakes.lock().unwrap().len()
    }

    /// Fire every pending wake-up now.
    pub fn fire_all(&self) {
        let wakes = std::mem::take(&mut *self.wakes.lock().unwrap());
        for wake in wakes {
            wake();
        }
    }
}

impl RetryScheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, wake: Wake) {
        self.delays.lock().unwrap().push(delay);
        self.wakes.lock().unwrap().push(wake);
    }

    fn cancel_all(&self) {
        self.wakes.lock().unwrap().clear();
    }
}

/// Scriptable in-memory backend.
#[derive(Default)]
pub struct FakeGateway {
    remote: Mutex<BTreeMap<(Collection, String), serde_json::Value>>,
    submissions: Mutex<Vec<(Collection, String)>>,
    deletions: Mutex<Vec<(Collection, String)>>,
    failures: Mutex<VecDeque<Option<GatewayError>>>,
    snapshots: Mutex<HashMap<Collection, Vec<Record>>>,
    snapshot_failures: Mutex<HashMap<Collection, String>>,
    fetches: Mutex<Vec<(Collection, Option<DateTime<Utc>>)>>,
    latency: Mutex<Duration>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next write calls, one error per call.
    pub fn fail_next(&self, errors: impl IntoIterator<Item = GatewayError>) {
        self.failures
            .lock()
            .unwrap()
            .extend(errors.into_iter().map(Some));
    }

    /// Let the next `count` write calls through before any scripted failure.
    pub fn succeed_next(&self, count: usize) {
        self.failures
            .lock()
            .unwrap()
            .extend(std::iter::repeat_with(|| None).take(count));
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn set_snapshot(&self, collection: Collection, records: Vec<Record>) {
        self.snapshots.lock().unwrap().insert(collection, records);
    }

    pub fn fail_snapshot(&self, collection: Collection, message: &str) {
        self.snapshot_failures
            .lock()
            .unwrap()
            .insert(collection, message.to_string());
    }

    pub fn submissions(&self) -> Vec<(Collection, String)> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn deletions(&self) -> Vec<(Collection, String)> {
        self.deletions.lock().unwrap().clone()
    }

    pub fn fetches(&self) -> Vec<(Collection, Option<DateTime<Utc>>)> {
        self.fetches.lock().unwrap().clone()
    }

    pub fn remote(&self, collection: Collection, id: &str) -> Option<serde_json::Value> {
        self.remote
            .lock()
            .unwrap()
            .get(&(collection, id.to_string()))
            .cloned()
    }

    async fn simulate(&self) -> Result<(), GatewayError> {
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        match self.failures.lock().unwrap().pop_front().flatten() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteGateway for FakeGateway {
    async fn fetch_collection(
        &self,
        collection: Collection,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Record>, GatewayError> {
        self.fetches.lock().unwrap().push((collection, since));
        if let Some(message) = self.snapshot_failures.lock().unwrap().get(&collection) {
            return Err(GatewayError::Network(message.clone()));
        }
        Ok(self
            .snapshots
            .lock()
            .unwrap()
            .get(&collection)
            .cloned()
            .unwrap_or_default())
    }

    async fn submit(&self, collection: Collection, record: &Record) -> Result<(), GatewayError> {
        self.simulate().await?;
        let key = (collection, record.id.to_string());
        self.submissions.lock().unwrap().push(key.clone());
        self.remote
            .lock()
            .unwrap()
            .insert(key, record.payload.clone());
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &RecordId) -> Result<(), GatewayError> {
        self.simulate().await?;
        let key = (collection, id.to_string());
        self.deletions.lock().unwrap().push(key.clone());
        self.remote.lock().unwrap().remove(&key);
        Ok(())
    }

    async fn upload_attachment(
        &self,
        attachment: &Attachment,
    ) -> Result<AttachmentRef, GatewayError> {
        self.simulate().await?;
        Ok(AttachmentRef::Url(format!(
            "https://files.test/{}",
            attachment.filename.as_deref().unwrap_or("blob")
        )))
    }
}
