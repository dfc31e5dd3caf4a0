//! Connectivity monitor: raw link signal corrected by an active reachability probe.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::gateway::GatewayError;
use crate::util::normalize_http_base_url;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Server reachability as seen by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Online,
    Offline,
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Online => "online",
            Self::Offline => "offline",
        })
    }
}

/// Lightweight check that the backend answers.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn probe(&self) -> bool;
}

/// Probe that issues a `GET` to a health URL with a short timeout.
///
/// Any response below HTTP 500 counts as reachable.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    url: String,
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let url = normalize_http_base_url(url, "probe_url").map_err(GatewayError::InvalidConfiguration)?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| {
                GatewayError::InvalidConfiguration(format!(
                    "Failed to construct HTTP client: {error}"
                ))
            })?;
        Ok(Self { url, client })
    }
}

#[async_trait]
impl ReachabilityProbe for HttpProbe {
    async fn probe(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(response) => !response.status().is_server_error(),
            Err(error) => {
                tracing::debug!("Reachability probe failed: {error}");
                false
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectivityConfig {
    /// How long a raw "up" must hold before it is probed
    pub debounce: Duration,
    /// Periodic re-probe while the link is up
    pub probe_interval: Duration,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            probe_interval: DEFAULT_PROBE_INTERVAL,
        }
    }
}

/// Receiver side of the monitor's edge-triggered state.
#[derive(Debug, Clone)]
pub struct ConnectivityWatch {
    rx: watch::Receiver<Connectivity>,
}

impl ConnectivityWatch {
    pub fn current(&self) -> Connectivity {
        *self.rx.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.current() == Connectivity::Online
    }

    /// Wait for the next transition. `None` once the monitor is gone.
    pub async fn changed(&mut self) -> Option<Connectivity> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }

    /// Resolve once the state equals `state`. Pends forever if the monitor
    /// is dropped first.
    pub async fn wait_for(&mut self, state: Connectivity) {
        let reached = self
            .rx
            .wait_for(|current| *current == state)
            .await
            .map(|_| ());
        if reached.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

struct Inner {
    probe: Arc<dyn ReachabilityProbe>,
    config: ConnectivityConfig,
    state: watch::Sender<Connectivity>,
    link_up: AtomicBool,
    pending_check: Mutex<Option<JoinHandle<()>>>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    fn publish(&self, next: Connectivity) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            tracing::info!("Connectivity is now {next}");
        }
    }

    async fn check(&self) -> Connectivity {
        if !self.link_up.load(Ordering::SeqCst) {
            self.publish(Connectivity::Offline);
            return Connectivity::Offline;
        }
        let reachable = self.probe.probe().await;
        // a raw down observed during the probe wins
        let next = if reachable && self.link_up.load(Ordering::SeqCst) {
            Connectivity::Online
        } else {
            Connectivity::Offline
        };
        self.publish(next);
        next
    }
}

/// Tracks whether the backend is reachable and publishes transitions.
///
/// Starts offline until a raw link signal is reported.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    inner: Arc<Inner>,
}

impl ConnectivityMonitor {
    pub fn new(probe: Arc<dyn ReachabilityProbe>, config: ConnectivityConfig) -> Self {
        let (state, _) = watch::channel(Connectivity::Offline);
        Self {
            inner: Arc::new(Inner {
                probe,
                config,
                state,
                link_up: AtomicBool::new(false),
                pending_check: Mutex::new(None),
                ticker: Mutex::new(None),
            }),
        }
    }

    pub fn is_online(&self) -> bool {
        *self.inner.state.borrow() == Connectivity::Online
    }

    pub fn subscribe(&self) -> ConnectivityWatch {
        ConnectivityWatch {
            rx: self.inner.state.subscribe(),
        }
    }

    /// Feed the platform's raw link-layer signal.
    ///
    /// A drop is applied immediately. A raise is probed once it has held for
    /// the debounce window; a newer report supersedes a pending one. Must be
    /// called from within a tokio runtime.
    pub fn report_link_state(&self, up: bool) {
        self.inner.link_up.store(up, Ordering::SeqCst);

        let mut pending = self
            .inner
            .pending_check
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = pending.take() {
            handle.abort();
        }

        if !up {
            tracing::debug!("Raw link down");
            self.inner.publish(Connectivity::Offline);
            return;
        }

        tracing::debug!("Raw link up; probing after {:?}", self.inner.config.debounce);
        let inner = Arc::clone(&self.inner);
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(inner.config.debounce).await;
            inner.check().await;
        }));
    }

    /// Probe now and publish the result.
    pub async fn check_now(&self) -> Connectivity {
        self.inner.check().await
    }

    /// Start the periodic re-probe. Calling twice restarts it.
    pub fn start(&self) {
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(inner.config.probe_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                if inner.link_up.load(Ordering::SeqCst) {
                    inner.check().await;
                }
            }
        });

        let mut ticker = self
            .inner
            .ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = ticker.replace(handle) {
            previous.abort();
        }
    }

    /// Stop the periodic re-probe and any pending debounced check.
    pub fn shutdown(&self) {
        for slot in [&self.inner.ticker, &self.inner.pending_check] {
            if let Some(handle) = slot.lock().unwrap_or_else(PoisonError::into_inner).take() {
                handle.abort();
            }
        }
    }
}
