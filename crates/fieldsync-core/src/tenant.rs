//! Tenant data isolation: the only sanctioned bulk-delete path.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;

use crate::error::StoreError;
use crate::models::TenantContext;
use crate::queue::SyncQueue;
use crate::store::{keys, LocalStore};
use crate::sync::SyncGate;
use crate::util::normalize_text_option;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Step of the wipe sequence, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WipeStage {
    Marker,
    Store,
    Queue,
    Cache,
    TenantPointer,
}

impl fmt::Display for WipeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Marker => "wipe marker",
            Self::Store => "local store",
            Self::Queue => "sync queue",
            Self::Cache => "session cache",
            Self::TenantPointer => "tenant pointer",
        })
    }
}

#[derive(Debug, Error)]
pub enum TenantError {
    #[error("Tenant wipe failed at {stage}: {source}")]
    WipeFailed {
        stage: WipeStage,
        #[source]
        source: BoxError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Invalid tenant id: {0}")]
    InvalidTenantId(String),
}

/// Ephemeral per-session data cleared alongside the store on a tenant switch.
pub trait SessionCache: Send + Sync {
    fn clear(&self) -> Result<(), BoxError>;
}

/// Process-local JSON cache.
#[derive(Debug, Default)]
pub struct MemorySessionCache {
    entries: Mutex<HashMap<String, serde_json::Value>>,
}

impl MemorySessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, value: serde_json::Value) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionCache for MemorySessionCache {
    fn clear(&self) -> Result<(), BoxError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }
}

fn at(stage: WipeStage) -> impl FnOnce(StoreError) -> TenantError {
    move |error| TenantError::WipeFailed {
        stage,
        source: Box::new(error),
    }
}

/// Detects tenant switches and wipes tenant data across store, queue and cache.
#[derive(Clone)]
pub struct TenantManager {
    store: LocalStore,
    queue: SyncQueue,
    cache: Arc<dyn SessionCache>,
    gate: SyncGate,
}

impl TenantManager {
    pub fn new(
        store: LocalStore,
        queue: SyncQueue,
        cache: Arc<dyn SessionCache>,
        gate: SyncGate,
    ) -> Self {
        Self {
            store,
            queue,
            cache,
            gate,
        }
    }

    pub async fn context(&self) -> Result<TenantContext, TenantError> {
        Ok(TenantContext {
            current_tenant_id: self.store.get_setting(keys::CURRENT_TENANT_ID).await?,
            previous_tenant_id: self.store.get_setting(keys::PREVIOUS_TENANT_ID).await?,
        })
    }

    /// Make `new_tenant_id` the active tenant, wiping local data first when
    /// the store holds another tenant's data. Returns whether a wipe ran.
    ///
    /// Waits for any running sync session and blocks new ones until done.
    pub async fn handle_tenant_change(&self, new_tenant_id: &str) -> Result<bool, TenantError> {
        let tenant = normalize_text_option(Some(new_tenant_id.to_string()))
            .ok_or_else(|| TenantError::InvalidTenantId("tenant id must not be empty".into()))?;

        let _permit = self.gate.acquire().await;
        let context = self.context().await?;
        if !context.requires_wipe_for(&tenant) {
            self.remember(&tenant).await.map_err(at(WipeStage::TenantPointer))?;
            return Ok(false);
        }

        tracing::info!(
            "Tenant changed from {} to {tenant}; wiping local data",
            context.previous_tenant_id.as_deref().unwrap_or("unknown")
        );
        self.wipe(&tenant).await?;
        Ok(true)
    }

    /// Finish a wipe that a crash interrupted. Call once at boot.
    pub async fn recover_interrupted_wipe(&self) -> Result<bool, TenantError> {
        let _permit = self.gate.acquire().await;
        let Some(tenant) = self.store.get_setting(keys::TENANT_WIPE_PENDING).await? else {
            return Ok(false);
        };
        tracing::warn!("Resuming interrupted wipe for tenant {tenant}");
        self.wipe(&tenant).await?;
        Ok(true)
    }

    /// Caller holds the gate.
    async fn wipe(&self, tenant: &str) -> Result<(), TenantError> {
        self.store
            .set_setting(keys::TENANT_WIPE_PENDING, tenant)
            .await
            .map_err(at(WipeStage::Marker))?;
        self.store.clear_all().await.map_err(at(WipeStage::Store))?;
        self.queue.clear().await.map_err(at(WipeStage::Queue))?;
        self.cache
            .clear()
            .map_err(|source| TenantError::WipeFailed {
                stage: WipeStage::Cache,
                source,
            })?;
        self.remember(tenant)
            .await
            .map_err(at(WipeStage::TenantPointer))?;
        self.store
            .remove_setting(keys::TENANT_WIPE_PENDING)
            .await
            .map_err(at(WipeStage::TenantPointer))?;
        tracing::info!("Local data wiped for tenant {tenant}");
        Ok(())
    }

    async fn remember(&self, tenant: &str) -> Result<(), StoreError> {
        self.store.set_setting(keys::CURRENT_TENANT_ID, tenant).await?;
        self.store.set_setting(keys::PREVIOUS_TENANT_ID, tenant).await
    }
}
