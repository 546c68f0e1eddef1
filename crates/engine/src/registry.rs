// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker registry: `(tenant, service)` → handle.
//!
//! The registry owns the uniqueness invariant — at most one live worker per
//! key. Deploys hold a `Reserved` placeholder from admission until the
//! worker starts; observers only ever see `Live` entries. Discovery
//! metadata (registered name + tags) rides on live entries.

use crate::error::EngineError;
use crate::service::ServiceMsg;
use crate::worker::{WorkerId, WorkerStats};
use hive_core::{ServiceKey, ServiceName, TenantId};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum RegisterError {
    #[error("already registered: {key} (existing worker {existing:?})")]
    AlreadyRegistered { key: ServiceKey, existing: Option<WorkerId> },
}

/// Cheaply cloneable reference to a live worker.
#[derive(Clone)]
pub struct WorkerHandle {
    pub worker_id: WorkerId,
    pub key: ServiceKey,
    /// Bumped on every (re)spawn of this key; stale handles carry old values
    pub generation: u64,
    mailbox: mpsc::Sender<ServiceMsg>,
    pub stats: Arc<WorkerStats>,
    pub cancel: CancellationToken,
    abort: Arc<Mutex<Option<AbortHandle>>>,
}

impl WorkerHandle {
    pub fn new(
        worker_id: WorkerId,
        key: ServiceKey,
        generation: u64,
        mailbox: mpsc::Sender<ServiceMsg>,
        stats: Arc<WorkerStats>,
        cancel: CancellationToken,
    ) -> Self {
        Self { worker_id, key, generation, mailbox, stats, cancel, abort: Arc::new(Mutex::new(None)) }
    }

    /// Whether the worker task is still draining its mailbox.
    pub fn alive(&self) -> bool {
        !self.mailbox.is_closed()
    }

    /// Enqueue a message (FIFO). Fails once the worker is gone.
    pub async fn send(&self, msg: ServiceMsg) -> Result<(), EngineError> {
        self.stats.queue_len.fetch_add(1, Ordering::Relaxed);
        match self.mailbox.send(msg).await {
            Ok(()) => Ok(()),
            Err(_) => {
                self.stats.queue_len.fetch_sub(1, Ordering::Relaxed);
                Err(EngineError::not_found(format!("worker for {} is gone", self.key)))
            }
        }
    }

    /// Wait until the worker task has dropped its mailbox.
    pub async fn stopped(&self) {
        self.mailbox.closed().await
    }

    pub(crate) fn set_abort(&self, handle: AbortHandle) {
        *self.abort.lock() = Some(handle);
    }

    /// Hard-terminate the worker task (kill escalation).
    pub fn abort_hard(&self) {
        if let Some(handle) = self.abort.lock().as_ref() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("worker_id", &self.worker_id)
            .field("key", &self.key)
            .field("generation", &self.generation)
            .field("alive", &self.alive())
            .finish()
    }
}

/// Registry slot for one key.
#[derive(Debug, Clone)]
pub enum RegistryEntry {
    /// Deploy in progress; blocks duplicate deploys
    Reserved { generation: u64 },
    Live(WorkerHandle),
}

/// Discovery metadata attached via `RegisterService`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryMeta {
    pub name: String,
    pub tags: Vec<String>,
}

struct RegistryInner {
    entries: HashMap<ServiceKey, RegistryEntry>,
    discovery: HashMap<ServiceKey, DiscoveryMeta>,
    next_generation: u64,
}

/// Process-wide worker registry.
pub struct Registry {
    inner: Mutex<RegistryInner>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                entries: HashMap::new(),
                discovery: HashMap::new(),
                next_generation: 1,
            }),
        }
    }

    /// Atomic check-and-insert of a deploy placeholder.
    ///
    /// Returns the generation the eventual worker must carry.
    pub fn reserve(&self, key: &ServiceKey) -> Result<u64, RegisterError> {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner.entries.get(key) {
            let existing = match existing {
                RegistryEntry::Live(handle) => Some(handle.worker_id),
                RegistryEntry::Reserved { .. } => None,
            };
            return Err(RegisterError::AlreadyRegistered { key: key.clone(), existing });
        }
        let generation = inner.next_generation;
        inner.next_generation += 1;
        inner.entries.insert(key.clone(), RegistryEntry::Reserved { generation });
        Ok(generation)
    }

    /// Replace a reservation (or a dead incarnation) with a live handle.
    pub fn promote(&self, key: &ServiceKey, handle: WorkerHandle) {
        let mut inner = self.inner.lock();
        inner.entries.insert(key.clone(), RegistryEntry::Live(handle));
    }

    /// Live worker handle for a key, if any.
    pub fn lookup(&self, key: &ServiceKey) -> Option<WorkerHandle> {
        let inner = self.inner.lock();
        match inner.entries.get(key) {
            Some(RegistryEntry::Live(handle)) => Some(handle.clone()),
            _ => None,
        }
    }

    /// Raw entry for a key (placeholders included).
    pub fn entry(&self, key: &ServiceKey) -> Option<RegistryEntry> {
        self.inner.lock().entries.get(key).cloned()
    }

    /// Remove a key. Idempotent.
    pub fn unregister(&self, key: &ServiceKey) {
        let mut inner = self.inner.lock();
        inner.entries.remove(key);
        inner.discovery.remove(key);
    }

    /// Remove a key only if it still belongs to `generation`.
    ///
    /// Supervisor cleanup races with redeploys; a stale notification must
    /// not evict a fresh worker.
    pub fn unregister_generation(&self, key: &ServiceKey, generation: u64) {
        let mut inner = self.inner.lock();
        let matches = match inner.entries.get(key) {
            Some(RegistryEntry::Live(handle)) => handle.generation == generation,
            Some(RegistryEntry::Reserved { generation: g }) => *g == generation,
            None => false,
        };
        if matches {
            inner.entries.remove(key);
            inner.discovery.remove(key);
        }
    }

    /// Services of one tenant. Snapshot; ordering stable within one call.
    pub fn list_for_tenant(&self, tenant: &TenantId) -> Vec<(ServiceName, WorkerHandle)> {
        let inner = self.inner.lock();
        let mut out: Vec<(ServiceName, WorkerHandle)> = inner
            .entries
            .iter()
            .filter(|(key, _)| &key.tenant == tenant)
            .filter_map(|(key, entry)| match entry {
                RegistryEntry::Live(handle) => Some((key.service.clone(), handle.clone())),
                RegistryEntry::Reserved { .. } => None,
            })
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Keys of every live worker (shutdown drain).
    pub fn all_keys(&self) -> Vec<ServiceKey> {
        let inner = self.inner.lock();
        inner
            .entries
            .iter()
            .filter(|(_, e)| matches!(e, RegistryEntry::Live(_)))
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Number of distinct tenants with at least one entry.
    pub fn tenant_count(&self) -> usize {
        let inner = self.inner.lock();
        inner.entries.keys().map(|k| &k.tenant).collect::<HashSet<_>>().len()
    }

    /// Number of live workers.
    pub fn worker_count(&self) -> usize {
        let inner = self.inner.lock();
        inner
            .entries
            .values()
            .filter(|e| matches!(e, RegistryEntry::Live(_)))
            .count()
    }

    /// Attach a discovery name and tags to a live entry.
    pub fn set_discovery(
        &self,
        key: &ServiceKey,
        name: String,
        tags: Vec<String>,
    ) -> Result<(), EngineError> {
        let mut inner = self.inner.lock();
        match inner.entries.get(key) {
            Some(RegistryEntry::Live(_)) => {
                inner.discovery.insert(key.clone(), DiscoveryMeta { name, tags });
                Ok(())
            }
            _ => Err(EngineError::not_found(key)),
        }
    }

    /// Registered services under `name`, narrowed to entries carrying every
    /// requested tag. Scoped to one tenant.
    pub fn discover(
        &self,
        tenant: &TenantId,
        name: &str,
        tags: &[String],
    ) -> Vec<(ServiceKey, WorkerHandle, DiscoveryMeta)> {
        let inner = self.inner.lock();
        inner
            .discovery
            .iter()
            .filter(|(key, meta)| {
                &key.tenant == tenant
                    && meta.name == name
                    && tags.iter().all(|t| meta.tags.contains(t))
            })
            .filter_map(|(key, meta)| match inner.entries.get(key) {
                Some(RegistryEntry::Live(handle)) => {
                    Some((key.clone(), handle.clone(), meta.clone()))
                }
                _ => None,
            })
            .collect()
    }

    /// Discovery metadata for a key, if registered.
    pub fn discovery_meta(&self, key: &ServiceKey) -> Option<DiscoveryMeta> {
        self.inner.lock().discovery.get(key).cloned()
    }

    /// All registered services for a tenant, optionally filtered by name.
    pub fn services(
        &self,
        tenant: &TenantId,
        name: Option<&str>,
    ) -> Vec<(ServiceKey, WorkerHandle, DiscoveryMeta)> {
        let inner = self.inner.lock();
        inner
            .discovery
            .iter()
            .filter(|(key, meta)| {
                &key.tenant == tenant && name.map(|n| meta.name == n).unwrap_or(true)
            })
            .filter_map(|(key, meta)| match inner.entries.get(key) {
                Some(RegistryEntry::Live(handle)) => {
                    Some((key.clone(), handle.clone(), meta.clone()))
                }
                _ => None,
            })
            .collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
