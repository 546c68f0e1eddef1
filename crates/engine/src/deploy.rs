// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deployer: source text in, supervised worker out.
//!
//! Deploy pipeline: format gate → compile into the key's namespace →
//! registry reservation → spawn under the tenant sub-supervisor → promote
//! the reservation on start-ok. Failures unwind the reservation and the
//! module slot. Admission control happens at the kernel boundary before
//! the deployer runs.

use crate::error::EngineError;
use crate::events::EventStore;
use crate::module::{ModuleStore, ServiceFactory};
use crate::registry::{RegisterError, Registry, WorkerHandle};
use crate::service::StartOptions;
use crate::supervisor::SupervisorTree;
use hive_core::{payload, Clock, EventType, ServiceKey, Subject, TenantId};
use hive_wire::{ServiceInfo, ServiceStatusEntry};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// The only module format the native factory accepts.
const SUPPORTED_FORMAT: &str = "native";

/// Interned-namespace alarm threshold (fraction of capacity, in tenths).
const NAMESPACE_ALARM_TENTHS: usize = 9;

/// Kill escalation parameters.
#[derive(Debug, Clone, Copy)]
pub struct KillOptions {
    pub timeout_ms: u64,
    pub force: bool,
}

impl Default for KillOptions {
    fn default() -> Self {
        Self { timeout_ms: 5000, force: false }
    }
}

pub struct Deployer<C: Clock> {
    events: Arc<EventStore<C>>,
    registry: Arc<Registry>,
    modules: Arc<ModuleStore>,
    factory: Arc<dyn ServiceFactory>,
    supervisor: Arc<SupervisorTree<C>>,
}

impl<C: Clock> Deployer<C> {
    pub fn new(
        events: Arc<EventStore<C>>,
        registry: Arc<Registry>,
        modules: Arc<ModuleStore>,
        factory: Arc<dyn ServiceFactory>,
        supervisor: Arc<SupervisorTree<C>>,
    ) -> Self {
        Self { events, registry, modules, factory, supervisor }
    }

    /// Compile `code` and launch it as the worker for `key`.
    pub async fn deploy(
        &self,
        key: &ServiceKey,
        code: &str,
        format: &str,
    ) -> Result<ServiceStatusEntry, EngineError> {
        if format != SUPPORTED_FORMAT {
            return Err(EngineError::InvalidInput(format!(
                "unsupported module format {format:?} (expected {SUPPORTED_FORMAT:?})"
            )));
        }

        let namespace = key.namespace();
        let module = self
            .factory
            .compile(code, &namespace)
            .map_err(|e| EngineError::InvalidInput(e.to_string()))?;
        let source_hash = module.source_hash.clone();

        let generation = self.registry.reserve(key).map_err(|e| match e {
            RegisterError::AlreadyRegistered { .. } => {
                EngineError::AlreadyExists(key.to_string())
            }
        })?;

        self.modules.install(module);
        self.check_namespace_budget();

        let opts = StartOptions::new(key.clone(), serde_json::Value::Null);
        match self.supervisor.spawn_worker(key, generation, opts).await {
            Ok(handle) => {
                let subject = Subject::service(key.tenant.clone(), key.service.clone());
                let deployed = self.events.emit(
                    EventType::ServiceDeployed,
                    subject.clone(),
                    payload! {
                        "format" => format,
                        "worker" => handle.worker_id.to_string(),
                        "source_hash" => source_hash.clone(),
                    },
                );
                self.events.emit_caused(
                    EventType::ServiceStarted,
                    subject,
                    payload! { "worker" => handle.worker_id.to_string() },
                    deployed,
                );
                info!(
                    key = %key,
                    worker = %handle.worker_id,
                    hash = hive_core::short(&source_hash, 12),
                    "service deployed"
                );
                Ok(status_entry(key, &handle))
            }
            Err(e) => {
                self.registry.unregister_generation(key, generation);
                self.modules.remove(&namespace);
                self.supervisor.forget_worker(key);
                self.events.emit(
                    EventType::ServiceCrashed,
                    Subject::service(key.tenant.clone(), key.service.clone()),
                    payload! { "phase" => "deploy", "error" => e.to_string() },
                );
                Err(e)
            }
        }
    }

    /// Stop the worker for `key`: graceful signal, grace wait, optional
    /// hard termination.
    pub async fn kill(&self, key: &ServiceKey, opts: KillOptions) -> Result<(), EngineError> {
        let handle = self
            .registry
            .lookup(key)
            .ok_or_else(|| EngineError::not_found(key))?;

        handle.cancel.cancel();
        let grace = Duration::from_millis(opts.timeout_ms);
        let stopped = tokio::time::timeout(grace, handle.stopped()).await.is_ok();

        let mut forced = false;
        if !stopped && opts.force {
            handle.abort_hard();
            forced = true;
            let _ = tokio::time::timeout(Duration::from_secs(1), handle.stopped()).await;
        }

        self.registry.unregister(key);
        self.modules.remove(&key.namespace());
        self.supervisor.forget_worker(key);

        self.events.emit(
            EventType::ServiceKilled,
            Subject::service(key.tenant.clone(), key.service.clone()),
            payload! { "forced" => forced, "graceful_exit" => stopped },
        );
        info!(key = %key, forced, "service killed");
        Ok(())
    }

    /// Live status sample. Never cached.
    pub fn status(&self, key: &ServiceKey) -> Result<ServiceStatusEntry, EngineError> {
        let handle = self
            .registry
            .lookup(key)
            .ok_or_else(|| EngineError::not_found(key))?;
        Ok(status_entry(key, &handle))
    }

    /// Registry pass-through for one tenant.
    pub fn list(&self, tenant: &TenantId) -> Vec<ServiceInfo> {
        self.registry
            .list_for_tenant(tenant)
            .into_iter()
            .map(|(service, handle)| {
                let key = ServiceKey::new(tenant.clone(), service.clone());
                let meta = self.registry.discovery_meta(&key);
                ServiceInfo {
                    tenant: tenant.to_string(),
                    service: service.to_string(),
                    worker_id: handle.worker_id.to_string(),
                    alive: handle.alive(),
                    registered_name: meta.as_ref().map(|m| m.name.clone()),
                    tags: meta.map(|m| m.tags).unwrap_or_default(),
                }
            })
            .collect()
    }

    /// Respawn a worker for `key` from its currently installed module.
    ///
    /// Rollback path: the module slot was already restored; this brings the
    /// worker back if the crash loop gave up before the watchdog acted.
    pub async fn ensure_running(&self, key: &ServiceKey) -> Result<(), EngineError> {
        if self.registry.lookup(key).is_some() {
            return Ok(());
        }
        let generation = self.registry.reserve(key).map_err(|e| match e {
            RegisterError::AlreadyRegistered { .. } => {
                EngineError::AlreadyExists(key.to_string())
            }
        })?;
        let opts = StartOptions::new(key.clone(), serde_json::Value::Null);
        match self.supervisor.spawn_worker(key, generation, opts).await {
            Ok(_handle) => Ok(()),
            Err(e) => {
                self.registry.unregister_generation(key, generation);
                Err(e)
            }
        }
    }

    fn check_namespace_budget(&self) {
        let (used, capacity) = self.modules.usage();
        if capacity > 0 && used * 10 >= capacity * NAMESPACE_ALARM_TENTHS {
            self.events.emit(
                EventType::AtomUsageHigh,
                Subject::System,
                payload! { "used" => used, "capacity" => capacity },
            );
        }
    }
}

fn status_entry(key: &ServiceKey, handle: &WorkerHandle) -> ServiceStatusEntry {
    ServiceStatusEntry {
        service: key.service.to_string(),
        worker_id: handle.worker_id.to_string(),
        alive: handle.alive(),
        memory_bytes: handle.stats.memory_bytes(),
        queue_len: handle.stats.queue_len(),
        processed: handle.stats.processed(),
    }
}

#[cfg(test)]
#[path = "deploy_tests.rs"]
mod tests;
