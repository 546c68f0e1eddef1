// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Kernel facade: the transport-agnostic operations gateways call.
//!
//! Wires the control-plane components together and applies admission
//! control in front of the mutating paths. Gateways translate these results
//! into protocol status; nothing here knows about sockets.

use crate::breaker::{BreakerConfig, BreakerSet};
use crate::capability::{CapabilityManager, Grant};
use crate::deploy::{Deployer, KillOptions};
use crate::error::EngineError;
use crate::events::{EventStore, SubscriberId};
use crate::hotswap::{HotSwap, SwapOptions};
use crate::metrics::KernelMetrics;
use crate::module::{ModuleStore, NativeFactory, ServiceFactory};
use crate::registry::Registry;
use crate::shed::LoadShedder;
use crate::supervisor::SupervisorTree;
use crate::vault::Vault;
use hive_core::{
    payload, Clock, EventFilter, EventRecord, KernelConfig, ServiceKey, ServiceName, Subject,
    SystemClock, TenantId,
};
use hive_storage::{RetentionLimits, VaultFile};
use hive_wire::{HealthSummary, ServiceInfo, ServiceStatusEntry, ShedStatsSummary};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;
use zeroize::Zeroizing;

/// Interned module-namespace budget.
const NAMESPACE_CAPACITY: usize = 4096;

pub struct Kernel<C: Clock> {
    pub config: Arc<KernelConfig>,
    events: Arc<EventStore<C>>,
    registry: Arc<Registry>,
    modules: Arc<ModuleStore>,
    supervisor: Arc<SupervisorTree<C>>,
    deployer: Arc<Deployer<C>>,
    hotswap: HotSwap<C>,
    capabilities: CapabilityManager<C>,
    vault: Vault<C>,
    shedder: Arc<LoadShedder>,
    breakers: BreakerSet<C>,
    metrics: Arc<KernelMetrics>,
}

impl Kernel<SystemClock> {
    /// Start a kernel with the system clock and the native module factory.
    pub fn start(config: KernelConfig) -> Result<Self, EngineError> {
        Self::with_clock(config, SystemClock::new(), Arc::new(NativeFactory::with_defaults()))
    }
}

impl<C: Clock> Kernel<C> {
    pub fn with_clock(
        config: KernelConfig,
        clock: C,
        factory: Arc<dyn ServiceFactory>,
    ) -> Result<Self, EngineError> {
        let config = Arc::new(config);

        let events = Arc::new(
            EventStore::open(&config.events_db, RetentionLimits::default(), clock.clone())
                .map_err(|e| EngineError::Fatal(format!("event store open failed: {e}")))?,
        );
        let vault_file = VaultFile::open(&config.vault_db.join("secrets.jsonl"))
            .map_err(|e| EngineError::Fatal(format!("vault open failed: {e}")))?;
        std::fs::create_dir_all(&config.cert_dir)
            .map_err(|e| EngineError::Fatal(format!("cert dir unavailable: {e}")))?;

        let registry = Arc::new(Registry::new());
        let modules = Arc::new(ModuleStore::new(NAMESPACE_CAPACITY));
        let supervisor = Arc::new(SupervisorTree::new(
            Arc::clone(&events),
            Arc::clone(&registry),
            Arc::clone(&modules),
            config.max_tenants,
            clock.clone(),
        ));
        let deployer = Arc::new(Deployer::new(
            Arc::clone(&events),
            Arc::clone(&registry),
            Arc::clone(&modules),
            Arc::clone(&factory),
            Arc::clone(&supervisor),
        ));
        let hotswap = HotSwap::new(
            Arc::clone(&events),
            Arc::clone(&registry),
            Arc::clone(&modules),
            factory,
            Arc::clone(&deployer),
        );
        let capabilities = CapabilityManager::new(Arc::clone(&events), clock.clone());
        let vault = Vault::new(Arc::clone(&events), vault_file);
        let shedder = Arc::new(LoadShedder::new(Arc::clone(&config)));
        let breakers = BreakerSet::new(Arc::clone(&events), clock, BreakerConfig::default());
        let metrics = KernelMetrics::new();
        metrics.attach(&events);

        events.emit(hive_core::EventType::SystemStarted, Subject::System, payload! {});
        info!("kernel started");

        Ok(Self {
            config,
            events,
            registry,
            modules,
            supervisor,
            deployer,
            hotswap,
            capabilities,
            vault,
            shedder,
            breakers,
            metrics,
        })
    }

    fn key(&self, tenant: &TenantId, service: &str) -> Result<ServiceKey, EngineError> {
        Ok(ServiceKey::new(tenant.clone(), ServiceName::new(service)?))
    }

    /// Run `op` holding an admission permit for `tenant`.
    async fn with_admission<T, Fut>(
        &self,
        tenant: &TenantId,
        op: impl FnOnce() -> Fut,
    ) -> Result<T, EngineError>
    where
        Fut: Future<Output = Result<T, EngineError>>,
    {
        let permit = self.shedder.acquire(tenant)?;
        let result = op().await;
        self.shedder.release(permit);
        result
    }

    // -- lifecycle ops --

    pub async fn deploy(
        &self,
        tenant: &TenantId,
        service: &str,
        code: &str,
        format: &str,
    ) -> Result<ServiceStatusEntry, EngineError> {
        let key = self.key(tenant, service)?;
        self.with_admission(tenant, || self.deployer.deploy(&key, code, format)).await
    }

    pub async fn kill(
        &self,
        tenant: &TenantId,
        service: &str,
        opts: KillOptions,
    ) -> Result<(), EngineError> {
        let key = self.key(tenant, service)?;
        self.with_admission(tenant, || self.deployer.kill(&key, opts)).await
    }

    pub fn status(
        &self,
        tenant: &TenantId,
        service: &str,
    ) -> Result<ServiceStatusEntry, EngineError> {
        let key = self.key(tenant, service)?;
        self.deployer.status(&key)
    }

    pub fn list(&self, tenant: &TenantId) -> Vec<ServiceInfo> {
        self.deployer.list(tenant)
    }

    // -- hot swap --

    pub async fn swap(
        &self,
        tenant: &TenantId,
        service: &str,
        code: &str,
        opts: SwapOptions,
    ) -> Result<(), EngineError> {
        let key = self.key(tenant, service)?;
        self.with_admission(tenant, || async {
            self.hotswap.swap(&key, code, opts).await.map(|_| ())
        })
        .await
    }

    pub async fn replace(
        &self,
        tenant: &TenantId,
        service: &str,
        code: &str,
    ) -> Result<(), EngineError> {
        let key = self.key(tenant, service)?;
        self.with_admission(tenant, || self.hotswap.replace(&key, code)).await
    }

    // -- events --

    pub fn stream(&self, filter: &EventFilter) -> Vec<EventRecord> {
        self.events.stream(filter)
    }

    /// Live subscription for `WatchEvents`. Caller filters frames.
    pub fn watch(&self) -> (SubscriberId, mpsc::Receiver<Arc<EventRecord>>) {
        self.events.subscribe()
    }

    pub fn unwatch(&self, id: SubscriberId) {
        self.events.unsubscribe(id);
    }

    // -- capabilities --

    pub fn grant_capability(
        &self,
        tenant: &TenantId,
        resource: &str,
        permissions: Vec<String>,
        ttl_seconds: u64,
    ) -> Grant {
        self.capabilities.grant(tenant, resource, permissions, ttl_seconds)
    }

    pub fn verify_capability(
        &self,
        token: &str,
        resource: &str,
        permission: &str,
    ) -> Result<(), EngineError> {
        self.capabilities.verify(token, resource, permission).map_err(Into::into)
    }

    pub fn revoke_capability(&self, token_hash: &str) {
        self.capabilities.revoke(token_hash);
    }

    // -- secrets --

    pub fn set_secret(
        &self,
        tenant: &TenantId,
        name: &str,
        value: &[u8],
        master_key: &[u8],
    ) -> Result<(), EngineError> {
        self.vault.store(tenant, name, value, master_key)
    }

    pub fn get_secret(
        &self,
        tenant: &TenantId,
        name: &str,
        master_key: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, EngineError> {
        self.vault.retrieve(tenant, name, master_key)
    }

    pub fn delete_secret(&self, tenant: &TenantId, name: &str) -> Result<(), EngineError> {
        self.vault.revoke(tenant, name)
    }

    pub fn list_secrets(&self, tenant: &TenantId) -> Vec<String> {
        self.vault.list_secrets(tenant)
    }

    // -- discovery --

    pub fn register_service(
        &self,
        tenant: &TenantId,
        service: &str,
        name: String,
        tags: Vec<String>,
    ) -> Result<(), EngineError> {
        let key = self.key(tenant, service)?;
        self.registry.set_discovery(&key, name, tags)
    }

    pub fn discover_service(
        &self,
        tenant: &TenantId,
        name: &str,
        tags: &[String],
    ) -> Vec<ServiceInfo> {
        self.registry
            .discover(tenant, name, tags)
            .into_iter()
            .map(|(key, handle, meta)| ServiceInfo {
                tenant: key.tenant.to_string(),
                service: key.service.to_string(),
                worker_id: handle.worker_id.to_string(),
                alive: handle.alive(),
                registered_name: Some(meta.name),
                tags: meta.tags,
            })
            .collect()
    }

    pub fn get_services(&self, tenant: &TenantId, name: Option<&str>) -> Vec<ServiceInfo> {
        self.registry
            .services(tenant, name)
            .into_iter()
            .map(|(key, handle, meta)| ServiceInfo {
                tenant: key.tenant.to_string(),
                service: key.service.to_string(),
                worker_id: handle.worker_id.to_string(),
                alive: handle.alive(),
                registered_name: Some(meta.name),
                tags: meta.tags,
            })
            .collect()
    }

    // -- observability --

    pub fn shed_stats(&self) -> ShedStatsSummary {
        self.shedder.stats()
    }

    pub fn health(&self) -> HealthSummary {
        HealthSummary {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_ms: self.metrics.uptime_ms(),
            tenants: self.supervisor.tenant_count(),
            workers: self.registry.worker_count(),
            last_event_id: self.events.last_id(),
            storage_degraded: self.events.is_degraded(),
        }
    }

    pub fn metrics_text(&self) -> String {
        self.metrics.render(
            self.registry.worker_count(),
            self.supervisor.tenant_count(),
            self.events.last_id(),
        )
    }

    // -- shutdown --

    /// Drain every worker with `grace_ms`, then flush the log.
    pub async fn shutdown(&self, grace_ms: u64) {
        self.events.emit(
            hive_core::EventType::SystemShutdownStarted,
            Subject::System,
            payload! { "grace_ms" => grace_ms },
        );

        for key in self.registry.all_keys() {
            let opts = KillOptions { timeout_ms: grace_ms, force: true };
            if let Err(e) = self.deployer.kill(&key, opts).await {
                tracing::warn!(key = %key, error = %e, "shutdown kill failed");
            }
        }

        self.events.emit(
            hive_core::EventType::SystemShutdownComplete,
            Subject::System,
            payload! {},
        );
        self.events.flush();
        info!("kernel shut down");
    }

    // -- component access for gateways and tests --

    pub fn events(&self) -> &Arc<EventStore<C>> {
        &self.events
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn modules(&self) -> &Arc<ModuleStore> {
        &self.modules
    }

    pub fn shedder(&self) -> &Arc<LoadShedder> {
        &self.shedder
    }

    pub fn breakers(&self) -> &BreakerSet<C> {
        &self.breakers
    }

    /// Group-commit tick for the daemon's flush task.
    pub fn maintain(&self) {
        self.events.maintain();
    }
}

#[cfg(test)]
#[path = "kernel_tests.rs"]
mod tests;
