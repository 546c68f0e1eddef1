// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hot-swap engine with a watchdog-enforced rollback window.
//!
//! `swap` replaces a running worker's module in place; the worker picks the
//! new code up on its next dispatch and runs the migration hook. A watchdog
//! then observes the event stream for `rollback_window_ms`: a crash of the
//! swapped service reinstalls the eagerly captured pre-swap module and the
//! supervisor restart brings the worker back on old code. Concurrent swaps
//! of the same key fail fast.
//!
//! The watchdog holds `(tenant, service)` and works through the module
//! store and registry — no direct worker references, no cycles.

use crate::deploy::{Deployer, KillOptions};
use crate::error::EngineError;
use crate::events::EventStore;
use crate::module::{ModuleStore, ServiceFactory, ServiceModule};
use crate::registry::Registry;
use hive_core::{payload, Clock, EventId, EventType, ServiceKey, Subject};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Swap parameters.
#[derive(Debug, Clone, Copy)]
pub struct SwapOptions {
    pub rollback_window_ms: u64,
}

impl Default for SwapOptions {
    fn default() -> Self {
        Self { rollback_window_ms: 30_000 }
    }
}

pub struct HotSwap<C: Clock> {
    events: Arc<EventStore<C>>,
    registry: Arc<Registry>,
    modules: Arc<ModuleStore>,
    factory: Arc<dyn ServiceFactory>,
    deployer: Arc<Deployer<C>>,
    in_flight: Arc<Mutex<HashSet<ServiceKey>>>,
}

impl<C: Clock> HotSwap<C> {
    pub fn new(
        events: Arc<EventStore<C>>,
        registry: Arc<Registry>,
        modules: Arc<ModuleStore>,
        factory: Arc<dyn ServiceFactory>,
        deployer: Arc<Deployer<C>>,
    ) -> Self {
        Self {
            events,
            registry,
            modules,
            factory,
            deployer,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Replace the code of a running service in place.
    pub async fn swap(
        &self,
        key: &ServiceKey,
        code: &str,
        opts: SwapOptions,
    ) -> Result<EventId, EngineError> {
        // Serialize swaps per key: the second caller fails fast.
        if !self.in_flight.lock().insert(key.clone()) {
            return Err(EngineError::Transient(format!("swap already in progress for {key}")));
        }
        match self.swap_inner(key, code, opts).await {
            Ok(id) => Ok(id),
            Err(e) => {
                self.in_flight.lock().remove(key);
                Err(e)
            }
        }
    }

    async fn swap_inner(
        &self,
        key: &ServiceKey,
        code: &str,
        opts: SwapOptions,
    ) -> Result<EventId, EngineError> {
        if self.registry.lookup(key).is_none() {
            return Err(EngineError::not_found(key));
        }

        let namespace = key.namespace();
        let subject = Subject::service(key.tenant.clone(), key.service.clone());

        // Snapshot the pre-swap module eagerly so rollback always has it.
        let old_module = self
            .modules
            .current(&namespace)
            .ok_or_else(|| EngineError::not_found(key))?;

        let new_module = match self.factory.compile(code, &namespace) {
            Ok(m) => m,
            Err(e) => {
                self.events.emit(
                    EventType::HotSwapFailed,
                    subject,
                    payload! { "error" => e.to_string() },
                );
                return Err(EngineError::InvalidInput(e.to_string()));
            }
        };

        // Subscribe before installing so a crash right after the swap is
        // never missed.
        let (sub_id, sub_rx) = self.events.subscribe();

        if self.modules.swap(&namespace, new_module).is_none() {
            self.events.unsubscribe(sub_id);
            return Err(EngineError::Transient(format!("module slot vanished for {key}")));
        }

        let started = self.events.emit(
            EventType::HotSwapStarted,
            subject,
            payload! { "rollback_window_ms" => opts.rollback_window_ms },
        );
        info!(key = %key, window_ms = opts.rollback_window_ms, "hot swap started");

        tokio::spawn(watchdog(WatchdogCtx {
            events: Arc::clone(&self.events),
            modules: Arc::clone(&self.modules),
            deployer: Arc::clone(&self.deployer),
            in_flight: Arc::clone(&self.in_flight),
            key: key.clone(),
            namespace,
            old_module,
            window: Duration::from_millis(opts.rollback_window_ms),
            started,
            sub_id,
            sub_rx,
        }));

        Ok(started)
    }

    /// The safe variant: kill, then deploy the new code.
    pub async fn replace(&self, key: &ServiceKey, code: &str) -> Result<(), EngineError> {
        self.deployer.kill(key, KillOptions::default()).await?;
        self.deployer.deploy(key, code, "native").await?;
        self.events.emit(
            EventType::HotSwapSucceeded,
            Subject::service(key.tenant.clone(), key.service.clone()),
            payload! { "method" => "simple_replace" },
        );
        Ok(())
    }
}

struct WatchdogCtx<C: Clock> {
    events: Arc<EventStore<C>>,
    modules: Arc<ModuleStore>,
    deployer: Arc<Deployer<C>>,
    in_flight: Arc<Mutex<HashSet<ServiceKey>>>,
    key: ServiceKey,
    namespace: String,
    old_module: Arc<ServiceModule>,
    window: Duration,
    started: EventId,
    sub_id: crate::events::SubscriberId,
    sub_rx: tokio::sync::mpsc::Receiver<Arc<hive_core::EventRecord>>,
}

/// Armed watchdog: worker crash within the window rolls back, window expiry
/// succeeds. Both outcomes are terminal and cancel the other arm.
async fn watchdog<C: Clock>(mut ctx: WatchdogCtx<C>) {
    let deadline = tokio::time::sleep(ctx.window);
    tokio::pin!(deadline);

    let rolled_back = loop {
        tokio::select! {
            _ = &mut deadline => break false,

            event = ctx.sub_rx.recv() => match event {
                Some(e)
                    if e.event_type == EventType::ServiceCrashed
                        && e.tenant() == Some(&ctx.key.tenant)
                        && e.service() == Some(&ctx.key.service) =>
                {
                    break true;
                }
                Some(_) => continue,
                // Store dropped (shutdown): nothing left to guard.
                None => break false,
            },
        }
    };

    let subject = Subject::service(ctx.key.tenant.clone(), ctx.key.service.clone());
    if rolled_back {
        warn!(key = %ctx.key, "worker crashed inside rollback window, reverting");
        ctx.modules.restore(&ctx.namespace, Arc::clone(&ctx.old_module));
        // The supervisor restart picks the restored module up; if the crash
        // loop already gave up, respawn from the old code.
        if let Err(e) = ctx.deployer.ensure_running(&ctx.key).await {
            warn!(key = %ctx.key, error = %e, "rollback respawn failed");
        }
        ctx.events.emit_caused(
            EventType::HotSwapRolledBack,
            subject,
            payload! {},
            ctx.started,
        );
    } else {
        ctx.events.emit_caused(
            EventType::HotSwapSucceeded,
            subject,
            payload! { "method" => "in_place" },
            ctx.started,
        );
    }

    ctx.events.unsubscribe(ctx.sub_id);
    ctx.in_flight.lock().remove(&ctx.key);
}

#[cfg(test)]
#[path = "hotswap_tests.rs"]
mod tests;
