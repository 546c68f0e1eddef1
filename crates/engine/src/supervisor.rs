// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Supervisor tree: system tier → one sub-supervisor per tenant → workers.
//!
//! Each worker runs in its own tokio task; a per-worker monitor task awaits
//! the join handle, so panics in service code are contained at the task
//! boundary and surface as `service_crashed` events. Restart policy is
//! transient: abnormal exits restart, explicit kills do not. A rapid-crash
//! cap (3 restarts / 30 s) stops the loop and unregisters instead of
//! burning the host.
//!
//! Isolation contract: a crashing worker never touches other tenants; the
//! monitor cleans the registry within one notification.

use crate::error::EngineError;
use crate::events::EventStore;
use crate::module::ModuleStore;
use crate::registry::{Registry, WorkerHandle};
use crate::service::{ServiceError, StartOptions};
use crate::worker::{run_worker, WorkerCtx, WorkerExit, WorkerId, WorkerStats};
use hive_core::{payload, Clock, EventId, EventType, ServiceKey, ServiceName, Subject, TenantId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Worker mailbox depth
const MAILBOX_DEPTH: usize = 256;

/// Transient restart intensity: more than this many abnormal exits inside
/// [`RESTART_WINDOW`] gives up on the worker.
const MAX_RESTARTS: usize = 3;
const RESTART_WINDOW: Duration = Duration::from_secs(30);

/// Dynamic sub-supervisor for one tenant's workers.
struct TenantSupervisor {
    monitors: Mutex<HashMap<ServiceName, JoinHandle<()>>>,
}

impl TenantSupervisor {
    fn new() -> Self {
        Self { monitors: Mutex::new(HashMap::new()) }
    }
}

/// How a successful start is reported.
enum StartNotify {
    /// Deploy path: hand the live handle back to the deployer
    Ack(oneshot::Sender<Result<WorkerHandle, ServiceError>>),
    /// Restart path: emit `service_started` caused by the crash event
    Emit { caused_by: EventId },
}

pub struct SupervisorTree<C: Clock> {
    events: Arc<EventStore<C>>,
    registry: Arc<Registry>,
    modules: Arc<ModuleStore>,
    tenants: Mutex<HashMap<TenantId, Arc<TenantSupervisor>>>,
    max_tenants: usize,
    clock: C,
}

impl<C: Clock> SupervisorTree<C> {
    pub fn new(
        events: Arc<EventStore<C>>,
        registry: Arc<Registry>,
        modules: Arc<ModuleStore>,
        max_tenants: usize,
        clock: C,
    ) -> Self {
        Self {
            events,
            registry,
            modules,
            tenants: Mutex::new(HashMap::new()),
            max_tenants,
            clock,
        }
    }

    /// Sub-supervisor for a tenant, spawned on first use.
    fn tenant_supervisor(&self, tenant: &TenantId) -> Result<Arc<TenantSupervisor>, EngineError> {
        let mut tenants = self.tenants.lock();
        if let Some(sup) = tenants.get(tenant) {
            return Ok(Arc::clone(sup));
        }
        if tenants.len() >= self.max_tenants {
            return Err(EngineError::Overloaded(format!(
                "tenant limit reached ({})",
                self.max_tenants
            )));
        }
        let sup = Arc::new(TenantSupervisor::new());
        tenants.insert(tenant.clone(), Arc::clone(&sup));
        info!(tenant = %tenant, "tenant sub-supervisor created");
        Ok(sup)
    }

    /// Spawn a worker for `key` under its tenant sub-supervisor.
    ///
    /// Resolves once the program's `on_start` has run: `Ok(handle)` after a
    /// clean start (the worker has replaced the registry placeholder), `Err`
    /// when start failed. The monitor task keeps supervising afterwards.
    pub async fn spawn_worker(
        &self,
        key: &ServiceKey,
        generation: u64,
        opts: StartOptions,
    ) -> Result<WorkerHandle, EngineError> {
        let tenant_sup = self.tenant_supervisor(&key.tenant)?;
        let namespace = key.namespace();

        let swap_rx = self
            .modules
            .watch(&namespace)
            .ok_or_else(|| EngineError::Transient(format!("module not installed for {key}")))?;

        let (ack_tx, ack_rx) = oneshot::channel();
        let monitor = tokio::spawn(monitor_loop(MonitorCtx {
            events: Arc::clone(&self.events),
            registry: Arc::clone(&self.registry),
            modules: Arc::clone(&self.modules),
            key: key.clone(),
            namespace,
            generation,
            opts,
            swap_rx,
            clock: self.clock.clone(),
            first_notify: Some(StartNotify::Ack(ack_tx)),
        }));
        tenant_sup.monitors.lock().insert(key.service.clone(), monitor);

        match ack_rx.await {
            Ok(Ok(handle)) => Ok(handle),
            Ok(Err(e)) => Err(EngineError::InvalidInput(format!("service failed to start: {e}"))),
            Err(_) => Err(EngineError::Transient("worker start interrupted".to_string())),
        }
    }

    /// Drop the monitor bookkeeping for a stopped worker. Idempotent.
    pub fn forget_worker(&self, key: &ServiceKey) {
        let tenants = self.tenants.lock();
        if let Some(sup) = tenants.get(&key.tenant) {
            sup.monitors.lock().remove(&key.service);
        }
    }

    pub fn tenant_count(&self) -> usize {
        self.tenants.lock().len()
    }
}

struct MonitorCtx<C: Clock> {
    events: Arc<EventStore<C>>,
    registry: Arc<Registry>,
    modules: Arc<ModuleStore>,
    key: ServiceKey,
    namespace: String,
    generation: u64,
    opts: StartOptions,
    swap_rx: watch::Receiver<u64>,
    clock: C,
    first_notify: Option<StartNotify>,
}

/// Supervise one worker across incarnations.
async fn monitor_loop<C: Clock>(mut ctx: MonitorCtx<C>) {
    let mut crash_times: Vec<Instant> = Vec::new();
    let mut notify = ctx.first_notify.take();
    let cancel = CancellationToken::new();

    loop {
        let deploy_attempt = matches!(notify.as_ref(), Some(StartNotify::Ack(_)));
        let (mailbox_tx, mailbox_rx) = mpsc::channel(MAILBOX_DEPTH);
        let stats = Arc::new(WorkerStats::default());
        let handle = WorkerHandle::new(
            WorkerId::new(),
            ctx.key.clone(),
            ctx.generation,
            mailbox_tx,
            Arc::clone(&stats),
            cancel.clone(),
        );
        let started = Arc::new(AtomicBool::new(false));

        let worker_task = tokio::spawn(incarnation(
            Arc::clone(&ctx.events),
            Arc::clone(&ctx.registry),
            Arc::clone(&ctx.modules),
            handle.clone(),
            WorkerCtx {
                key: ctx.key.clone(),
                namespace: ctx.namespace.clone(),
                modules: Arc::clone(&ctx.modules),
                stats,
                cancel: cancel.clone(),
                mailbox: mailbox_rx,
                swap_rx: ctx.swap_rx.clone(),
                opts: ctx.opts.clone(),
            },
            notify.take(),
            Arc::clone(&started),
        ));
        handle.set_abort(worker_task.abort_handle());

        let exit = worker_task.await;
        let killed = cancel.is_cancelled();
        let started = started.load(Ordering::Acquire);

        let failure: Option<String> = match exit {
            Ok(WorkerExit::Stopped) => None,
            Ok(WorkerExit::Failed(e)) => Some(e.to_string()),
            Ok(WorkerExit::ReloadFailed(e)) => Some(format!("swap reload failed: {e}")),
            Err(join) if join.is_cancelled() => None,
            Err(_join) => Some("panicked".to_string()),
        };

        let Some(reason) = failure else {
            break;
        };

        if deploy_attempt && !started {
            // Start failure on the deploy path: the deployer reports it and
            // cleans up; nothing to supervise.
            break;
        }

        let now = ctx.clock.now();
        crash_times.push(now);
        crash_times.retain(|t| now.duration_since(*t) <= RESTART_WINDOW);
        let exhausted = crash_times.len() > MAX_RESTARTS;

        let crash_id = ctx.events.emit(
            EventType::ServiceCrashed,
            Subject::service(ctx.key.tenant.clone(), ctx.key.service.clone()),
            payload! {
                "reason" => reason.clone(),
                "restarts" => crash_times.len().saturating_sub(1),
                "restarts_exhausted" => exhausted,
            },
        );

        if killed {
            break;
        }
        if exhausted {
            warn!(key = %ctx.key, "restart intensity exceeded, giving up");
            break;
        }

        // Transient restart: fresh incarnation, state lost.
        notify = Some(StartNotify::Emit { caused_by: crash_id });
    }

    ctx.registry.unregister_generation(&ctx.key, ctx.generation);
}

/// Report a start failure to a waiting deployer, if any.
fn fail_start(notify: Option<StartNotify>, e: &ServiceError) {
    if let Some(StartNotify::Ack(ack)) = notify {
        let _ = ack.send(Err(e.clone()));
    }
}

/// One program incarnation inside its own task (panic boundary).
async fn incarnation<C: Clock>(
    events: Arc<EventStore<C>>,
    registry: Arc<Registry>,
    modules: Arc<ModuleStore>,
    handle: WorkerHandle,
    wctx: WorkerCtx,
    notify: Option<StartNotify>,
    started: Arc<AtomicBool>,
) -> WorkerExit {
    let module = match modules.current(&wctx.namespace) {
        Some(m) => m,
        None => {
            let e = ServiceError::Failed("module slot removed".to_string());
            fail_start(notify, &e);
            return WorkerExit::Failed(e);
        }
    };

    let mut program = match module.instantiate(wctx.opts.clone()) {
        Ok(p) => p,
        Err(e) => {
            fail_start(notify, &e);
            return WorkerExit::Failed(e);
        }
    };

    if let Err(e) = program.on_start().await {
        fail_start(notify, &e);
        return WorkerExit::Failed(e);
    }

    // Start-ok: the placeholder becomes a live handle.
    started.store(true, Ordering::Release);
    registry.promote(&wctx.key, handle.clone());

    match notify {
        Some(StartNotify::Ack(ack)) => {
            let _ = ack.send(Ok(handle));
        }
        Some(StartNotify::Emit { caused_by }) => {
            events.emit_caused(
                EventType::ServiceStarted,
                Subject::service(wctx.key.tenant.clone(), wctx.key.service.clone()),
                payload! { "restart" => true },
                caused_by,
            );
        }
        None => {}
    }

    run_worker(program, wctx).await
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
