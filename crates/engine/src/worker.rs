// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The worker task: one per live service.
//!
//! A worker drains its FIFO mailbox into the service program, watches its
//! module slot for hot swaps, and exits on cancellation (explicit kill),
//! mailbox closure, or program failure. Panics inside the program escape
//! this loop and are contained by the supervisor's join handle.

use crate::module::ModuleStore;
use crate::service::{ServiceError, ServiceMsg, ServiceProgram, StartOptions};
use hive_core::ServiceKey;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

hive_core::define_id! {
    /// Identifies one worker incarnation.
    pub struct WorkerId("wrk-");
}

/// Live counters sampled by `status`. Shared between the worker task and
/// every handle clone.
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Messages waiting in the mailbox
    pub queue_len: AtomicUsize,
    /// Messages handled since this worker started
    pub processed: AtomicU64,
    /// Approximate bytes of exported program state
    pub memory_bytes: AtomicU64,
}

impl WorkerStats {
    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn memory_bytes(&self) -> u64 {
        self.memory_bytes.load(Ordering::Relaxed)
    }
}

/// Why a worker loop ended.
#[derive(Debug)]
pub enum WorkerExit {
    /// Explicit stop: cancellation or mailbox closure. Never restarted.
    Stopped,
    /// The program returned an error from a lifecycle hook.
    Failed(ServiceError),
    /// A hot-swap reload could not instantiate the replacement program.
    ReloadFailed(ServiceError),
}

/// Everything a worker task owns.
pub struct WorkerCtx {
    pub key: ServiceKey,
    pub namespace: String,
    pub modules: Arc<ModuleStore>,
    pub stats: Arc<WorkerStats>,
    pub cancel: CancellationToken,
    pub mailbox: mpsc::Receiver<ServiceMsg>,
    pub swap_rx: watch::Receiver<u64>,
    pub opts: StartOptions,
}

/// Drive `program` until it stops, fails, or is swapped away.
pub async fn run_worker(mut program: Box<dyn ServiceProgram>, mut ctx: WorkerCtx) -> WorkerExit {
    loop {
        tokio::select! {
            biased;

            _ = ctx.cancel.cancelled() => {
                program.on_stop().await;
                return WorkerExit::Stopped;
            }

            changed = ctx.swap_rx.changed() => {
                if changed.is_err() {
                    // Module slot dropped: the service is being torn down.
                    program.on_stop().await;
                    return WorkerExit::Stopped;
                }
                match reload(&mut program, &ctx).await {
                    Ok(()) => debug!(key = %ctx.key, "picked up swapped module"),
                    Err(e) => return WorkerExit::ReloadFailed(e),
                }
            }

            msg = ctx.mailbox.recv() => {
                match msg {
                    Some(msg) => {
                        ctx.stats.queue_len.fetch_sub(1, Ordering::Relaxed);
                        if let Err(e) = program.on_message(msg).await {
                            return WorkerExit::Failed(e);
                        }
                        ctx.stats.processed.fetch_add(1, Ordering::Relaxed);
                        let estimate = program
                            .snapshot()
                            .map(|v| v.to_string().len() as u64)
                            .unwrap_or(0);
                        ctx.stats.memory_bytes.store(estimate, Ordering::Relaxed);
                    }
                    None => {
                        program.on_stop().await;
                        return WorkerExit::Stopped;
                    }
                }
            }
        }
    }
}

/// Instantiate the replacement program, migrating exported state.
async fn reload(
    program: &mut Box<dyn ServiceProgram>,
    ctx: &WorkerCtx,
) -> Result<(), ServiceError> {
    let module = ctx
        .modules
        .current(&ctx.namespace)
        .ok_or_else(|| ServiceError::Failed("module slot removed".to_string()))?;

    let mut opts = ctx.opts.clone();
    opts.prior_state = program.snapshot();

    let mut next = module.instantiate(opts)?;
    next.on_start().await?;
    program.on_stop().await;
    *program = next;
    Ok(())
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
