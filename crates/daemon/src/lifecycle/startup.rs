// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup and initialization logic.

use std::fs::File;
use std::io::Write;
use std::sync::Arc;

use fs2::FileExt;
use hive_core::SystemClock;
use hive_engine::Kernel;
use tokio::net::UnixListener;
use tracing::info;

use super::{Config, LifecycleError};

/// Everything the main loop needs after a successful start.
pub struct StartupResult {
    pub kernel: Arc<Kernel<SystemClock>>,
    pub listener: UnixListener,
    /// Held for the process lifetime; dropping releases the exclusive lock.
    pub lock_file: File,
}

impl std::fmt::Debug for StartupResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartupResult").finish_non_exhaustive()
    }
}

/// Start the daemon: lock, directories, kernel, socket (bind last).
pub async fn startup(config: &Config) -> Result<StartupResult, LifecycleError> {
    match startup_inner(config).await {
        Ok(result) => Ok(result),
        Err(e) => {
            // Don't clean up if we failed to acquire the lock —
            // those files belong to the already-running daemon.
            if !matches!(e, LifecycleError::LockFailed(_)) {
                super::cleanup(config);
            }
            Err(e)
        }
    }
}

async fn startup_inner(config: &Config) -> Result<StartupResult, LifecycleError> {
    // 1. State directory first (socket, lock and logs live there)
    std::fs::create_dir_all(&config.state_dir)?;

    // 2. Acquire the lock file before touching anything else.
    // Open without truncating so a losing race never wipes the winner's PID.
    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&config.lock_path)?;
    lock_file.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;

    // Write PID now that we hold the lock
    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;
    let lock_file = lock_file;

    // 3. Version file for already-running diagnostics
    std::fs::write(&config.version_path, crate::env::PROTOCOL_VERSION)?;

    // 4. Data directories + kernel (opens the event log with recovery)
    std::fs::create_dir_all(&config.kernel.data_dir)?;
    let kernel = Arc::new(Kernel::start(config.kernel.clone())?);
    info!(
        last_event_id = kernel.events().last_id(),
        "kernel up, event log recovered"
    );

    // 5. Remove a stale socket and bind LAST, once everything else works
    if config.socket_path.exists() {
        std::fs::remove_file(&config.socket_path)?;
    }
    let listener = UnixListener::bind(&config.socket_path)
        .map_err(|e| LifecycleError::BindFailed(config.socket_path.clone(), e))?;

    Ok(StartupResult { kernel, listener, lock_file })
}
