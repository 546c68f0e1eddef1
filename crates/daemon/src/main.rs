// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hive daemon (hived)
//!
//! Long-running host process for the service kernel: owns the event log,
//! registry, supervisor tree, vault and backpressure layer, and exposes the
//! kernel operations over a Unix socket (plus optional TCP).

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod env;
mod lifecycle;
mod listener;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Notify;
use tracing::{error, info};

use crate::lifecycle::{Config, LifecycleError, StartupResult};
use crate::listener::{ListenCtx, Listener};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Handle info flags before any config/lock acquisition
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("hived {}", env::PROTOCOL_VERSION);
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("hived {}", env::PROTOCOL_VERSION);
                println!("Hive daemon - multi-tenant service kernel host");
                println!();
                println!("USAGE:");
                println!("    hived");
                println!();
                println!("The daemon is typically started by the `hive` CLI and should not");
                println!("be invoked directly. It listens on a Unix socket for commands.");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: hived [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = Config::load()?;

    rotate_log_if_needed(&config.log_path);
    write_startup_marker(&config)?;
    let log_guard = setup_logging(&config)?;

    info!("starting hived");

    let StartupResult { kernel, listener: unix_listener, lock_file } =
        match lifecycle::startup(&config).await {
            Ok(result) => result,
            Err(LifecycleError::LockFailed(_)) => {
                // Another daemon is already running — print a human-readable
                // message instead of a raw debug error.
                let pid = std::fs::read_to_string(&config.lock_path)
                    .unwrap_or_default()
                    .trim()
                    .to_string();
                let version = std::fs::read_to_string(&config.version_path)
                    .unwrap_or_default()
                    .trim()
                    .to_string();

                eprintln!("hived is already running");
                if !pid.is_empty() {
                    eprintln!("  pid: {pid}");
                }
                if !version.is_empty() {
                    eprintln!("  version: {version}");
                }
                std::process::exit(1);
            }
            Err(e) => {
                // Write synchronously (tracing is non-blocking and may not
                // flush in time)
                write_startup_error(&config, &e);
                error!("failed to start daemon: {}", e);
                drop(log_guard);
                return Err(e.into());
            }
        };

    let shutdown_notify = Arc::new(Notify::new());

    let ctx = Arc::new(ListenCtx {
        kernel: Arc::clone(&kernel),
        shutdown: Arc::clone(&shutdown_notify),
        shutdown_grace_ms: AtomicU64::new(env::drain_timeout().as_millis() as u64),
        auth_token: env::auth_token(),
    });

    // Spawn listener task (TCP in addition to Unix when configured)
    match env::tcp_port() {
        Some(port) => {
            let tcp = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
            tokio::spawn(Listener::with_tcp(unix_listener, tcp, Arc::clone(&ctx)).run());
        }
        None => {
            tokio::spawn(Listener::new(unix_listener, Arc::clone(&ctx)).run());
        }
    }

    // Group-commit flush task (~10ms durability window)
    spawn_flush_task(Arc::clone(&kernel));

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!("daemon ready, listening on {}", config.socket_path.display());

    // Signal ready for parent process (e.g. systemd, CLI waiting for startup)
    println!("READY");

    tokio::select! {
        _ = shutdown_notify.notified() => {
            info!("shutdown requested via command");
        }
        _ = sigterm.recv() => {
            info!("received SIGTERM, shutting down...");
        }
        _ = sigint.recv() => {
            info!("received SIGINT, shutting down...");
        }
    }

    let grace = ctx.shutdown_grace_ms.load(Ordering::Relaxed);
    kernel.shutdown(grace).await;

    lifecycle::cleanup(&config);
    drop(lock_file);
    info!("daemon stopped");
    Ok(())
}

/// Flush interval for group commit (~10ms durability window)
const FLUSH_INTERVAL: Duration = Duration::from_millis(10);

/// Spawn a task that periodically flushes the event log.
fn spawn_flush_task(kernel: Arc<hive_engine::Kernel<hive_core::SystemClock>>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(FLUSH_INTERVAL);
        loop {
            interval.tick().await;
            kernel.maintain();
        }
    });
}

/// Maximum log file size before rotation (10 MB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Number of rotated log files to keep (hived.log.1, .2, .3).
const MAX_ROTATED_LOGS: u32 = 3;

/// Rotate the daemon log file if it exceeds [`MAX_LOG_SIZE`].
///
/// Shifts `hived.log` → `hived.log.1` → `hived.log.2` → `hived.log.3`,
/// deleting the oldest. Best-effort: rotation failures are silently ignored
/// so the daemon still starts.
fn rotate_log_if_needed(log_path: &std::path::Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(m) => m.len(),
        Err(_) => return,
    };

    if size < MAX_LOG_SIZE {
        return;
    }

    let log_str = log_path.display().to_string();

    // Shift older rotations: .3 is deleted, .2→.3, .1→.2
    for i in (1..MAX_ROTATED_LOGS).rev() {
        let from = format!("{log_str}.{i}");
        let to = format!("{log_str}.{}", i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}

/// Startup marker prefix written to log before anything else.
/// Full format: "--- hived: starting (pid: 12345) ---"
const STARTUP_MARKER_PREFIX: &str = "--- hived: starting (pid: ";

/// Write startup marker to log file (appends to existing log)
fn write_startup_marker(config: &Config) -> Result<(), LifecycleError> {
    use std::io::Write;

    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)?;
    writeln!(file, "{}{}) ---\n", STARTUP_MARKER_PREFIX, std::process::id())?;

    Ok(())
}

/// Write startup error synchronously to log file.
/// This ensures the error is visible even if the process exits quickly.
fn write_startup_error(config: &Config, error: &LifecycleError) {
    use std::io::Write;

    let Ok(mut file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)
    else {
        return;
    };
    let _ = writeln!(file, "ERROR Failed to start daemon: {}", error);
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file_appender = tracing_appender::rolling::never(
        config.log_path.parent().ok_or(LifecycleError::NoStateDir)?,
        config.log_path.file_name().ok_or(LifecycleError::NoStateDir)?,
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
