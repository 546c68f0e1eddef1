// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: configuration, startup, shutdown.

mod startup;

pub use startup::{startup, StartupResult};

use hive_core::{ConfigError, KernelConfig};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no usable state directory (set HIVE_STATE_DIR or HOME)")]
    NoStateDir,

    #[error("another hived already holds the lock: {0}")]
    LockFailed(std::io::Error),

    #[error("failed to bind {0}: {1}")]
    BindFailed(PathBuf, std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("kernel startup failed: {0}")]
    Kernel(#[from] hive_engine::EngineError),
}

/// Resolved daemon paths plus the kernel configuration snapshot.
#[derive(Debug, Clone)]
pub struct Config {
    pub state_dir: PathBuf,
    pub socket_path: PathBuf,
    pub lock_path: PathBuf,
    pub log_path: PathBuf,
    pub version_path: PathBuf,
    pub kernel: KernelConfig,
}

impl Config {
    /// Load configuration: state dir from the environment, kernel config
    /// from `HIVED_CONFIG` (or `<state_dir>/hived.toml`), merged over
    /// defaults. An unreadable config file is a fatal startup error.
    pub fn load() -> Result<Self, LifecycleError> {
        let state_dir = crate::env::state_dir()?;

        let config_path = crate::env::config_path();
        let default_path = state_dir.join("hived.toml");
        let from_env = config_path.is_some();
        let path = config_path.unwrap_or(default_path);

        let mut kernel = KernelConfig::load(&path)?;
        if !from_env {
            // No explicit config: keep data under the state directory
            // instead of the process working directory.
            let defaults = KernelConfig::default();
            if kernel.data_dir == defaults.data_dir {
                kernel.data_dir = state_dir.join("data");
            }
            if kernel.events_db == defaults.events_db {
                kernel.events_db = kernel.data_dir.join("events");
            }
            if kernel.vault_db == defaults.vault_db {
                kernel.vault_db = kernel.data_dir.join("vault");
            }
            if kernel.cert_dir == defaults.cert_dir {
                kernel.cert_dir = kernel.data_dir.join("certs");
            }
        }

        Ok(Self {
            socket_path: state_dir.join("hived.sock"),
            lock_path: state_dir.join("hived.lock"),
            log_path: state_dir.join("logs/hived.log"),
            version_path: state_dir.join("hived.version"),
            state_dir,
            kernel,
        })
    }
}

/// Best-effort removal of runtime files on the way out.
pub fn cleanup(config: &Config) {
    let _ = std::fs::remove_file(&config.socket_path);
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
