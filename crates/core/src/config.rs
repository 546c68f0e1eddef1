// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Kernel configuration.
//!
//! Loaded once at startup from a TOML (or JSON) file and merged over
//! defaults; components receive their slice at construction time. Per-tenant
//! overrides are resolved at lookup.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::tenant::TenantId;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Per-tenant limit overrides, resolved at lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TenantOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_per_tenant: Option<u32>,
}

/// Immutable configuration snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    pub listen_port: u16,
    pub http_port: u16,
    pub data_dir: PathBuf,
    pub max_tenants: usize,
    pub max_per_tenant: u32,
    pub max_total: u32,
    pub events_db: PathBuf,
    pub vault_db: PathBuf,
    pub cert_dir: PathBuf,
    /// Per-tenant overrides keyed by tenant id.
    pub tenants: BTreeMap<String, TenantOverrides>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            listen_port: 50051,
            http_port: 8080,
            data_dir: PathBuf::from("./data"),
            max_tenants: 100,
            max_per_tenant: 100,
            max_total: 1000,
            events_db: PathBuf::from("./data/events"),
            vault_db: PathBuf::from("./data/vault"),
            cert_dir: PathBuf::from("./data/certs"),
            tenants: BTreeMap::new(),
        }
    }
}

impl KernelConfig {
    /// Load configuration from `path`, merged over defaults.
    ///
    /// A missing file yields defaults. An unreadable or unparseable file is
    /// a startup error (the daemon maps it to a non-zero exit).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError::Unreadable { path: path.to_owned(), source: e });
            }
        };

        // TOML first; JSON accepted as a fallback encoding.
        match toml::from_str::<Self>(&text) {
            Ok(config) => Ok(config),
            Err(toml_err) => serde_json::from_str::<Self>(&text).map_err(|_| {
                ConfigError::Parse { path: path.to_owned(), message: toml_err.to_string() }
            }),
        }
    }

    /// In-flight limit for a tenant, honoring per-tenant overrides.
    pub fn max_for_tenant(&self, tenant: &TenantId) -> u32 {
        self.tenants
            .get(tenant.as_str())
            .and_then(|o| o.max_per_tenant)
            .unwrap_or(self.max_per_tenant)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
