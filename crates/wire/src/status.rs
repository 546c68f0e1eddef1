// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Summary types shared between the daemon listener and CLI output.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Live worker sample for one service, taken at call time (never cached).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatusEntry {
    pub service: String,
    pub worker_id: String,
    pub alive: bool,
    /// Approximate resident bytes attributed to the worker
    pub memory_bytes: u64,
    /// Messages waiting in the worker mailbox
    pub queue_len: usize,
    /// Messages the worker has handled since start
    pub processed: u64,
}

/// Registry entry summary for list/discovery replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub tenant: String,
    pub service: String,
    pub worker_id: String,
    pub alive: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registered_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Load shedder snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShedStatsSummary {
    pub per_tenant: BTreeMap<String, u32>,
    pub total_in_flight: u32,
    pub num_tenants: usize,
    pub max_per_tenant: u32,
    pub max_total: u32,
}

/// Daemon health for `hive health`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSummary {
    pub version: String,
    pub uptime_ms: u64,
    pub tenants: usize,
    pub workers: usize,
    pub last_event_id: u64,
    pub storage_degraded: bool,
}
