// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use hive_core::{ErrorBody, EventRecord};
use serde::{Deserialize, Serialize};

use super::status::{HealthSummary, ServiceInfo, ServiceStatusEntry, ShedStatsSummary};

/// Response from the daemon to a gateway client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Response {
    /// Generic success
    Ok,

    /// Tagged failure with code, message and timestamp
    Error { error: ErrorBody },

    /// Ping reply
    Pong,

    /// Hello reply with the daemon's protocol version
    HelloAck { version: String },

    /// Deploy reply
    Deployed { entry: ServiceStatusEntry },

    /// Status reply, sampled at call time
    StatusInfo { entry: ServiceStatusEntry },

    /// List / discovery reply
    Services { services: Vec<ServiceInfo> },

    /// One event frame in a `WatchEvents` stream
    Event { event: EventRecord },

    /// Capability grant reply. The token is shown exactly once.
    Granted {
        capability_id: String,
        token: String,
        expires_at_ms: u64,
    },

    /// Decrypted secret value
    Secret { value: String },

    /// Secret names, sorted
    SecretNames { names: Vec<String> },

    /// Load shedder statistics
    ShedStats { stats: ShedStatsSummary },

    /// Daemon health summary
    HealthInfo { health: HealthSummary },

    /// Kernel counters in text exposition format
    MetricsText { text: String },

    /// Shutdown acknowledged; the daemon drains and exits
    ShuttingDown,
}

impl Response {
    pub fn error(error: ErrorBody) -> Self {
        Self::Error { error }
    }

    /// True for terminal replies (everything except stream frames).
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Response::Event { .. })
    }
}

#[cfg(test)]
#[path = "response_tests.rs"]
mod tests;
