// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use hive_core::EventFilter;
use serde::{Deserialize, Serialize};

/// Request from a gateway client to the daemon.
///
/// The tenant scope is established once per connection in the `Hello`
/// handshake (the socket analog of an `X-Tenant-Id` header or a client
/// certificate CN); tenant-scoped requests without a handshake are rejected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Request {
    /// Health check ping
    Ping,

    /// Version + tenant handshake
    Hello {
        version: String,
        /// Tenant this connection acts for. Optional for tenant-less ops.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tenant: Option<String>,
        /// Auth token for TCP connections (ignored for Unix socket)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },

    /// Deploy a service from source text
    Deploy {
        service: String,
        code: String,
        /// Module format; only "native" is supported
        format: String,
    },

    /// Sample live status for one service
    Status { service: String },

    /// Stop a service. Graceful for `timeout_ms`, then hard if `force`.
    Kill {
        service: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
        #[serde(default)]
        force: bool,
    },

    /// List the connection tenant's services
    List,

    /// Hot-swap a running service's code in place
    Swap {
        service: String,
        code: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rollback_window_ms: Option<u64>,
    },

    /// Safe swap variant: kill then deploy
    Replace { service: String, code: String },

    /// Stream matching events until the connection closes
    WatchEvents {
        #[serde(default)]
        filter: EventFilter,
    },

    /// Request daemon shutdown
    Shutdown {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        grace_ms: Option<u64>,
    },

    /// Attach a discovery name and tags to a deployed service
    RegisterService {
        service: String,
        name: String,
        #[serde(default)]
        tags: Vec<String>,
    },

    /// Find services registered under `name`, optionally narrowed by tags
    DiscoverService {
        name: String,
        #[serde(default)]
        tags: Vec<String>,
    },

    /// List registered services, optionally by name
    GetServices {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },

    /// Issue a capability token for a resource
    GrantCapability {
        resource: String,
        permissions: Vec<String>,
        ttl_seconds: u64,
    },

    /// Check a capability token against a resource and permission
    VerifyCapability {
        token: String,
        resource: String,
        permission: String,
    },

    /// Revoke a capability by token hash
    RevokeCapability { token_hash: String },

    /// Store an encrypted secret
    SetSecret {
        name: String,
        value: String,
        master_key: String,
    },

    /// Retrieve and decrypt a secret
    GetSecret { name: String, master_key: String },

    /// Delete a secret
    DeleteSecret { name: String },

    /// List the connection tenant's secret names
    ListSecrets,

    /// Load shedder statistics
    ShedStats,

    /// Daemon health summary
    Health,

    /// Kernel counters in text exposition format
    Metrics,
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
