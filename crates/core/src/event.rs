// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event record and taxonomy.
//!
//! The event log is the kernel's system of record: every significant state
//! change is an immutable [`EventRecord`] with a gap-free monotonic id.
//! `timestamp` (monotonic milliseconds) is the only ordering signal;
//! `wall_clock` exists for display and must never be compared.

use crate::tenant::{ServiceName, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Monotonically increasing, gap-free event id assigned by the store.
pub type EventId = u64;

/// Closed set of event types emitted by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    SystemStarted,
    ServiceDeployed,
    ServiceStarted,
    ServiceKilled,
    ServiceCrashed,
    AtomUsageHigh,
    ResourceViolation,
    CapabilityGranted,
    CapabilityRevoked,
    CapabilityDenied,
    HotSwapStarted,
    HotSwapSucceeded,
    HotSwapRolledBack,
    HotSwapFailed,
    SecretStored,
    SecretAccessed,
    SecretAccessDenied,
    SecretRevoked,
    CircuitBreakerOpened,
    CircuitBreakerClosed,
    StorageDegraded,
    SystemShutdownStarted,
    SystemShutdownComplete,
}

crate::simple_display! {
    EventType {
        SystemStarted => "system_started",
        ServiceDeployed => "service_deployed",
        ServiceStarted => "service_started",
        ServiceKilled => "service_killed",
        ServiceCrashed => "service_crashed",
        AtomUsageHigh => "atom_usage_high",
        ResourceViolation => "resource_violation",
        CapabilityGranted => "capability_granted",
        CapabilityRevoked => "capability_revoked",
        CapabilityDenied => "capability_denied",
        HotSwapStarted => "hot_swap_started",
        HotSwapSucceeded => "hot_swap_succeeded",
        HotSwapRolledBack => "hot_swap_rolled_back",
        HotSwapFailed => "hot_swap_failed",
        SecretStored => "secret_stored",
        SecretAccessed => "secret_accessed",
        SecretAccessDenied => "secret_access_denied",
        SecretRevoked => "secret_revoked",
        CircuitBreakerOpened => "circuit_breaker_opened",
        CircuitBreakerClosed => "circuit_breaker_closed",
        StorageDegraded => "storage_degraded",
        SystemShutdownStarted => "system_shutdown_started",
        SystemShutdownComplete => "system_shutdown_complete",
    }
}

/// What an event is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Subject {
    System,
    Tenant { tenant: TenantId },
    Service { tenant: TenantId, service: ServiceName },
}

impl Subject {
    pub fn service(tenant: TenantId, service: ServiceName) -> Self {
        Self::Service { tenant, service }
    }

    /// Tenant this subject belongs to, if any.
    pub fn tenant(&self) -> Option<&TenantId> {
        match self {
            Subject::System => None,
            Subject::Tenant { tenant } | Subject::Service { tenant, .. } => Some(tenant),
        }
    }
}

/// Scalar payload value: string, number, or bool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayloadValue {
    Bool(bool),
    Int(i64),
    Num(f64),
    Str(String),
}

impl From<&str> for PayloadValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for PayloadValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<bool> for PayloadValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for PayloadValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for PayloadValue {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<u64> for PayloadValue {
    fn from(v: u64) -> Self {
        Self::Int(v as i64)
    }
}

impl From<u32> for PayloadValue {
    fn from(v: u32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<usize> for PayloadValue {
    fn from(v: usize) -> Self {
        Self::Int(v as i64)
    }
}

impl From<f64> for PayloadValue {
    fn from(v: f64) -> Self {
        Self::Num(v)
    }
}

impl PayloadValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// Key→value bag attached to an event.
pub type Payload = BTreeMap<String, PayloadValue>;

/// Immutable record of a significant state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: EventId,
    /// Host monotonic clock reading in milliseconds. Ordering only.
    pub timestamp: u64,
    /// UTC instant. Display only, never used for ordering.
    pub wall_clock: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<TenantId>,
    pub event_type: EventType,
    pub subject: Subject,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub payload: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<EventId>,
}

impl EventRecord {
    /// Tenant scope of this event (explicit scope first, then subject).
    pub fn tenant(&self) -> Option<&TenantId> {
        self.tenant_id.as_ref().or_else(|| self.subject.tenant())
    }

    /// Service named by the subject, if any.
    pub fn service(&self) -> Option<&ServiceName> {
        match &self.subject {
            Subject::Service { service, .. } => Some(service),
            _ => None,
        }
    }
}

/// Filter over stored events for `stream` and `WatchEvents`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<TenantId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<ServiceName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since_id: Option<EventId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<EventType>,
}

impl EventFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn tenant(mut self, tenant: TenantId) -> Self {
        self.tenant = Some(tenant);
        self
    }

    pub fn service(mut self, service: ServiceName) -> Self {
        self.service = Some(service);
        self
    }

    pub fn since(mut self, id: EventId) -> Self {
        self.since_id = Some(id);
        self
    }

    pub fn event_type(mut self, ty: EventType) -> Self {
        self.event_type = Some(ty);
        self
    }

    pub fn matches(&self, event: &EventRecord) -> bool {
        if let Some(since) = self.since_id {
            if event.id <= since {
                return false;
            }
        }
        if let Some(ty) = self.event_type {
            if event.event_type != ty {
                return false;
            }
        }
        if let Some(tenant) = &self.tenant {
            if event.tenant() != Some(tenant) {
                return false;
            }
        }
        if let Some(service) = &self.service {
            if event.service() != Some(service) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
