// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tenant and service naming.
//!
//! Every control-plane operation is scoped by a [`TenantId`]; a service is
//! addressed by the pair `(tenant, service)` — a [`ServiceKey`]. Exactly one
//! live worker may exist per key at any instant.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use smol_str::SmolStr;
use thiserror::Error;

/// Validation errors for tenant and service names.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("tenant id must not be empty")]
    EmptyTenant,

    #[error("service name must not be empty")]
    EmptyService,

    #[error("invalid service name {0:?}: only [A-Za-z0-9_-] allowed")]
    InvalidService(String),
}

/// Opaque non-empty tenant identifier. The namespace of isolation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(SmolStr);

impl TenantId {
    pub fn new(s: impl AsRef<str>) -> Result<Self, NameError> {
        let s = s.as_ref();
        if s.is_empty() {
            return Err(NameError::EmptyTenant);
        }
        Ok(Self(SmolStr::new(s)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::borrow::Borrow<str> for TenantId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Service name: `[A-Za-z0-9_-]+`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceName(SmolStr);

impl ServiceName {
    pub fn new(s: impl AsRef<str>) -> Result<Self, NameError> {
        let s = s.as_ref();
        if s.is_empty() {
            return Err(NameError::EmptyService);
        }
        if !s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-') {
            return Err(NameError::InvalidService(s.to_string()));
        }
        Ok(Self(SmolStr::new(s)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ServiceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::borrow::Borrow<str> for ServiceName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Fully-qualified service address: `(tenant, service)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceKey {
    pub tenant: TenantId,
    pub service: ServiceName,
}

impl ServiceKey {
    pub fn new(tenant: TenantId, service: ServiceName) -> Self {
        Self { tenant, service }
    }

    /// Build a key from raw strings, validating both parts.
    pub fn parse(tenant: impl AsRef<str>, service: impl AsRef<str>) -> Result<Self, NameError> {
        Ok(Self { tenant: TenantId::new(tenant)?, service: ServiceName::new(service)? })
    }

    /// Module namespace for compiled service code.
    ///
    /// Non-alphanumeric bytes collapse to `_`, so the sanitized parts alone
    /// would collide across e.g. `tenant-1` and `tenant_1`. An 8-hex-char
    /// digest of the raw pair is appended to keep namespaces disjoint for
    /// distinct keys.
    pub fn namespace(&self) -> String {
        let digest = Sha256::new()
            .chain_update(self.tenant.as_str().as_bytes())
            .chain_update([0x1f])
            .chain_update(self.service.as_str().as_bytes())
            .finalize();
        let tag: String = digest[..4].iter().map(|b| format!("{b:02x}")).collect();
        format!("{}__{}__{}", sanitize(self.tenant.as_str()), sanitize(self.service.as_str()), tag)
    }
}

impl std::fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.tenant, self.service)
    }
}

/// Replace every non-alphanumeric byte with `_`.
fn sanitize(s: &str) -> String {
    s.chars().map(|c| if c.is_ascii_alphanumeric() { c } else { '_' }).collect()
}

#[cfg(test)]
#[path = "tenant_tests.rs"]
mod tests;
