// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Capability manager: tokenized access grants.
//!
//! A grant returns a fresh 32-byte random token exactly once; the store
//! keeps only its SHA-256 hash. Verification compares hashes in constant
//! time and every denial is event-logged. The attenuated proxy enforces an
//! operation whitelist in front of a resource-owning worker.

use crate::error::EngineError;
use crate::events::EventStore;
use crate::registry::Registry;
use crate::service::{ServiceError, ServiceMsg};
use hive_core::{payload, Clock, EventType, ServiceKey, Subject, TenantId};
use parking_lot::Mutex;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::debug;

hive_core::define_id! {
    /// Identifies one capability grant.
    pub struct CapabilityId("cap-");
}

/// Disjoint verification failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CapabilityError {
    #[error("capability not found")]
    NotFound,

    #[error("capability bound to a different resource")]
    WrongResource,

    #[error("permission denied")]
    PermissionDenied,

    #[error("capability expired or revoked")]
    ExpiredOrRevoked,
}

impl From<CapabilityError> for EngineError {
    fn from(e: CapabilityError) -> Self {
        match e {
            CapabilityError::NotFound => EngineError::NotFound("capability".to_string()),
            other => EngineError::PermissionDenied(other.to_string()),
        }
    }
}

/// A stored grant. The token itself is never kept.
#[derive(Debug, Clone)]
pub struct Capability {
    pub id: CapabilityId,
    pub tenant: TenantId,
    pub resource: String,
    pub permissions: BTreeSet<String>,
    pub expires_at_ms: u64,
    pub revoked: bool,
}

/// What `grant` hands back. The token is shown exactly once.
#[derive(Debug, Clone)]
pub struct Grant {
    pub id: CapabilityId,
    pub token: String,
    pub token_hash: String,
    pub expires_at_ms: u64,
}

pub struct CapabilityManager<C: Clock> {
    events: Arc<EventStore<C>>,
    clock: C,
    caps: Mutex<Vec<([u8; 32], Capability)>>,
}

impl<C: Clock> CapabilityManager<C> {
    pub fn new(events: Arc<EventStore<C>>, clock: C) -> Self {
        Self { events, clock, caps: Mutex::new(Vec::new()) }
    }

    /// Hex SHA-256 of a presented token, as used for revocation.
    pub fn hash_token(token: &str) -> String {
        format!("{:x}", Sha256::digest(token.as_bytes()))
    }

    /// Issue a token granting `permissions` on `resource` for `ttl_seconds`.
    pub fn grant(
        &self,
        tenant: &TenantId,
        resource: &str,
        permissions: Vec<String>,
        ttl_seconds: u64,
    ) -> Grant {
        let mut token_bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut token_bytes);
        let token: String = token_bytes.iter().map(|b| format!("{b:02x}")).collect();
        let hash: [u8; 32] = Sha256::digest(token.as_bytes()).into();

        let id = CapabilityId::new();
        let expires_at_ms = self.clock.epoch_ms() + ttl_seconds * 1000;
        let capability = Capability {
            id,
            tenant: tenant.clone(),
            resource: resource.to_string(),
            permissions: permissions.iter().cloned().collect(),
            expires_at_ms,
            revoked: false,
        };
        self.caps.lock().push((hash, capability));

        self.events.emit(
            EventType::CapabilityGranted,
            Subject::Tenant { tenant: tenant.clone() },
            payload! {
                "capability" => id.to_string(),
                "resource" => resource,
                "permissions" => permissions.join(","),
                "ttl_seconds" => ttl_seconds,
            },
        );

        let token_hash = Self::hash_token(&token);
        Grant { id, token, token_hash, expires_at_ms }
    }

    /// Check a token against a resource and permission.
    ///
    /// Hash comparison is constant-time; every denial emits
    /// `capability_denied`.
    pub fn verify(&self, token: &str, resource: &str, permission: &str) -> Result<(), CapabilityError> {
        let hash: [u8; 32] = Sha256::digest(token.as_bytes()).into();

        let found = {
            let caps = self.caps.lock();
            caps.iter()
                .find(|(stored, _)| stored.ct_eq(&hash).into())
                .map(|(_, cap)| cap.clone())
        };

        let result = match &found {
            None => Err(CapabilityError::NotFound),
            Some(cap) if cap.resource != resource => Err(CapabilityError::WrongResource),
            Some(cap) if cap.revoked || self.clock.epoch_ms() >= cap.expires_at_ms => {
                Err(CapabilityError::ExpiredOrRevoked)
            }
            Some(cap) if !cap.permissions.contains(permission) => {
                Err(CapabilityError::PermissionDenied)
            }
            Some(_) => Ok(()),
        };

        if let Err(reason) = &result {
            let subject = match &found {
                Some(cap) => Subject::Tenant { tenant: cap.tenant.clone() },
                None => Subject::System,
            };
            debug!(resource, permission, %reason, "capability denied");
            self.events.emit(
                EventType::CapabilityDenied,
                subject,
                payload! {
                    "resource" => resource,
                    "permission" => permission,
                    "reason" => reason.to_string(),
                },
            );
        }

        result
    }

    /// Revoke by token hash (hex). Idempotent.
    pub fn revoke(&self, token_hash: &str) {
        let newly_revoked = {
            let mut caps = self.caps.lock();
            caps.iter_mut().find_map(|(stored, cap)| {
                let stored_hex: String = stored.iter().map(|b| format!("{b:02x}")).collect();
                let matches: bool =
                    stored_hex.as_bytes().ct_eq(token_hash.as_bytes()).into();
                if matches && !cap.revoked {
                    cap.revoked = true;
                    Some((cap.tenant.clone(), cap.id))
                } else {
                    None
                }
            })
        };

        if let Some((tenant, id)) = newly_revoked {
            self.events.emit(
                EventType::CapabilityRevoked,
                Subject::Tenant { tenant },
                payload! { "capability" => id.to_string() },
            );
        }
    }

    #[cfg(test)]
    pub(crate) fn count(&self) -> usize {
        self.caps.lock().len()
    }
}

/// Policy enforcement in front of a resource-owning worker.
///
/// Forwards only whitelisted operation tags; everything else — unknown ops,
/// malformed (empty) tags — answers `Forbidden` and is event-logged.
pub struct AttenuatedProxy<C: Clock> {
    resource: String,
    allowed_ops: BTreeSet<String>,
    owner: ServiceKey,
    registry: Arc<Registry>,
    events: Arc<EventStore<C>>,
}

impl<C: Clock> AttenuatedProxy<C> {
    pub fn new(
        resource: impl Into<String>,
        allowed_ops: impl IntoIterator<Item = String>,
        owner: ServiceKey,
        registry: Arc<Registry>,
        events: Arc<EventStore<C>>,
    ) -> Self {
        Self {
            resource: resource.into(),
            allowed_ops: allowed_ops.into_iter().collect(),
            owner,
            registry,
            events,
        }
    }

    /// Forward one message to the owner, or refuse it.
    pub async fn forward(&self, mut msg: ServiceMsg) -> Result<(), EngineError> {
        if msg.op.is_empty() || !self.allowed_ops.contains(&msg.op) {
            self.events.emit(
                EventType::CapabilityDenied,
                Subject::Tenant { tenant: self.owner.tenant.clone() },
                payload! {
                    "resource" => self.resource.clone(),
                    "op" => msg.op.clone(),
                    "reason" => "op_not_allowed",
                },
            );
            msg.respond(Err(ServiceError::Forbidden));
            return Err(EngineError::PermissionDenied(format!(
                "op {:?} not allowed on {}",
                msg.op, self.resource
            )));
        }

        match self.registry.lookup(&self.owner) {
            Some(handle) => handle.send(msg).await,
            None => {
                msg.respond(Err(ServiceError::Stopping));
                Err(EngineError::not_found(&self.owner))
            }
        }
    }
}

#[cfg(test)]
#[path = "capability_tests.rs"]
mod tests;
