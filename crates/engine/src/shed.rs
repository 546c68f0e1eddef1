// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Load shedder: process-wide per-tenant and global admission control.
//!
//! One mutex over both tables makes acquire/release linearizable: acquire
//! re-validates both limits inside the critical section, release is
//! idempotent and removes a tenant's entry at count zero.

use crate::error::EngineError;
use hive_core::{KernelConfig, TenantId};
use hive_wire::ShedStatsSummary;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

hive_core::define_id! {
    /// An in-flight admission permit.
    pub struct PermitId("prm-");
}

struct ShedInner {
    per_tenant: HashMap<TenantId, u32>,
    permits: HashMap<PermitId, TenantId>,
}

pub struct LoadShedder {
    config: Arc<KernelConfig>,
    inner: Mutex<ShedInner>,
}

impl LoadShedder {
    pub fn new(config: Arc<KernelConfig>) -> Self {
        Self {
            config,
            inner: Mutex::new(ShedInner {
                per_tenant: HashMap::new(),
                permits: HashMap::new(),
            }),
        }
    }

    /// Non-mutating probe.
    pub fn check(&self, tenant: &TenantId) -> Result<(), EngineError> {
        let inner = self.inner.lock();
        self.check_locked(&inner, tenant)
    }

    fn check_locked(&self, inner: &ShedInner, tenant: &TenantId) -> Result<(), EngineError> {
        let tenant_count = inner.per_tenant.get(tenant).copied().unwrap_or(0);
        if tenant_count >= self.config.max_for_tenant(tenant) {
            return Err(EngineError::Overloaded(format!("tenant {tenant} over limit")));
        }
        if inner.permits.len() as u32 >= self.config.max_total {
            return Err(EngineError::Overloaded("host over total limit".to_string()));
        }
        Ok(())
    }

    /// Atomically admit one in-flight operation for `tenant`.
    pub fn acquire(&self, tenant: &TenantId) -> Result<PermitId, EngineError> {
        let mut inner = self.inner.lock();
        self.check_locked(&inner, tenant)?;

        let permit = PermitId::new();
        *inner.per_tenant.entry(tenant.clone()).or_insert(0) += 1;
        inner.permits.insert(permit, tenant.clone());
        Ok(permit)
    }

    /// Return a permit. Idempotent against double-release and unknown ids.
    pub fn release(&self, permit: PermitId) {
        let mut inner = self.inner.lock();
        let Some(tenant) = inner.permits.remove(&permit) else {
            return;
        };
        match inner.per_tenant.get_mut(&tenant) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                inner.per_tenant.remove(&tenant);
            }
            None => {}
        }
    }

    pub fn stats(&self) -> ShedStatsSummary {
        let inner = self.inner.lock();
        ShedStatsSummary {
            per_tenant: inner
                .per_tenant
                .iter()
                .map(|(t, c)| (t.to_string(), *c))
                .collect(),
            total_in_flight: inner.permits.len() as u32,
            num_tenants: inner.per_tenant.len(),
            max_per_tenant: self.config.max_per_tenant,
            max_total: self.config.max_total,
        }
    }
}

#[cfg(test)]
#[path = "shed_tests.rs"]
mod tests;
