// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Compiled service modules and the factory seam.
//!
//! The kernel never evaluates source at runtime; a [`ServiceFactory`] turns
//! `(source, namespace)` into a [`ServiceModule`] whose constructor starts a
//! worker. [`NativeFactory`] is the built-in implementation: source text is a
//! JSON manifest naming a registered native constructor.
//!
//! Modules live in the [`ModuleStore`], one slot per namespace. Hot swap
//! replaces the slot content and bumps a generation workers watch; the
//! namespace table itself is the interned-name budget the kernel monitors.

use crate::service::{ProgramBuilder, ServiceError, ServiceProgram, StartOptions};
use parking_lot::Mutex;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("unsupported source format: {0}")]
    UnsupportedFormat(String),

    #[error("source does not parse: {0}")]
    Parse(String),

    #[error("unknown module {0:?}")]
    UnknownModule(String),

    #[error("module {0:?} has no start entrypoint")]
    NoEntrypoint(String),
}

/// A compiled unit of service code bound to one namespace.
pub struct ServiceModule {
    pub namespace: String,
    /// Content hash of the source this module was compiled from
    pub source_hash: String,
    builder: ProgramBuilder,
}

impl ServiceModule {
    pub fn new(namespace: String, source_hash: String, builder: ProgramBuilder) -> Self {
        Self { namespace, source_hash, builder }
    }

    /// Start a fresh program instance.
    pub fn instantiate(
        &self,
        opts: StartOptions,
    ) -> Result<Box<dyn ServiceProgram>, ServiceError> {
        (self.builder)(opts)
    }
}

impl std::fmt::Debug for ServiceModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceModule")
            .field("namespace", &self.namespace)
            .field("source_hash", &self.source_hash)
            .finish()
    }
}

/// Build a worker factory from source text.
pub trait ServiceFactory: Send + Sync + 'static {
    /// Compile `source` into a module bound to `namespace`.
    ///
    /// Namespaces are unique per `(tenant, service)`, so two tenants
    /// compiling the same source never share a module.
    fn compile(&self, source: &str, namespace: &str) -> Result<ServiceModule, CompileError>;
}

/// Manifest shape accepted by [`NativeFactory`].
#[derive(Deserialize)]
struct NativeManifest {
    module: String,
    /// Entrypoint name; native modules only expose "start"
    #[serde(default)]
    entry: Option<String>,
    #[serde(default)]
    config: serde_json::Value,
}

/// Factory over registered native constructors.
///
/// Source text is a JSON manifest: `{"module": "counter", "config": {...}}`.
pub struct NativeFactory {
    builders: Mutex<HashMap<String, ProgramBuilder>>,
}

impl NativeFactory {
    pub fn new() -> Self {
        Self { builders: Mutex::new(HashMap::new()) }
    }

    /// Factory pre-loaded with the built-in programs.
    pub fn with_defaults() -> Self {
        let factory = Self::new();
        factory.register(
            "echo",
            Arc::new(|_opts| Ok(Box::new(crate::service::EchoProgram) as Box<dyn ServiceProgram>)),
        );
        factory.register(
            "counter",
            Arc::new(|opts: StartOptions| {
                Ok(Box::new(crate::service::CounterProgram::with_prior(
                    opts.prior_state.as_ref(),
                )) as Box<dyn ServiceProgram>)
            }),
        );
        factory
    }

    /// Register a native constructor under `name`.
    pub fn register(&self, name: impl Into<String>, builder: ProgramBuilder) {
        self.builders.lock().insert(name.into(), builder);
    }
}

impl Default for NativeFactory {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ServiceFactory for NativeFactory {
    fn compile(&self, source: &str, namespace: &str) -> Result<ServiceModule, CompileError> {
        let manifest: NativeManifest =
            serde_json::from_str(source).map_err(|e| CompileError::Parse(e.to_string()))?;

        if manifest.entry.as_deref().unwrap_or("start") != "start" {
            return Err(CompileError::NoEntrypoint(manifest.module));
        }

        let builder = self
            .builders
            .lock()
            .get(&manifest.module)
            .cloned()
            .ok_or_else(|| CompileError::UnknownModule(manifest.module.clone()))?;

        let source_hash = format!("{:x}", Sha256::digest(source.as_bytes()));
        let config = manifest.config;
        let wrapped: ProgramBuilder = Arc::new(move |mut opts: StartOptions| {
            if opts.config.is_null() {
                opts.config = config.clone();
            }
            builder(opts)
        });

        Ok(ServiceModule::new(namespace.to_string(), source_hash, wrapped))
    }
}

/// One namespace slot: the current module plus a generation counter.
struct ModuleSlot {
    current: Arc<ServiceModule>,
    generation: u64,
    notify: watch::Sender<u64>,
}

/// Table of loaded modules, one slot per namespace.
pub struct ModuleStore {
    slots: Mutex<HashMap<String, ModuleSlot>>,
    capacity: usize,
}

impl ModuleStore {
    pub fn new(capacity: usize) -> Self {
        Self { slots: Mutex::new(HashMap::new()), capacity }
    }

    /// Install a module, creating or replacing the namespace slot.
    ///
    /// Returns a watch receiver that observes later generation bumps.
    pub fn install(&self, module: ServiceModule) -> watch::Receiver<u64> {
        let mut slots = self.slots.lock();
        let namespace = module.namespace.clone();
        match slots.get_mut(&namespace) {
            Some(slot) => {
                slot.generation += 1;
                slot.current = Arc::new(module);
                let _ = slot.notify.send(slot.generation);
                slot.notify.subscribe()
            }
            None => {
                let (notify, rx) = watch::channel(0);
                slots.insert(
                    namespace,
                    ModuleSlot { current: Arc::new(module), generation: 0, notify },
                );
                rx
            }
        }
    }

    /// Currently installed module for a namespace.
    pub fn current(&self, namespace: &str) -> Option<Arc<ServiceModule>> {
        self.slots.lock().get(namespace).map(|slot| Arc::clone(&slot.current))
    }

    /// Replace the module in an existing slot, returning the previous one.
    ///
    /// Workers holding the slot's watch receiver reload on the next
    /// dispatch. Returns `None` when the namespace was never installed.
    pub fn swap(&self, namespace: &str, module: ServiceModule) -> Option<Arc<ServiceModule>> {
        let mut slots = self.slots.lock();
        let slot = slots.get_mut(namespace)?;
        let old = Arc::clone(&slot.current);
        slot.generation += 1;
        slot.current = Arc::new(module);
        let _ = slot.notify.send(slot.generation);
        Some(old)
    }

    /// Reinstall a previously captured module (rollback path).
    pub fn restore(&self, namespace: &str, module: Arc<ServiceModule>) -> bool {
        let mut slots = self.slots.lock();
        match slots.get_mut(namespace) {
            Some(slot) => {
                slot.generation += 1;
                slot.current = module;
                let _ = slot.notify.send(slot.generation);
                true
            }
            None => false,
        }
    }

    /// Drop a namespace slot. Idempotent.
    pub fn remove(&self, namespace: &str) {
        self.slots.lock().remove(namespace);
    }

    /// Watch receiver for an existing slot.
    pub fn watch(&self, namespace: &str) -> Option<watch::Receiver<u64>> {
        self.slots.lock().get(namespace).map(|slot| slot.notify.subscribe())
    }

    /// `(loaded, capacity)` for the interned-namespace budget.
    pub fn usage(&self) -> (usize, usize) {
        (self.slots.lock().len(), self.capacity)
    }
}

#[cfg(test)]
#[path = "module_tests.rs"]
mod tests;
