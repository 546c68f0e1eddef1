// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for engine unit tests.

use crate::events::EventStore;
use crate::module::{ModuleStore, NativeFactory};
use crate::registry::Registry;
use crate::service::{ServiceError, ServiceMsg, ServiceProgram, StartOptions};
use crate::supervisor::SupervisorTree;
use async_trait::async_trait;
use hive_core::{FakeClock, ServiceKey, TenantId};
use hive_storage::RetentionLimits;
use std::sync::Arc;

pub(crate) fn tenant(s: &str) -> TenantId {
    TenantId::new(s).unwrap()
}

pub(crate) fn key(t: &str, s: &str) -> ServiceKey {
    ServiceKey::parse(t, s).unwrap()
}

/// Event store over a temp dir. Keep the guard alive for the test duration.
pub(crate) fn test_store() -> (Arc<EventStore<FakeClock>>, FakeClock, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let store =
        Arc::new(EventStore::open(dir.path(), RetentionLimits::default(), clock.clone()).unwrap());
    (store, clock, dir)
}

/// Program that fails on the "boom" op and panics on the "panic" op.
pub(crate) struct CrashyProgram;

#[async_trait]
impl ServiceProgram for CrashyProgram {
    async fn on_message(&mut self, mut msg: ServiceMsg) -> Result<(), ServiceError> {
        match msg.op.as_str() {
            "boom" => Err(ServiceError::Failed("boom".to_string())),
            "panic" => panic!("requested panic"),
            _ => {
                msg.respond(Ok(serde_json::json!({})));
                Ok(())
            }
        }
    }
}

/// Native factory with the built-ins plus a crash-on-demand module.
pub(crate) fn test_factory() -> Arc<NativeFactory> {
    let factory = NativeFactory::with_defaults();
    factory.register(
        "crashy",
        Arc::new(|_opts: StartOptions| Ok(Box::new(CrashyProgram) as Box<dyn ServiceProgram>)),
    );
    factory.register(
        "failstart",
        Arc::new(|_opts: StartOptions| {
            Err::<Box<dyn ServiceProgram>, _>(ServiceError::Failed("refuses to start".into()))
        }),
    );
    Arc::new(factory)
}

/// Registry + supervisor + modules wired over a fresh store.
pub(crate) struct Harness {
    pub events: Arc<EventStore<FakeClock>>,
    pub clock: FakeClock,
    pub registry: Arc<Registry>,
    pub modules: Arc<ModuleStore>,
    pub supervisor: Arc<SupervisorTree<FakeClock>>,
    _dir: tempfile::TempDir,
}

pub(crate) fn harness() -> Harness {
    let (events, clock, dir) = test_store();
    let registry = Arc::new(Registry::new());
    let modules = Arc::new(ModuleStore::new(64));
    let supervisor = Arc::new(SupervisorTree::new(
        Arc::clone(&events),
        Arc::clone(&registry),
        Arc::clone(&modules),
        16,
        clock.clone(),
    ));
    Harness { events, clock, registry, modules, supervisor, _dir: dir }
}
