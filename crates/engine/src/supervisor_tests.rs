// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::service::ServiceMsg;
use crate::test_helpers::{harness, key, test_factory};
use hive_core::EventFilter;
use hive_core::EventType;
use std::time::Duration;

async fn deploy_manifest(
    h: &crate::test_helpers::Harness,
    k: &ServiceKey,
    manifest: &str,
) -> Result<crate::registry::WorkerHandle, EngineError> {
    let factory = test_factory();
    let namespace = k.namespace();
    let module = crate::module::ServiceFactory::compile(&*factory, manifest, &namespace)
        .map_err(|e| EngineError::InvalidInput(e.to_string()))?;
    let generation = h.registry.reserve(k).map_err(|e| EngineError::AlreadyExists(e.to_string()))?;
    h.modules.install(module);
    h.supervisor
        .spawn_worker(k, generation, StartOptions::new(k.clone(), serde_json::Value::Null))
        .await
}

#[tokio::test]
async fn spawn_promotes_the_reservation() {
    let h = harness();
    let k = key("t1", "svc");

    let handle = deploy_manifest(&h, &k, r#"{"module":"echo"}"#).await.unwrap();
    assert!(handle.alive());
    assert!(h.registry.lookup(&k).is_some());
}

#[tokio::test]
async fn start_failure_is_reported_to_the_deployer() {
    let h = harness();
    let k = key("t1", "svc");

    let err = deploy_manifest(&h, &k, r#"{"module":"failstart"}"#).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));

    // No restart loop for a service that never started.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let crashes = h.events.stream(&EventFilter::all().event_type(EventType::ServiceCrashed));
    assert!(crashes.is_empty());
}

#[tokio::test]
async fn crash_restarts_with_a_fresh_incarnation() {
    let h = harness();
    let k = key("t1", "svc");

    let first = deploy_manifest(&h, &k, r#"{"module":"crashy"}"#).await.unwrap();
    first.send(ServiceMsg::new("boom", serde_json::Value::Null)).await.unwrap();

    // Wait for the monitor to restart the worker.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let replacement = h.registry.lookup(&k).expect("worker restarted");
    assert_ne!(replacement.worker_id, first.worker_id);
    assert!(replacement.alive());

    let events = h.events.stream(&EventFilter::all());
    let crash = events.iter().find(|e| e.event_type == EventType::ServiceCrashed).unwrap();
    let started = events
        .iter()
        .find(|e| e.event_type == EventType::ServiceStarted)
        .unwrap();
    assert_eq!(started.causation_id, Some(crash.id));
}

#[tokio::test]
async fn panic_is_contained_and_restarts() {
    let h = harness();
    let k = key("t1", "svc");

    let first = deploy_manifest(&h, &k, r#"{"module":"crashy"}"#).await.unwrap();
    first.send(ServiceMsg::new("panic", serde_json::Value::Null)).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(h.registry.lookup(&k).is_some());
    let crashes = h.events.stream(&EventFilter::all().event_type(EventType::ServiceCrashed));
    assert_eq!(crashes.len(), 1);
    assert_eq!(
        crashes[0].payload.get("reason").and_then(|v| v.as_str()),
        Some("panicked")
    );
}

#[tokio::test]
async fn explicit_cancel_does_not_restart() {
    let h = harness();
    let k = key("t1", "svc");

    let handle = deploy_manifest(&h, &k, r#"{"module":"echo"}"#).await.unwrap();
    handle.cancel.cancel();
    handle.stopped().await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.registry.lookup(&k).is_none(), "killed worker must leave the registry");
}

#[tokio::test]
async fn restart_intensity_gives_up() {
    let h = harness();
    let k = key("t1", "svc");

    deploy_manifest(&h, &k, r#"{"module":"crashy"}"#).await.unwrap();

    // Crash until the supervisor gives up (cap is 3 restarts in-window).
    for _ in 0..5 {
        if let Some(handle) = h.registry.lookup(&k) {
            let _ = handle.send(ServiceMsg::new("boom", serde_json::Value::Null)).await;
        }
        tokio::time::sleep(Duration::from_millis(60)).await;
    }

    assert!(h.registry.lookup(&k).is_none(), "crash-looping worker should be gone");
    let crashes = h.events.stream(&EventFilter::all().event_type(EventType::ServiceCrashed));
    assert!(crashes
        .iter()
        .any(|e| e.payload.get("restarts_exhausted") == Some(&hive_core::PayloadValue::Bool(true))));
}

#[tokio::test]
async fn tenant_limit_is_enforced() {
    let h = harness(); // limit 16 in the fixture
    for i in 0..16 {
        let k = key(&format!("tenant{i}"), "svc");
        deploy_manifest(&h, &k, r#"{"module":"echo"}"#).await.unwrap();
    }

    let overflow = key("tenant16", "svc");
    let err = deploy_manifest(&h, &overflow, r#"{"module":"echo"}"#).await.unwrap_err();
    assert!(matches!(err, EngineError::Overloaded(_)));
}

#[tokio::test]
async fn crashing_worker_does_not_disturb_other_tenants() {
    let h = harness();
    let ka = key("a", "svc");
    let kb = key("b", "svc");

    let ha = deploy_manifest(&h, &ka, r#"{"module":"crashy"}"#).await.unwrap();
    deploy_manifest(&h, &kb, r#"{"module":"echo"}"#).await.unwrap();

    ha.send(ServiceMsg::new("panic", serde_json::Value::Null)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let hb = h.registry.lookup(&kb).expect("tenant b untouched");
    assert!(hb.alive());
}
