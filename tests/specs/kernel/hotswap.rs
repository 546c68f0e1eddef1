// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hot swap rollback boundary.

use crate::prelude::*;
use hive_core::ServiceKey;
use hive_engine::{ServiceMsg, SwapOptions};
use std::time::Duration;

const COUNTER_V2: &str = r#"{"module":"counter","config":{"rev":2}}"#;

#[tokio::test]
async fn healthy_worker_crosses_the_window_without_rollback() {
    let spec = spec();
    let t = tenant("a");

    // Deploy a worker that stays alive.
    spec.kernel.deploy(&t, "svc", COUNTER, "native").await.unwrap();

    spec.kernel
        .swap(&t, "svc", COUNTER_V2, SwapOptions { rollback_window_ms: 100 })
        .await
        .unwrap();

    // Past the window: succeeded, never rolled back.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let succeeded = spec
        .kernel
        .stream(&EventFilter::all().event_type(EventType::HotSwapSucceeded));
    let rolled_back = spec
        .kernel
        .stream(&EventFilter::all().event_type(EventType::HotSwapRolledBack));
    assert_eq!(succeeded.len(), 1);
    assert!(rolled_back.is_empty());
}

#[tokio::test]
async fn crashing_swap_rolls_back_to_the_old_code() {
    let spec = spec();
    let t = tenant("a");
    let key = ServiceKey::new(tenant("a"), service("svc"));

    spec.kernel.deploy(&t, "svc", COUNTER, "native").await.unwrap();
    let old_hash = spec
        .kernel
        .modules()
        .current(&key.namespace())
        .unwrap()
        .source_hash
        .clone();

    spec.kernel
        .swap(&t, "svc", CRASHY, SwapOptions { rollback_window_ms: 2_000 })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Crash the freshly swapped code inside the window.
    spec.kernel
        .registry()
        .lookup(&key)
        .unwrap()
        .send(ServiceMsg::new("boom", serde_json::Value::Null))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let rolled_back = spec
        .kernel
        .stream(&EventFilter::all().event_type(EventType::HotSwapRolledBack));
    assert_eq!(rolled_back.len(), 1);

    // Pre-swap bytecode is live again.
    assert_eq!(
        spec.kernel.modules().current(&key.namespace()).unwrap().source_hash,
        old_hash
    );
    assert!(spec.kernel.status(&t, "svc").unwrap().alive);
}

#[tokio::test]
async fn swap_of_a_missing_service_fails() {
    let spec = spec();
    let err = spec
        .kernel
        .swap(&tenant("a"), "ghost", COUNTER, SwapOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, hive_engine::EngineError::NotFound(_)));
}

#[tokio::test]
async fn replace_reports_simple_replace() {
    let spec = spec();
    let t = tenant("a");
    spec.kernel.deploy(&t, "svc", COUNTER, "native").await.unwrap();

    spec.kernel.replace(&t, "svc", COUNTER_V2).await.unwrap();

    let succeeded = spec
        .kernel
        .stream(&EventFilter::all().event_type(EventType::HotSwapSucceeded));
    assert_eq!(succeeded.len(), 1);
    assert_eq!(
        succeeded[0].payload.get("method").and_then(|v| v.as_str()),
        Some("simple_replace")
    );
}
