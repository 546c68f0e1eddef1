// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::deploy::Deployer;
use crate::service::ServiceMsg;
use crate::test_helpers::{harness, key, test_factory, Harness};
use hive_core::{EventFilter, EventType, FakeClock};
use std::time::Duration;

const COUNTER: &str = r#"{"module":"counter"}"#;
const COUNTER_V2: &str = r#"{"module":"counter","config":{"rev":2}}"#;
const CRASHY: &str = r#"{"module":"crashy"}"#;

struct Fixture {
    h: Harness,
    deployer: Arc<Deployer<FakeClock>>,
    hotswap: HotSwap<FakeClock>,
}

fn fixture() -> Fixture {
    let h = harness();
    let factory = test_factory();
    let deployer = Arc::new(Deployer::new(
        Arc::clone(&h.events),
        Arc::clone(&h.registry),
        Arc::clone(&h.modules),
        factory.clone(),
        Arc::clone(&h.supervisor),
    ));
    let hotswap = HotSwap::new(
        Arc::clone(&h.events),
        Arc::clone(&h.registry),
        Arc::clone(&h.modules),
        factory,
        Arc::clone(&deployer),
    );
    Fixture { h, deployer, hotswap }
}

fn events_of(fx: &Fixture, ty: EventType) -> Vec<hive_core::EventRecord> {
    fx.h.events.stream(&EventFilter::all().event_type(ty))
}

#[tokio::test]
async fn swap_of_missing_service_is_not_found() {
    let fx = fixture();
    let err = fx
        .hotswap
        .swap(&key("a", "ghost"), COUNTER, SwapOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test]
async fn bad_code_emits_hot_swap_failed() {
    let fx = fixture();
    let k = key("a", "svc");
    fx.deployer.deploy(&k, COUNTER, "native").await.unwrap();

    let err = fx
        .hotswap
        .swap(&k, r#"{"module":"missing"}"#, SwapOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
    assert_eq!(events_of(&fx, EventType::HotSwapFailed).len(), 1);
    // A failed compile never disturbs the running worker.
    assert!(fx.h.registry.lookup(&k).unwrap().alive());
}

#[tokio::test]
async fn concurrent_swaps_fail_fast() {
    let fx = fixture();
    let k = key("a", "svc");
    fx.deployer.deploy(&k, COUNTER, "native").await.unwrap();

    fx.hotswap
        .swap(&k, COUNTER_V2, SwapOptions { rollback_window_ms: 5_000 })
        .await
        .unwrap();
    let err = fx
        .hotswap
        .swap(&k, COUNTER_V2, SwapOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Transient(_)));
}

#[tokio::test]
async fn healthy_swap_succeeds_after_the_window() {
    let fx = fixture();
    let k = key("a", "svc");
    fx.deployer.deploy(&k, COUNTER, "native").await.unwrap();

    let handle = fx.h.registry.lookup(&k).unwrap();
    handle.send(ServiceMsg::new("add", serde_json::json!({"n": 3}))).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    fx.hotswap
        .swap(&k, COUNTER_V2, SwapOptions { rollback_window_ms: 100 })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(events_of(&fx, EventType::HotSwapSucceeded).len(), 1);
    assert!(events_of(&fx, EventType::HotSwapRolledBack).is_empty());

    // Migration hook carried the count into the new code.
    let (msg, rx) = ServiceMsg::with_reply("get", serde_json::json!({}));
    fx.h.registry.lookup(&k).unwrap().send(msg).await.unwrap();
    assert_eq!(rx.await.unwrap().unwrap(), serde_json::json!({"count": 3}));

    // New module is installed under the same namespace.
    let ns = k.namespace();
    let current = fx.h.modules.current(&ns).unwrap();
    let factory = test_factory();
    let expected = crate::module::ServiceFactory::compile(&*factory, COUNTER_V2, &ns).unwrap();
    assert_eq!(current.source_hash, expected.source_hash);
}

#[tokio::test]
async fn crash_inside_window_rolls_back_to_old_module() {
    let fx = fixture();
    let k = key("a", "svc");
    fx.deployer.deploy(&k, COUNTER, "native").await.unwrap();
    let ns = k.namespace();
    let old_hash = fx.h.modules.current(&ns).unwrap().source_hash.clone();

    fx.hotswap
        .swap(&k, CRASHY, SwapOptions { rollback_window_ms: 2_000 })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The swapped-in code crashes on its first message.
    fx.h.registry
        .lookup(&k)
        .unwrap()
        .send(ServiceMsg::new("boom", serde_json::Value::Null))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(events_of(&fx, EventType::HotSwapRolledBack).len(), 1);
    assert!(events_of(&fx, EventType::HotSwapSucceeded).is_empty());

    // Old bytecode is back and a worker is running it.
    assert_eq!(fx.h.modules.current(&ns).unwrap().source_hash, old_hash);
    let handle = fx.h.registry.lookup(&k).expect("worker back after rollback");
    assert!(handle.alive());
}

#[tokio::test]
async fn rollback_event_is_caused_by_swap_start() {
    let fx = fixture();
    let k = key("a", "svc");
    fx.deployer.deploy(&k, COUNTER, "native").await.unwrap();

    let started = fx
        .hotswap
        .swap(&k, CRASHY, SwapOptions { rollback_window_ms: 2_000 })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    fx.h.registry
        .lookup(&k)
        .unwrap()
        .send(ServiceMsg::new("boom", serde_json::Value::Null))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let rolled = events_of(&fx, EventType::HotSwapRolledBack);
    assert_eq!(rolled[0].causation_id, Some(started));
}

#[tokio::test]
async fn replace_is_kill_then_deploy() {
    let fx = fixture();
    let k = key("a", "svc");
    fx.deployer.deploy(&k, COUNTER, "native").await.unwrap();
    let first_worker = fx.h.registry.lookup(&k).unwrap().worker_id;

    fx.hotswap.replace(&k, COUNTER_V2).await.unwrap();

    let second_worker = fx.h.registry.lookup(&k).unwrap().worker_id;
    assert_ne!(first_worker, second_worker);

    let succeeded = events_of(&fx, EventType::HotSwapSucceeded);
    assert_eq!(succeeded.len(), 1);
    assert_eq!(
        succeeded[0].payload.get("method").and_then(|v| v.as_str()),
        Some("simple_replace")
    );
    assert_eq!(events_of(&fx, EventType::ServiceKilled).len(), 1);
}

#[tokio::test]
async fn swap_of_one_tenant_never_touches_the_other() {
    let fx = fixture();
    let ka = key("a", "shared");
    let kb = key("b", "shared");
    fx.deployer.deploy(&ka, COUNTER, "native").await.unwrap();
    fx.deployer.deploy(&kb, COUNTER, "native").await.unwrap();

    let b_hash_before = fx.h.modules.current(&kb.namespace()).unwrap().source_hash.clone();
    fx.hotswap
        .swap(&ka, COUNTER_V2, SwapOptions { rollback_window_ms: 50 })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(
        fx.h.modules.current(&kb.namespace()).unwrap().source_hash,
        b_hash_before
    );
}
