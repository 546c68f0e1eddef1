// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::{tenant, test_factory};
use hive_core::{EventType, FakeClock};

const ECHO: &str = r#"{"module":"echo"}"#;

struct Fixture {
    kernel: Kernel<FakeClock>,
    _dir: tempfile::TempDir,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let config = KernelConfig {
        data_dir: dir.path().to_owned(),
        events_db: dir.path().join("events"),
        vault_db: dir.path().join("vault"),
        cert_dir: dir.path().join("certs"),
        max_tenants: 8,
        max_per_tenant: 4,
        max_total: 16,
        ..KernelConfig::default()
    };
    let kernel = Kernel::with_clock(config, FakeClock::new(), test_factory()).unwrap();
    Fixture { kernel, _dir: dir }
}

#[tokio::test]
async fn startup_emits_system_started() {
    let fx = fixture();
    let events = fx.kernel.stream(&EventFilter::all());
    assert_eq!(events[0].event_type, EventType::SystemStarted);
}

#[tokio::test]
async fn deploy_status_list_kill_through_the_facade() {
    let fx = fixture();
    let t = tenant("acme");

    let entry = fx.kernel.deploy(&t, "svc", ECHO, "native").await.unwrap();
    assert!(entry.alive);

    assert!(fx.kernel.status(&t, "svc").unwrap().alive);
    assert_eq!(fx.kernel.list(&t).len(), 1);

    fx.kernel.kill(&t, "svc", KillOptions::default()).await.unwrap();
    assert!(fx.kernel.status(&t, "svc").is_err());
}

#[tokio::test]
async fn invalid_service_name_is_invalid_input() {
    let fx = fixture();
    let err = fx.kernel.deploy(&tenant("a"), "bad name", ECHO, "native").await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
}

#[tokio::test]
async fn admission_permits_are_released_after_ops() {
    let fx = fixture();
    let t = tenant("acme");

    fx.kernel.deploy(&t, "svc", ECHO, "native").await.unwrap();
    // The deploy permit was returned.
    assert_eq!(fx.kernel.shed_stats().total_in_flight, 0);
}

#[tokio::test]
async fn secrets_flow_through_the_vault() {
    let fx = fixture();
    let t = tenant("acme");

    fx.kernel.set_secret(&t, "token", b"s3cr3t", b"master").unwrap();
    assert_eq!(fx.kernel.get_secret(&t, "token", b"master").unwrap().as_slice(), b"s3cr3t");
    assert_eq!(fx.kernel.list_secrets(&t), vec!["token".to_string()]);

    fx.kernel.delete_secret(&t, "token").unwrap();
    assert!(fx.kernel.get_secret(&t, "token", b"master").is_err());
}

#[tokio::test]
async fn capability_flow_through_the_facade() {
    let fx = fixture();
    let t = tenant("acme");

    let grant = fx.kernel.grant_capability(&t, "fs", vec!["read".into()], 3600);
    fx.kernel.verify_capability(&grant.token, "fs", "read").unwrap();

    fx.kernel.revoke_capability(&grant.token_hash);
    assert!(fx.kernel.verify_capability(&grant.token, "fs", "read").is_err());
}

#[tokio::test]
async fn discovery_round_trip() {
    let fx = fixture();
    let t = tenant("acme");

    fx.kernel.deploy(&t, "svc", ECHO, "native").await.unwrap();
    fx.kernel
        .register_service(&t, "svc", "api".into(), vec!["v1".into()])
        .unwrap();

    let found = fx.kernel.discover_service(&t, "api", &[]);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].service, "svc");

    let all = fx.kernel.get_services(&t, None);
    assert_eq!(all.len(), 1);

    // Registration on a missing service fails.
    assert!(fx.kernel.register_service(&t, "ghost", "x".into(), vec![]).is_err());
}

#[tokio::test]
async fn health_reflects_live_state() {
    let fx = fixture();
    let t = tenant("acme");
    fx.kernel.deploy(&t, "svc", ECHO, "native").await.unwrap();

    let health = fx.kernel.health();
    assert_eq!(health.workers, 1);
    assert_eq!(health.tenants, 1);
    assert!(health.last_event_id > 0);
    assert!(!health.storage_degraded);
}

#[tokio::test]
async fn metrics_text_includes_event_counters() {
    let fx = fixture();
    let t = tenant("acme");
    fx.kernel.deploy(&t, "svc", ECHO, "native").await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let text = fx.kernel.metrics_text();
    assert!(text.contains("hive_workers 1\n"));
    assert!(text.contains("hive_events_total{type=\"service_deployed\"} 1\n"));
}

#[tokio::test]
async fn shutdown_drains_workers_and_emits_both_events() {
    let fx = fixture();
    let t = tenant("acme");
    fx.kernel.deploy(&t, "one", ECHO, "native").await.unwrap();
    fx.kernel.deploy(&t, "two", ECHO, "native").await.unwrap();

    fx.kernel.shutdown(500).await;

    assert_eq!(fx.kernel.registry().worker_count(), 0);
    let events = fx.kernel.stream(&EventFilter::all());
    let started = events
        .iter()
        .position(|e| e.event_type == EventType::SystemShutdownStarted)
        .unwrap();
    let complete = events
        .iter()
        .position(|e| e.event_type == EventType::SystemShutdownComplete)
        .unwrap();
    assert!(started < complete);
}

#[tokio::test]
async fn watch_streams_new_events() {
    let fx = fixture();
    let (id, mut rx) = fx.kernel.watch();

    fx.kernel.deploy(&tenant("acme"), "svc", ECHO, "native").await.unwrap();
    let event = rx.recv().await.unwrap();
    assert!(event.id > 0);

    fx.kernel.unwatch(id);
}
