// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deploy + status + kill end-to-end.

use crate::prelude::*;
use hive_engine::KillOptions;

#[tokio::test]
async fn deploy_status_kill_with_event_trail() {
    let spec = spec();
    let t = tenant("a");
    let since = spec.kernel.events().last_id();

    // Deploy a valid module exposing a start entrypoint.
    let entry = spec.kernel.deploy(&t, "svc", ECHO, "native").await.unwrap();
    assert!(entry.alive);

    assert!(spec.kernel.status(&t, "svc").unwrap().alive);

    spec.kernel.kill(&t, "svc", KillOptions::default()).await.unwrap();
    assert!(spec.kernel.status(&t, "svc").is_err());

    // Event log since start: service_deployed, then service_killed.
    let events = spec.kernel.stream(&EventFilter::all().since(since));
    let deployed = events
        .iter()
        .position(|e| e.event_type == EventType::ServiceDeployed)
        .expect("service_deployed in log");
    let killed = events
        .iter()
        .position(|e| e.event_type == EventType::ServiceKilled)
        .expect("service_killed in log");
    assert!(deployed < killed);
}

#[tokio::test]
async fn ids_in_the_trail_are_consecutive() {
    let spec = spec();
    let t = tenant("a");

    spec.kernel.deploy(&t, "svc", ECHO, "native").await.unwrap();
    spec.kernel.kill(&t, "svc", KillOptions::default()).await.unwrap();

    let events = spec.kernel.stream(&EventFilter::all());
    for pair in events.windows(2) {
        assert_eq!(pair[1].id, pair[0].id + 1);
    }

    // Every causation id points at an earlier, existing event.
    for event in &events {
        if let Some(cause) = event.causation_id {
            assert!(cause < event.id);
            assert!(events.iter().any(|e| e.id == cause));
        }
    }
}

#[tokio::test]
async fn redeploy_after_kill_is_allowed() {
    let spec = spec();
    let t = tenant("a");

    spec.kernel.deploy(&t, "svc", ECHO, "native").await.unwrap();
    spec.kernel.kill(&t, "svc", KillOptions::default()).await.unwrap();
    let entry = spec.kernel.deploy(&t, "svc", ECHO, "native").await.unwrap();
    assert!(entry.alive);
}
