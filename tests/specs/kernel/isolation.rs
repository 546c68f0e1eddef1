// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tenant isolation: same service name, disjoint worlds.

use crate::prelude::*;
use hive_engine::KillOptions;

#[tokio::test]
async fn same_name_deploys_per_tenant_and_kills_independently() {
    let spec = spec();
    let a = tenant("A");
    let b = tenant("B");

    // Same source under the same service name for both tenants.
    spec.kernel.deploy(&a, "shared", COUNTER, "native").await.unwrap();
    spec.kernel.deploy(&b, "shared", COUNTER, "native").await.unwrap();

    let list_a: Vec<String> = spec.kernel.list(&a).into_iter().map(|s| s.service).collect();
    let list_b: Vec<String> = spec.kernel.list(&b).into_iter().map(|s| s.service).collect();
    assert_eq!(list_a, vec!["shared".to_string()]);
    assert_eq!(list_b, vec!["shared".to_string()]);

    spec.kernel.kill(&a, "shared", KillOptions::default()).await.unwrap();

    let list_a: Vec<String> = spec.kernel.list(&a).into_iter().map(|s| s.service).collect();
    let list_b: Vec<String> = spec.kernel.list(&b).into_iter().map(|s| s.service).collect();
    assert!(list_a.is_empty());
    assert_eq!(list_b, vec!["shared".to_string()]);
    assert!(spec.kernel.status(&b, "shared").unwrap().alive);
}

#[tokio::test]
async fn secrets_are_tenant_scoped() {
    let spec = spec();
    let a = tenant("A");
    let b = tenant("B");

    spec.kernel.set_secret(&a, "shared-name", b"a-value", b"key").unwrap();

    // Same name under another tenant is simply absent.
    assert!(spec.kernel.get_secret(&b, "shared-name", b"key").is_err());
    assert!(spec.kernel.list_secrets(&b).is_empty());
}

#[tokio::test]
async fn event_filters_keep_tenants_apart() {
    let spec = spec();
    let a = tenant("A");
    let b = tenant("B");

    spec.kernel.deploy(&a, "svc", ECHO, "native").await.unwrap();
    spec.kernel.deploy(&b, "svc", ECHO, "native").await.unwrap();

    let a_events = spec.kernel.stream(&EventFilter::all().tenant(a.clone()));
    assert!(!a_events.is_empty());
    assert!(a_events.iter().all(|e| e.tenant() == Some(&a)));
}
