// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Load shedding at the admission boundary.

use crate::prelude::*;

#[tokio::test]
async fn per_tenant_bucket_sheds_at_100() {
    let spec = spec();
    let shedder = spec.kernel.shedder();
    let t1 = tenant("t1");

    let mut permits = Vec::new();
    for i in 0..100 {
        permits.push(
            shedder
                .acquire(&t1)
                .unwrap_or_else(|e| panic!("acquire {i} should pass: {e}")),
        );
    }

    // The 101st is shed.
    assert!(shedder.acquire(&t1).is_err());

    // Separate bucket for another tenant.
    let t2 = tenant("t2");
    shedder.acquire(&t2).unwrap();

    // One release reopens the bucket.
    shedder.release(permits.pop().unwrap());
    shedder.acquire(&t1).unwrap();
}

#[tokio::test]
async fn permit_accounting_stays_consistent() {
    let spec = spec();
    let shedder = spec.kernel.shedder();

    let mut permits = Vec::new();
    for t in ["a", "b", "c"] {
        for _ in 0..5 {
            permits.push(shedder.acquire(&tenant(t)).unwrap());
        }
    }

    let stats = spec.kernel.shed_stats();
    let sum: u32 = stats.per_tenant.values().sum();
    assert_eq!(sum, stats.total_in_flight);
    assert_eq!(stats.total_in_flight, 15);

    for permit in permits {
        shedder.release(permit);
    }
    assert_eq!(spec.kernel.shed_stats().total_in_flight, 0);
    assert_eq!(spec.kernel.shed_stats().num_tenants, 0);
}

#[tokio::test]
async fn overloaded_deploy_is_rejected_cleanly() {
    let spec = spec_with(|mut config| {
        config.max_per_tenant = 1;
        config
    });
    let t = tenant("t1");

    // Hold the single slot so the deploy is shed at admission.
    let _permit = spec.kernel.shedder().acquire(&t).unwrap();
    let err = spec.kernel.deploy(&t, "svc", ECHO, "native").await.unwrap_err();
    assert!(matches!(err, hive_engine::EngineError::Overloaded(_)));

    // Nothing leaked into the registry.
    assert!(spec.kernel.list(&t).is_empty());
}
