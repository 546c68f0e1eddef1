// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Capability grant / verify / revoke.

use crate::prelude::*;

#[tokio::test]
async fn grant_verify_deny_revoke_flow() {
    let spec = spec();
    let t = tenant("t");

    let grant = spec.kernel.grant_capability(&t, "fs", vec!["read".to_string()], 3600);

    // The granted permission verifies.
    spec.kernel.verify_capability(&grant.token, "fs", "read").unwrap();

    // A permission outside the set is denied and logged.
    let err = spec.kernel.verify_capability(&grant.token, "fs", "write").unwrap_err();
    assert!(matches!(err, hive_engine::EngineError::PermissionDenied(_)));
    let denials = spec
        .kernel
        .stream(&EventFilter::all().event_type(EventType::CapabilityDenied));
    assert_eq!(denials.len(), 1);

    // Revoked by hash, the token stops verifying.
    spec.kernel.revoke_capability(&grant.token_hash);
    let err = spec.kernel.verify_capability(&grant.token, "fs", "read").unwrap_err();
    assert!(matches!(err, hive_engine::EngineError::PermissionDenied(_)));
}

#[tokio::test]
async fn forged_tokens_never_verify() {
    let spec = spec();
    let t = tenant("t");
    spec.kernel.grant_capability(&t, "fs", vec!["read".to_string()], 3600);

    // A random 32-byte token (hex) matching nothing.
    let forged = "ab".repeat(32);
    let err = spec.kernel.verify_capability(&forged, "fs", "read").unwrap_err();
    assert!(matches!(err, hive_engine::EngineError::NotFound(_)));
}

#[tokio::test]
async fn grant_and_revoke_are_event_logged() {
    let spec = spec();
    let t = tenant("t");

    let grant = spec.kernel.grant_capability(&t, "net", vec!["dial".to_string()], 60);
    spec.kernel.revoke_capability(&grant.token_hash);

    let granted = spec
        .kernel
        .stream(&EventFilter::all().event_type(EventType::CapabilityGranted));
    let revoked = spec
        .kernel
        .stream(&EventFilter::all().event_type(EventType::CapabilityRevoked));
    assert_eq!(granted.len(), 1);
    assert_eq!(revoked.len(), 1);
    assert_eq!(granted[0].tenant(), Some(&t));
}
