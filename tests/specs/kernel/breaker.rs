// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Circuit breaker end-to-end: open on panics, recover after the window.

use crate::prelude::*;
use hive_core::Subject;
use hive_engine::{BreakerConfig, BreakerError, CircuitBreaker, CircuitState};
use std::time::Duration;

#[tokio::test]
async fn panics_open_the_circuit_then_recovery_closes_it() {
    let spec = spec();
    let breaker = CircuitBreaker::new(
        "downstream",
        Subject::System,
        std::sync::Arc::clone(spec.kernel.events()),
        spec.clock.clone(),
        BreakerConfig {
            failure_threshold: 2,
            reset_timeout: Duration::from_millis(100),
            success_threshold: 1,
        },
    );

    // Two calls that panic.
    for _ in 0..2 {
        let result: Result<u32, BreakerError<String>> = breaker
            .call(|| async { panic!("downstream exploded") }, Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(BreakerError::Panicked)));
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    // Third call is rejected outright.
    let result: Result<u32, BreakerError<String>> =
        breaker.call(|| async { Ok(1) }, Duration::from_secs(1)).await;
    assert!(matches!(result, Err(BreakerError::Open)));

    // After the reset window a successful call closes the circuit.
    spec.clock.advance(Duration::from_millis(150));
    let result: Result<u32, BreakerError<String>> =
        breaker.call(|| async { Ok(7) }, Duration::from_secs(1)).await;
    assert_eq!(result.unwrap(), 7);
    assert_eq!(breaker.state(), CircuitState::Closed);

    // Both transitions hit the event log.
    let opened = spec
        .kernel
        .stream(&EventFilter::all().event_type(EventType::CircuitBreakerOpened));
    let closed = spec
        .kernel
        .stream(&EventFilter::all().event_type(EventType::CircuitBreakerClosed));
    assert_eq!(opened.len(), 1);
    assert_eq!(closed.len(), 1);
}

#[tokio::test]
async fn breakers_are_per_service() {
    let spec = spec();
    let set = spec.kernel.breakers();

    let a = set.get("svc-a", Subject::System);
    let b = set.get("svc-b", Subject::System);

    // Open a only.
    for _ in 0..5 {
        let _: Result<u32, BreakerError<String>> = a
            .call(|| async { Err("down".to_string()) }, Duration::from_secs(1))
            .await;
    }
    assert_eq!(a.state(), CircuitState::Open);
    assert_eq!(b.state(), CircuitState::Closed);
}
