// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn echo_replies_with_its_body() {
    let mut program = EchoProgram;
    let (msg, rx) = ServiceMsg::with_reply("ping", serde_json::json!({"x": 1}));
    program.on_message(msg).await.unwrap();
    assert_eq!(rx.await.unwrap().unwrap(), serde_json::json!({"x": 1}));
}

#[tokio::test]
async fn counter_adds_and_reports() {
    let mut program = CounterProgram::default();

    let (msg, rx) = ServiceMsg::with_reply("add", serde_json::json!({"n": 3}));
    program.on_message(msg).await.unwrap();
    assert_eq!(rx.await.unwrap().unwrap(), serde_json::json!({"count": 3}));

    let (msg, rx) = ServiceMsg::with_reply("get", serde_json::json!({}));
    program.on_message(msg).await.unwrap();
    assert_eq!(rx.await.unwrap().unwrap(), serde_json::json!({"count": 3}));
}

#[tokio::test]
async fn counter_rejects_unknown_ops_without_failing() {
    let mut program = CounterProgram::default();
    let (msg, rx) = ServiceMsg::with_reply("frobnicate", serde_json::json!({}));
    // The worker keeps running; only the caller sees the error.
    program.on_message(msg).await.unwrap();
    assert!(matches!(rx.await.unwrap(), Err(ServiceError::UnsupportedOp(_))));
}

#[test]
fn counter_snapshot_round_trips_through_prior_state() {
    let program = CounterProgram { count: 42 };
    let snapshot = program.snapshot().unwrap();

    let restored = CounterProgram::with_prior(Some(&snapshot));
    assert_eq!(restored.count, 42);

    let fresh = CounterProgram::with_prior(None);
    assert_eq!(fresh.count, 0);
}

#[test]
fn respond_is_a_noop_without_reply_channel() {
    let mut msg = ServiceMsg::new("op", serde_json::Value::Null);
    msg.respond(Ok(serde_json::Value::Null));
    msg.respond(Ok(serde_json::Value::Null));
}
