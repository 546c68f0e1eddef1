// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use hive_core::ErrorKind;

#[test]
fn error_response_carries_code_message_timestamp() {
    let response = Response::error(ErrorBody::new(ErrorKind::NotFound, "no such service", 42));
    let json = serde_json::to_string(&response).unwrap();
    let back: Response = serde_json::from_str(&json).unwrap();
    assert_eq!(response, back);

    match back {
        Response::Error { error } => {
            assert_eq!(error.error_code, ErrorKind::NotFound);
            assert_eq!(error.timestamp, 42);
        }
        other => panic!("expected error, got {other:?}"),
    }
}

#[test]
fn status_entry_roundtrips() {
    let response = Response::StatusInfo {
        entry: crate::ServiceStatusEntry {
            service: "billing".into(),
            worker_id: "wrk-abc".into(),
            alive: true,
            memory_bytes: 4096,
            queue_len: 2,
            processed: 17,
        },
    };
    let json = serde_json::to_string(&response).unwrap();
    let back: Response = serde_json::from_str(&json).unwrap();
    assert_eq!(response, back);
}

#[test]
fn event_frames_are_not_terminal() {
    let ok = Response::Ok;
    assert!(ok.is_terminal());

    let event = hive_core::EventRecord {
        id: 1,
        timestamp: 10,
        wall_clock: chrono::Utc::now(),
        tenant_id: None,
        event_type: hive_core::EventType::SystemStarted,
        subject: hive_core::Subject::System,
        payload: hive_core::Payload::new(),
        causation_id: None,
    };
    assert!(!Response::Event { event }.is_terminal());
}
