// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Totally-ordered event store with fan-out subscriptions.
//!
//! Single logical writer: id allocation, disk append and dispatch happen
//! under one mutex, so `emit` is linearizable with `last_id`. Delivery to
//! subscribers is best-effort — a subscriber that cannot keep up is dropped
//! (with a `resource_violation` event) rather than back-pressuring writers.
//! Persistence failures surface as `storage_degraded`; emit itself never
//! fails from the caller's perspective.

use hive_core::{
    payload, Clock, EventFilter, EventId, EventRecord, EventType, Payload, Subject,
};
use hive_storage::{LogError, RetentionLimits, SegmentLog};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::error;

hive_core::define_id! {
    /// Identifies one fan-out subscription.
    pub struct SubscriberId("sub-");
}

/// Per-subscriber channel depth. A subscriber this far behind is dropped.
const SUBSCRIBER_BUFFER: usize = 256;

struct Subscriber {
    id: SubscriberId,
    tx: mpsc::Sender<Arc<EventRecord>>,
}

struct StoreInner {
    last_id: EventId,
    log: SegmentLog,
    degraded: bool,
    subscribers: Vec<Subscriber>,
}

/// The kernel's system of record.
pub struct EventStore<C: Clock> {
    clock: C,
    inner: Mutex<StoreInner>,
}

impl<C: Clock> EventStore<C> {
    /// Open the store over the segment log in `dir`.
    pub fn open(dir: &Path, limits: RetentionLimits, clock: C) -> Result<Self, LogError> {
        let log = SegmentLog::open(dir, limits)?;
        let last_id = log.last_appended();
        Ok(Self {
            clock,
            inner: Mutex::new(StoreInner {
                last_id,
                log,
                degraded: false,
                subscribers: Vec::new(),
            }),
        })
    }

    /// Emit an event. Infallible from the caller's perspective.
    pub fn emit(&self, event_type: EventType, subject: Subject, payload: Payload) -> EventId {
        let mut inner = self.inner.lock();
        self.emit_locked(&mut inner, event_type, subject, payload, None)
    }

    /// Emit an event caused by a previously emitted one.
    pub fn emit_caused(
        &self,
        event_type: EventType,
        subject: Subject,
        payload: Payload,
        causation: EventId,
    ) -> EventId {
        let mut inner = self.inner.lock();
        self.emit_locked(&mut inner, event_type, subject, payload, Some(causation))
    }

    fn emit_locked(
        &self,
        inner: &mut StoreInner,
        event_type: EventType,
        subject: Subject,
        payload: Payload,
        causation: Option<EventId>,
    ) -> EventId {
        inner.last_id += 1;
        let id = inner.last_id;

        let record = EventRecord {
            id,
            timestamp: self.clock.monotonic_ms(),
            wall_clock: self.clock.wall_clock(),
            tenant_id: subject.tenant().cloned(),
            event_type,
            subject,
            payload,
            // Causation always references an already-emitted event
            causation_id: causation.filter(|c| *c < id),
        };

        if let Err(e) = inner.log.append(&record) {
            error!(id, error = %e, "event append failed");
            self.mark_degraded(inner, &e);
        }

        // Fan out. Slow subscribers are dropped, never waited on.
        let record = Arc::new(record);
        let mut lagged: Vec<SubscriberId> = Vec::new();
        inner.subscribers.retain(|sub| match sub.tx.try_send(Arc::clone(&record)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                lagged.push(sub.id);
                false
            }
            // Receiver dropped: normal unsubscribe
            Err(TrySendError::Closed(_)) => false,
        });

        for sub in lagged {
            self.emit_locked(
                inner,
                EventType::ResourceViolation,
                Subject::System,
                payload! {
                    "reason" => "subscriber_lagged",
                    "subscriber" => sub.to_string(),
                },
                Some(id),
            );
        }

        id
    }

    fn mark_degraded(&self, inner: &mut StoreInner, cause: &LogError) {
        if inner.degraded {
            return;
        }
        inner.degraded = true;
        self.emit_locked(
            inner,
            EventType::StorageDegraded,
            Subject::System,
            payload! { "error" => cause.to_string() },
            None,
        );
    }

    /// Highest assigned id. Monotonic across the process lifetime.
    pub fn last_id(&self) -> EventId {
        self.inner.lock().last_id
    }

    /// True once a persistence error has been observed.
    pub fn is_degraded(&self) -> bool {
        self.inner.lock().degraded
    }

    /// Force pending appends to durable storage.
    pub fn flush(&self) {
        let mut inner = self.inner.lock();
        if let Err(e) = inner.log.flush() {
            error!(error = %e, "event log flush failed");
            self.mark_degraded(&mut inner, &e);
        }
    }

    /// Group-commit tick: flush when the interval or buffer threshold hit.
    pub fn maintain(&self) {
        let mut inner = self.inner.lock();
        if inner.log.needs_flush() {
            if let Err(e) = inner.log.flush() {
                error!(error = %e, "event log flush failed");
                self.mark_degraded(&mut inner, &e);
            }
        }
    }

    /// Snapshot of stored events matching `filter`, ascending id order.
    pub fn stream(&self, filter: &EventFilter) -> Vec<EventRecord> {
        let mut inner = self.inner.lock();
        if let Err(e) = inner.log.flush() {
            error!(error = %e, "event log flush failed");
            self.mark_degraded(&mut inner, &e);
        }
        let since = filter.since_id.unwrap_or(0);
        match inner.log.read_from(since) {
            Ok(events) => events.into_iter().filter(|e| filter.matches(e)).collect(),
            Err(e) => {
                error!(error = %e, "event log read failed");
                Vec::new()
            }
        }
    }

    /// Convenience over [`stream`](Self::stream) with an arbitrary predicate.
    pub fn filter(&self, predicate: impl Fn(&EventRecord) -> bool) -> Vec<EventRecord> {
        self.stream(&EventFilter::all()).into_iter().filter(|e| predicate(e)).collect()
    }

    /// Register for every subsequently emitted event.
    ///
    /// Closing the receiver unsubscribes.
    pub fn subscribe(&self) -> (SubscriberId, mpsc::Receiver<Arc<EventRecord>>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let id = SubscriberId::new();
        self.inner.lock().subscribers.push(Subscriber { id, tx });
        (id, rx)
    }

    /// Remove a subscription. Idempotent.
    pub fn unsubscribe(&self, id: SubscriberId) {
        self.inner.lock().subscribers.retain(|sub| sub.id != id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
