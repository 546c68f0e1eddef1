// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Kernel counters, fed from the event stream.
//!
//! Metrics piggyback on the event log: a background subscriber counts
//! emitted events by type, so the counters never need plumbing through the
//! components. `render` produces a plain text exposition for the Metrics
//! operation; the HTTP scrape surface lives outside the kernel.

use crate::events::EventStore;
use hive_core::{Clock, EventType};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

pub struct KernelMetrics {
    started_at: Instant,
    event_counts: Mutex<BTreeMap<String, u64>>,
}

impl KernelMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { started_at: Instant::now(), event_counts: Mutex::new(BTreeMap::new()) })
    }

    /// Start the counting subscriber. Call once after the store exists.
    pub fn attach<C: Clock>(self: &Arc<Self>, events: &EventStore<C>) {
        let (_id, mut rx) = events.subscribe();
        let metrics = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                metrics.record(event.event_type);
            }
        });
    }

    pub fn record(&self, event_type: EventType) {
        *self.event_counts.lock().entry(event_type.to_string()).or_insert(0) += 1;
    }

    pub fn uptime_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    /// Text exposition of kernel counters and live gauges.
    pub fn render(&self, workers: usize, tenants: usize, last_event_id: u64) -> String {
        let mut out = String::new();
        out.push_str(&format!("hive_uptime_seconds {}\n", self.uptime_ms() / 1000));
        out.push_str(&format!("hive_workers {workers}\n"));
        out.push_str(&format!("hive_tenants {tenants}\n"));
        out.push_str(&format!("hive_last_event_id {last_event_id}\n"));
        for (event_type, count) in self.event_counts.lock().iter() {
            out.push_str(&format!("hive_events_total{{type=\"{event_type}\"}} {count}\n"));
        }
        out
    }
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
