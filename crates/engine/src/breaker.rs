// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-service circuit breaker.
//!
//! Three states: closed → open after `failure_threshold` consecutive
//! failures; open rejects calls until `reset_timeout` elapses; the next
//! call then probes half-open, where `success_threshold` consecutive
//! successes close the circuit and any failure re-opens it. Timed-out calls
//! and panics count as failures and never escape the breaker.

use crate::events::EventStore;
use futures_util::FutureExt;
use hive_core::{payload, Clock, EventType, Subject};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
    pub success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_millis(30_000),
            success_threshold: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Why a protected call did not return a value.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    #[error("circuit open")]
    Open,

    #[error("call timed out")]
    Timeout,

    #[error("call panicked")]
    Panicked,

    #[error("call failed: {0}")]
    Inner(E),
}

struct BreakerInner {
    state: CircuitState,
    failures: u32,
    successes: u32,
    opened_at: Option<Instant>,
}

pub struct CircuitBreaker<C: Clock> {
    name: String,
    subject: Subject,
    events: Arc<EventStore<C>>,
    clock: C,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl<C: Clock> CircuitBreaker<C> {
    pub fn new(
        name: impl Into<String>,
        subject: Subject,
        events: Arc<EventStore<C>>,
        clock: C,
        config: BreakerConfig,
    ) -> Self {
        Self {
            name: name.into(),
            subject,
            events,
            clock,
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failures: 0,
                successes: 0,
                opened_at: None,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Run `fun` under the breaker.
    ///
    /// A timed-out call counts as a failure; a panic in `fun` counts as a
    /// failure and does not propagate.
    pub async fn call<F, Fut, T, E>(
        &self,
        fun: F,
        timeout: Duration,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        {
            let mut inner = self.inner.lock();
            if inner.state == CircuitState::Open {
                let elapsed = inner
                    .opened_at
                    .map(|t| self.clock.now().duration_since(t))
                    .unwrap_or_default();
                if elapsed < self.config.reset_timeout {
                    return Err(BreakerError::Open);
                }
                // Reset timer elapsed: probe with a fresh call.
                inner.state = CircuitState::HalfOpen;
                inner.successes = 0;
            }
        }

        match tokio::time::timeout(timeout, AssertUnwindSafe(fun()).catch_unwind()).await {
            Err(_elapsed) => {
                self.record_failure("timeout");
                Err(BreakerError::Timeout)
            }
            Ok(Err(_panic)) => {
                self.record_failure("panic");
                Err(BreakerError::Panicked)
            }
            Ok(Ok(Err(e))) => {
                self.record_failure("error");
                Err(BreakerError::Inner(e))
            }
            Ok(Ok(Ok(value))) => {
                self.record_success();
                Ok(value)
            }
        }
    }

    fn record_failure(&self, reason: &str) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.failures += 1;
                if inner.failures >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(self.clock.now());
                    drop(inner);
                    warn!(breaker = %self.name, reason, "circuit opened");
                    self.events.emit(
                        EventType::CircuitBreakerOpened,
                        self.subject.clone(),
                        payload! { "breaker" => self.name.clone(), "reason" => reason },
                    );
                }
            }
            CircuitState::HalfOpen => {
                // Probe failed: back to open, reschedule the reset timer.
                inner.state = CircuitState::Open;
                inner.opened_at = Some(self.clock.now());
                inner.successes = 0;
            }
            CircuitState::Open => {}
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.failures = 0;
            }
            CircuitState::HalfOpen => {
                inner.successes += 1;
                if inner.successes >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.failures = 0;
                    inner.opened_at = None;
                    drop(inner);
                    self.events.emit(
                        EventType::CircuitBreakerClosed,
                        self.subject.clone(),
                        payload! { "breaker" => self.name.clone() },
                    );
                }
            }
            CircuitState::Open => {}
        }
    }
}

/// Lazily-created breakers, one per guarded target.
pub struct BreakerSet<C: Clock> {
    events: Arc<EventStore<C>>,
    clock: C,
    config: BreakerConfig,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker<C>>>>,
}

impl<C: Clock> BreakerSet<C> {
    pub fn new(events: Arc<EventStore<C>>, clock: C, config: BreakerConfig) -> Self {
        Self { events, clock, config, breakers: Mutex::new(HashMap::new()) }
    }

    /// Breaker guarding `name`, created closed on first use.
    pub fn get(&self, name: &str, subject: Subject) -> Arc<CircuitBreaker<C>> {
        let mut breakers = self.breakers.lock();
        Arc::clone(breakers.entry(name.to_string()).or_insert_with(|| {
            Arc::new(CircuitBreaker::new(
                name,
                subject,
                Arc::clone(&self.events),
                self.clock.clone(),
                self.config,
            ))
        }))
    }
}

#[cfg(test)]
#[path = "breaker_tests.rs"]
mod tests;
