// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The seam between the kernel and user-supplied service code.
//!
//! A compiled module yields a [`ServiceProgram`]; the worker task drives it
//! through its lifecycle hooks. Programs communicate with the outside world
//! only through their mailbox — one [`ServiceMsg`] at a time, FIFO.

use async_trait::async_trait;
use hive_core::ServiceKey;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;

/// Failure surfaced by service code.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ServiceError {
    #[error("service failed: {0}")]
    Failed(String),

    #[error("unsupported operation: {0}")]
    UnsupportedOp(String),

    #[error("forbidden")]
    Forbidden,

    #[error("service is stopping")]
    Stopping,
}

/// A message delivered to a worker mailbox.
///
/// `op` is the operation tag an attenuated proxy whitelists on; `reply` is
/// the correlation channel back to the caller.
#[derive(Debug)]
pub struct ServiceMsg {
    pub op: String,
    pub body: serde_json::Value,
    pub reply: Option<oneshot::Sender<Result<serde_json::Value, ServiceError>>>,
}

impl ServiceMsg {
    pub fn new(op: impl Into<String>, body: serde_json::Value) -> Self {
        Self { op: op.into(), body, reply: None }
    }

    /// Build a message with a reply channel; returns the receiving half.
    pub fn with_reply(
        op: impl Into<String>,
        body: serde_json::Value,
    ) -> (Self, oneshot::Receiver<Result<serde_json::Value, ServiceError>>) {
        let (tx, rx) = oneshot::channel();
        (Self { op: op.into(), body, reply: Some(tx) }, rx)
    }

    /// Send a reply if the caller is still waiting.
    pub fn respond(&mut self, result: Result<serde_json::Value, ServiceError>) {
        if let Some(tx) = self.reply.take() {
            let _ = tx.send(result);
        }
    }
}

/// Options handed to a program constructor.
#[derive(Debug, Clone)]
pub struct StartOptions {
    pub key: ServiceKey,
    /// Module configuration from the deployed manifest
    pub config: serde_json::Value,
    /// State exported by the previous program instance across a hot swap.
    /// `None` on fresh deploys and when the old program exports nothing.
    pub prior_state: Option<serde_json::Value>,
}

impl StartOptions {
    pub fn new(key: ServiceKey, config: serde_json::Value) -> Self {
        Self { key, config, prior_state: None }
    }
}

/// User service code as seen by the worker loop.
///
/// `snapshot` is the hot-swap migration hook: a program that wants its state
/// carried across a code swap exports it here, and the replacement instance
/// receives it via [`StartOptions::prior_state`]. The default exports
/// nothing.
#[async_trait]
pub trait ServiceProgram: Send + 'static {
    async fn on_start(&mut self) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn on_message(&mut self, msg: ServiceMsg) -> Result<(), ServiceError>;

    async fn on_stop(&mut self) {}

    fn snapshot(&self) -> Option<serde_json::Value> {
        None
    }
}

/// Constructor closure: called with options, starts a program.
pub type ProgramBuilder =
    Arc<dyn Fn(StartOptions) -> Result<Box<dyn ServiceProgram>, ServiceError> + Send + Sync>;

/// Echo program: replies to every message with its own body.
pub struct EchoProgram;

#[async_trait]
impl ServiceProgram for EchoProgram {
    async fn on_message(&mut self, mut msg: ServiceMsg) -> Result<(), ServiceError> {
        let body = msg.body.clone();
        msg.respond(Ok(body));
        Ok(())
    }
}

/// Counter program: `add` increments, `get` replies with the count.
///
/// Exports its count across hot swaps.
#[derive(Default)]
pub struct CounterProgram {
    count: i64,
}

impl CounterProgram {
    pub fn with_prior(prior: Option<&serde_json::Value>) -> Self {
        let count = prior
            .and_then(|v| v.get("count"))
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        Self { count }
    }
}

#[async_trait]
impl ServiceProgram for CounterProgram {
    async fn on_message(&mut self, mut msg: ServiceMsg) -> Result<(), ServiceError> {
        match msg.op.as_str() {
            "add" => {
                let n = msg.body.get("n").and_then(|v| v.as_i64()).unwrap_or(1);
                self.count += n;
                msg.respond(Ok(serde_json::json!({ "count": self.count })));
                Ok(())
            }
            "get" => {
                msg.respond(Ok(serde_json::json!({ "count": self.count })));
                Ok(())
            }
            other => {
                let op = other.to_string();
                msg.respond(Err(ServiceError::UnsupportedOp(op.clone())));
                Ok(())
            }
        }
    }

    fn snapshot(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({ "count": self.count }))
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
