// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error kinds shared across the kernel and its gateways.
//!
//! Every core operation returns a tagged result; the gateway maps kinds to
//! protocol status. Only `TransientInternal` is retryable.

use serde::{Deserialize, Serialize};

/// Closed set of user-visible error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Target service/secret/capability does not exist for the given tenant.
    NotFound,
    /// Duplicate `(tenant, service)` or secret name.
    AlreadyExists,
    /// Malformed id, unsupported format, body violates schema.
    InvalidInput,
    /// Missing/invalid tenant identification.
    Unauthorized,
    /// Capability check failed.
    PermissionDenied,
    /// Load shedder rejected the request.
    Overloaded,
    /// Circuit breaker rejected the call.
    CircuitOpen,
    /// Retryable internal failure.
    TransientInternal,
    /// Unrecoverable; shutdown indicated.
    Fatal,
}

crate::simple_display! {
    ErrorKind {
        NotFound => "not_found",
        AlreadyExists => "already_exists",
        InvalidInput => "invalid_input",
        Unauthorized => "unauthorized",
        PermissionDenied => "permission_denied",
        Overloaded => "overloaded",
        CircuitOpen => "circuit_open",
        TransientInternal => "transient_internal",
        Fatal => "fatal",
    }
}

impl ErrorKind {
    /// Only transient internal failures may be retried by callers.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::TransientInternal)
    }
}

/// Wire shape of a user-visible error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error_code: ErrorKind,
    pub message: String,
    /// Epoch milliseconds at the time the error was produced.
    pub timestamp: u64,
}

impl ErrorBody {
    pub fn new(error_code: ErrorKind, message: impl Into<String>, timestamp: u64) -> Self {
        Self { error_code, message: message.into(), timestamp }
    }
}

impl std::fmt::Display for ErrorBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_code, self.message)
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
