// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine-level errors, mapped onto the closed [`ErrorKind`] set at the
//! gateway boundary.

use hive_core::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("overloaded: {0}")]
    Overloaded(String),

    #[error("circuit open")]
    CircuitOpen,

    #[error("transient internal error: {0}")]
    Transient(String),

    #[error("fatal: {0}")]
    Fatal(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            EngineError::InvalidInput(_) => ErrorKind::InvalidInput,
            EngineError::Unauthorized(_) => ErrorKind::Unauthorized,
            EngineError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            EngineError::Overloaded(_) => ErrorKind::Overloaded,
            EngineError::CircuitOpen => ErrorKind::CircuitOpen,
            EngineError::Transient(_) => ErrorKind::TransientInternal,
            EngineError::Fatal(_) => ErrorKind::Fatal,
        }
    }

    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::NotFound(what.to_string())
    }
}

impl From<hive_core::NameError> for EngineError {
    fn from(e: hive_core::NameError) -> Self {
        EngineError::InvalidInput(e.to_string())
    }
}
