// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! hive-storage: on-disk persistence for the service kernel.
//!
//! Two stores, each written only by its owning component:
//! - [`SegmentLog`] — append-only event segments (the audit trail)
//! - [`VaultFile`] — encrypted secret records

pub mod log;
pub mod vault;

pub use log::{LogError, RetentionLimits, SegmentLog};
pub use vault::{SecretRecord, VaultFile, VaultIoError};
