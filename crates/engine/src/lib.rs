// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! hive-engine: the service kernel control plane.
//!
//! The interlocking subsystems live here: event store, worker registry and
//! supervisor tree, deployer, hot-swap engine with its watchdog, capability
//! manager, encrypted vault, load shedder and circuit breakers. [`Kernel`]
//! wires them together behind the operations the gateways expose.

pub mod breaker;
pub mod capability;
pub mod deploy;
pub mod error;
pub mod events;
pub mod hotswap;
pub mod kernel;
pub mod metrics;
pub mod module;
pub mod registry;
pub mod service;
pub mod shed;
pub mod supervisor;
pub mod vault;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use breaker::{BreakerConfig, BreakerError, BreakerSet, CircuitBreaker, CircuitState};
pub use capability::{
    AttenuatedProxy, Capability, CapabilityError, CapabilityId, CapabilityManager, Grant,
};
pub use deploy::{Deployer, KillOptions};
pub use error::EngineError;
pub use events::{EventStore, SubscriberId};
pub use hotswap::{HotSwap, SwapOptions};
pub use kernel::Kernel;
pub use metrics::KernelMetrics;
pub use module::{CompileError, ModuleStore, NativeFactory, ServiceFactory, ServiceModule};
pub use registry::{Registry, RegistryEntry, WorkerHandle};
pub use service::{ProgramBuilder, ServiceError, ServiceMsg, ServiceProgram, StartOptions};
pub use shed::{LoadShedder, PermitId};
pub use supervisor::SupervisorTree;
pub use vault::Vault;
pub use worker::{WorkerExit, WorkerId, WorkerStats};
