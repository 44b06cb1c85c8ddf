// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Cross-core IPC service for the application/companion core pair
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable
//! TEST_COVERAGE: Unit tests per module (host) + tests/ipc_e2e
//!
//! PUBLIC API:
//!   - Envelope / SystemMessage: fixed-size wire envelope (protocol)
//!   - IpcService: tx/rx workers, serialized sends, inbound dispatch
//!   - IpcConfig: shared-memory layout and worker identity
//!   - IpcError: IPC error types
//!
//! DEPENDENCIES:
//!   - mcore-shmem: message buffers + cross-core events
//!   - parking_lot: wait primitives
//!
//! INVARIANTS:
//!   - One envelope in flight per direction per send call; sends are serialized internally
//!   - Inbound envelopes with an unknown discriminant are dropped, never fatal
//!   - Nothing is propagated across the core boundary

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs)]

mod config;
pub mod protocol;
mod service;
mod sync;
mod system;

pub use config::{IpcConfig, DEFAULT_WORKER_STACK_SIZE, IPC_TASK_PRIORITY};
pub use protocol::{
    AppPayload, Envelope, MessageType, ProtocolError, SystemMessage, ENVELOPE_SIZE,
    MESSAGE_BUFFER_DATA_SIZE,
};
pub use service::{IpcService, ServiceState};
pub use sync::{BinarySemaphore, RunGate, TaskNotification};
pub use system::CompanionState;

use thiserror::Error;

/// Result type returned by IPC operations.
pub type Result<T> = core::result::Result<T, IpcError>;

/// Errors produced by the IPC service.
#[derive(Debug, Error)]
pub enum IpcError {
    /// `init()` was called twice.
    #[error("ipc service already initialized")]
    AlreadyInitialized,
    /// The operation requires `init()` first.
    #[error("ipc service not initialized")]
    NotInitialized,
    /// The region lives at a different base address than configured.
    #[error("region base {region:#010x} does not match configured base {configured:#010x}")]
    BaseMismatch {
        /// Base address from the configuration.
        configured: u32,
        /// Base address of the region handed to the service.
        region: u32,
    },
    /// The configured channel offset is not part of the shared region.
    #[error("no transport channel at offset {0:#06x}")]
    MissingChannel(u16),
    /// A worker thread could not be created.
    #[error("failed to spawn {name}: {source}")]
    Spawn {
        /// Worker name.
        name: &'static str,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },
    /// The companion core did not report in time.
    #[error("timed out waiting for companion core")]
    Timeout,
}
