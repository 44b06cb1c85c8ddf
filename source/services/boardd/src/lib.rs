// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Board service for the application core (drivers, queue tasks, RPC methods)
//! OWNERS: @runtime
//! STATUS: Functional (host simulation backend)
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests per module (host) + tests/ipc_e2e
//!
//! PUBLIC API:
//!   - Board::bring_up(): IPC service, driver init, queue tasks
//!   - Board::start_m4(): companion boot + IPC resume
//!   - TempSenseTask / WifiTask: queue tasks fronting the drivers
//!   - rpc::MethodTable: JSON method table invoking the tasks
//!   - BoardConfig: TOML configuration
//!
//! DEPENDS_ON: mcore-shmem, mcore-ipc, mcore-task
//!
//! INVARIANTS:
//!   - Driver init failures abort bring-up
//!   - Drivers are only touched from their task worker

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs)]

mod board;
pub mod config;
pub mod rpc;
pub mod sim;
mod tempsense;
mod wifi;

pub use board::{Board, CompanionBoot, Drivers};
pub use config::BoardConfig;
pub use tempsense::{
    TempSenseHandler, TempSenseRequest, TempSenseTask, TempSensor, TemperatureSensor,
    ABSOLUTE_ZERO_C,
};
pub use wifi::{
    WifiAntenna, WifiHandler, WifiNetwork, WifiRadio, WifiRequest, WifiResponse, WifiTask,
    DEFAULT_RETRY_COUNT, DEFAULT_SCAN_MAX_RESULTS,
};

use thiserror::Error;

/// Result type returned by board operations.
pub type Result<T> = core::result::Result<T, BoardError>;

/// Failure reported by a hardware driver.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct DriverError(pub String);

impl DriverError {
    /// Creates a driver error from any message.
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Errors produced while bringing up or driving the board.
#[derive(Debug, Error)]
pub enum BoardError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    /// Shared-memory layout is unusable.
    #[error("shared region: {0}")]
    Region(#[from] mcore_shmem::RegionError),
    /// IPC service failure.
    #[error("ipc: {0}")]
    Ipc(#[from] mcore_ipc::IpcError),
    /// Queue task failure.
    #[error("task: {0}")]
    Task(#[from] mcore_task::TaskError),
    /// A connect named no network and none is saved in the configuration.
    #[error("wifi: no network saved")]
    NoStoredNetwork,
    /// A driver failed.
    #[error("{component}: {source}")]
    Driver {
        /// Failing component.
        component: &'static str,
        /// Driver error.
        #[source]
        source: DriverError,
    },
}
