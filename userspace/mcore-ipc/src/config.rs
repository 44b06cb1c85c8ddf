// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

use serde::Deserialize;

use mcore_shmem::{
    DualCore, RegionError, COMPANION_TX_OFFSET, DEFAULT_CHANNEL_CAPACITY, PRIMARY_TX_OFFSET,
    SHMEM_BASE,
};

/// Stack reserved for each IPC worker.
pub const DEFAULT_WORKER_STACK_SIZE: usize = 64 * 1024;

/// Scheduling priority of the IPC workers.
pub const IPC_TASK_PRIORITY: u8 = 5;

/// Shared-memory layout and worker identity of one core's IPC service.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IpcConfig {
    /// Base address of the shared window.
    pub shmem_base: u32,
    /// Offset of the channel this core writes.
    pub tx_offset: u16,
    /// Offset of the channel this core reads.
    pub rx_offset: u16,
    /// Bytes of storage per channel.
    pub channel_capacity: usize,
    /// Stack size of each worker.
    pub worker_stack_size: usize,
    /// Priority recorded for both workers.
    pub priority: u8,
}

impl IpcConfig {
    /// Layout seen from the application core.
    pub fn primary() -> Self {
        Self {
            shmem_base: SHMEM_BASE,
            tx_offset: PRIMARY_TX_OFFSET,
            rx_offset: COMPANION_TX_OFFSET,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            worker_stack_size: DEFAULT_WORKER_STACK_SIZE,
            priority: IPC_TASK_PRIORITY,
        }
    }

    /// Layout seen from the companion core: the channels are swapped.
    pub fn companion() -> Self {
        Self::primary().mirrored()
    }

    /// Same layout seen from the other core.
    pub fn mirrored(&self) -> Self {
        Self { tx_offset: self.rx_offset, rx_offset: self.tx_offset, ..self.clone() }
    }

    /// Lays out the shared region described by this config, with the core owning `self`
    /// as the primary side.
    pub fn link(&self) -> Result<DualCore, RegionError> {
        DualCore::with_layout(
            self.shmem_base,
            self.tx_offset,
            self.rx_offset,
            self.channel_capacity,
        )
    }
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self::primary()
    }
}
