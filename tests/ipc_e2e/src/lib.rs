//! CONTEXT: Dual-core IPC end-to-end test harness library
//! INTENT: Two in-process cores sharing one region, each running an IpcService
//! DEPS: mcore-shmem (transport), mcore-ipc (service)
//! READINESS: Both services initialized and resumed by `Rig::running`
//! TESTS: Ordered delivery, unknown discriminants, companion handshake, board RPC
// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

use mcore_ipc::{AppPayload, IpcConfig, IpcService};
use mcore_shmem::{DualCore, SHMEM_BASE};

/// Upper bound for any single wait in the e2e tests.
pub const WAIT: Duration = Duration::from_secs(2);

/// Application core and companion core over one shared region.
pub struct Rig {
    /// Shared wiring.
    pub link: DualCore,
    /// Application-core service.
    pub primary: IpcService,
    /// Companion-core service.
    pub companion: IpcService,
}

impl Rig {
    /// Both services constructed, not initialized.
    pub fn new(channel_capacity: usize) -> Self {
        let link = DualCore::new(SHMEM_BASE, channel_capacity).expect("region layout");
        let primary =
            IpcService::new(IpcConfig::primary(), link.primary.clone(), link.region.clone())
                .expect("primary service");
        let companion =
            IpcService::new(IpcConfig::companion(), link.companion.clone(), link.region.clone())
                .expect("companion service");
        Self { link, primary, companion }
    }

    /// Both services initialized and resumed.
    pub fn running(channel_capacity: usize) -> Self {
        let rig = Self::new(channel_capacity);
        for service in [&rig.primary, &rig.companion] {
            service.init().expect("init");
            service.resume().expect("resume");
        }
        rig
    }
}

/// Installs a handler on `service` forwarding every APP payload to the returned receiver.
pub fn record_app_messages(service: &IpcService) -> Receiver<AppPayload> {
    let (tx, rx) = mpsc::channel();
    service.register_app_message_handler(
        move |data: &AppPayload, _: &()| {
            let _ = tx.send(*data);
        },
        (),
    );
    rx
}
