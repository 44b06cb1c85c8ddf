// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Board bring-up and companion start
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests below + tests/ipc_e2e
//!
//! Bring-up order: IPC service (workers suspended) -> driver init -> queue tasks.
//! `start_m4` is the external trigger that resumes the IPC workers.

use std::sync::Arc;

use log::{error, info};
use parking_lot::Mutex;

use mcore_ipc::IpcService;
use mcore_shmem::{CoreEvents, EventKind, SharedRegion};

use crate::config::BoardConfig;
use crate::tempsense::{TempSenseTask, TemperatureSensor};
use crate::wifi::{WifiRadio, WifiTask};
use crate::{BoardError, DriverError, Result};

/// Boots the companion core.
pub trait CompanionBoot: Send + Sync {
    /// Starts the companion. Called at most once per successful start.
    fn boot(&self) -> core::result::Result<(), DriverError>;
}

/// Drivers handed to [`Board::bring_up`].
pub struct Drivers {
    /// CPU temperature sensor.
    pub sensor: Box<dyn TemperatureSensor>,
    /// Wi-Fi radio.
    pub radio: Box<dyn WifiRadio>,
    /// Companion boot path.
    pub companion: Arc<dyn CompanionBoot>,
}

/// Application-core board services.
pub struct Board {
    config: BoardConfig,
    ipc: IpcService,
    tempsense: TempSenseTask,
    wifi: WifiTask,
    companion: Arc<dyn CompanionBoot>,
    started: Mutex<bool>,
}

impl Board {
    /// Brings up IPC, drivers and tasks. Any failure aborts bring-up.
    ///
    /// `events` is the application core's event manager; `region` the shared window.
    pub fn bring_up(
        config: BoardConfig,
        events: Arc<CoreEvents>,
        region: Arc<SharedRegion>,
        drivers: Drivers,
    ) -> Result<Self> {
        Self::try_bring_up(config, events, region, drivers).inspect_err(|err| {
            error!("board: bring-up failed: {err}");
        })
    }

    fn try_bring_up(
        config: BoardConfig,
        events: Arc<CoreEvents>,
        region: Arc<SharedRegion>,
        drivers: Drivers,
    ) -> Result<Self> {
        let ipc = IpcService::new(config.ipc.clone(), events.clone(), region)?;
        ipc.init()?;
        events.register(
            EventKind::RemoteApplication,
            Arc::new(|data: u16| info!("board: companion handshake {data:#06x}")),
        );

        let tempsense = TempSenseTask::new(config.tempsense.clone(), drivers.sensor)?;
        let wifi = WifiTask::new(config.wifi.clone(), drivers.radio)?;
        tempsense.init()?;
        wifi.init()?;

        info!("board: up");
        Ok(Self {
            config,
            ipc,
            tempsense,
            wifi,
            companion: drivers.companion,
            started: Mutex::new(false),
        })
    }

    /// Boots the companion, resumes the IPC workers and waits for the companion to report.
    ///
    /// Calling it again after success does nothing.
    pub fn start_m4(&self) -> Result<()> {
        let mut started = self.started.lock();
        if *started {
            return Ok(());
        }
        self.companion
            .boot()
            .map_err(|source| BoardError::Driver { component: "companion", source })?;
        self.ipc.resume()?;
        self.ipc.wait_for_companion(self.config.companion_timeout())?;
        *started = true;
        info!("board: companion running");
        Ok(())
    }

    /// Returns true once [`start_m4`](Self::start_m4) succeeded.
    pub fn companion_started(&self) -> bool {
        *self.started.lock()
    }

    /// IPC service of the application core.
    pub fn ipc(&self) -> &IpcService {
        &self.ipc
    }

    /// Temperature task.
    pub fn tempsense(&self) -> &TempSenseTask {
        &self.tempsense
    }

    /// Wi-Fi task.
    pub fn wifi(&self) -> &WifiTask {
        &self.wifi
    }

    /// Active configuration.
    pub fn config(&self) -> &BoardConfig {
        &self.config
    }
}
