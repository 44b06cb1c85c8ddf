// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Host simulation backend: drivers and a companion core running in-process.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::info;
use parking_lot::Mutex;

use mcore_ipc::{AppPayload, Envelope, IpcConfig, IpcService, SystemMessage};
use mcore_shmem::{CoreEvents, EventKind, EventSink, SharedRegion};

use crate::board::CompanionBoot;
use crate::tempsense::TemperatureSensor;
use crate::wifi::{WifiAntenna, WifiNetwork, WifiRadio};
use crate::DriverError;

/// Handshake value the simulated companion raises on the application core after boot.
pub const COMPANION_HANDSHAKE: u16 = 0x4D34;

/// Temperature sensor returning a fixed reading.
pub struct SimTemperatureSensor {
    celsius: f32,
    fail_init: bool,
}

impl SimTemperatureSensor {
    /// Sensor reading `celsius`.
    pub fn new(celsius: f32) -> Self {
        Self { celsius, fail_init: false }
    }

    /// Sensor whose init fails.
    pub fn failing() -> Self {
        Self { celsius: 0.0, fail_init: true }
    }
}

impl TemperatureSensor for SimTemperatureSensor {
    fn init(&mut self) -> Result<(), DriverError> {
        if self.fail_init {
            return Err(DriverError::new("sensor did not respond"));
        }
        Ok(())
    }

    fn measure(&mut self) -> f32 {
        self.celsius
    }
}

/// Radio with a fixed set of reachable networks.
pub struct SimRadio {
    networks: Vec<(String, Option<String>)>,
    powered: bool,
    associated: bool,
    antenna: WifiAntenna,
    fail_next: u32,
    attempt_delay: Duration,
    attempts: Arc<AtomicU32>,
}

impl SimRadio {
    /// Address handed out on association.
    pub const LEASED_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 0, 42);

    /// Powered-off radio with no reachable network.
    pub fn new() -> Self {
        Self {
            networks: Vec::new(),
            powered: false,
            associated: false,
            antenna: WifiAntenna::Internal,
            fail_next: 0,
            attempt_delay: Duration::ZERO,
            attempts: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Makes `ssid` reachable with key `psk`.
    pub fn with_network(mut self, ssid: &str, psk: Option<&str>) -> Self {
        self.networks.push((ssid.to_owned(), psk.map(str::to_owned)));
        self
    }

    /// Fails the next `n` association attempts.
    pub fn failing_first(mut self, n: u32) -> Self {
        self.fail_next = n;
        self
    }

    /// Makes every association attempt take `delay`.
    pub fn with_attempt_delay(mut self, delay: Duration) -> Self {
        self.attempt_delay = delay;
        self
    }

    /// Counter of association attempts.
    pub fn attempts(&self) -> Arc<AtomicU32> {
        self.attempts.clone()
    }
}

impl Default for SimRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl WifiRadio for SimRadio {
    fn init(&mut self) -> Result<(), DriverError> {
        Ok(())
    }

    fn set_power(&mut self, on: bool) -> bool {
        self.powered = on;
        if !on {
            self.associated = false;
        }
        true
    }

    fn connect(&mut self, ssid: &str, psk: Option<&str>) -> bool {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        if !self.attempt_delay.is_zero() {
            thread::sleep(self.attempt_delay);
        }
        if !self.powered {
            return false;
        }
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return false;
        }
        self.associated =
            self.networks.iter().any(|(name, key)| name == ssid && key.as_deref() == psk);
        self.associated
    }

    fn disconnect(&mut self) -> bool {
        self.associated = false;
        true
    }

    fn is_connected(&self) -> bool {
        self.associated
    }

    fn ip(&self) -> Option<Ipv4Addr> {
        self.associated.then_some(Self::LEASED_IP)
    }

    fn set_antenna(&mut self, antenna: WifiAntenna) -> bool {
        self.antenna = antenna;
        true
    }

    fn scan(&mut self, max_results: u8) -> Vec<WifiNetwork> {
        if !self.powered {
            return Vec::new();
        }
        self.networks
            .iter()
            .take(usize::from(max_results))
            .map(|(ssid, psk)| WifiNetwork { ssid: ssid.clone(), secured: psk.is_some() })
            .collect()
    }
}

/// Companion core simulated in-process.
///
/// Booting brings up the companion's IPC service over the shared region, echoes every APP
/// payload back to the application core and reports `CompanionStarted`.
pub struct SimCompanion {
    config: IpcConfig,
    events: Arc<CoreEvents>,
    region: Arc<SharedRegion>,
    app_core: Arc<CoreEvents>,
    service: Mutex<Option<IpcService>>,
}

impl SimCompanion {
    /// Companion using `events` for its own interrupts and raising handshakes on `app_core`.
    pub fn new(
        config: IpcConfig,
        events: Arc<CoreEvents>,
        region: Arc<SharedRegion>,
        app_core: Arc<CoreEvents>,
    ) -> Self {
        Self { config, events, region, app_core, service: Mutex::new(None) }
    }

    /// IPC service of the companion once booted.
    pub fn service(&self) -> Option<IpcService> {
        self.service.lock().clone()
    }

    /// Announces that the companion stops servicing IPC.
    pub fn stop(&self) {
        if let Some(service) = self.service() {
            service.send_message(&Envelope::System(SystemMessage::CompanionStopping));
        }
    }
}

impl CompanionBoot for SimCompanion {
    fn boot(&self) -> Result<(), DriverError> {
        let mut slot = self.service.lock();
        if slot.is_some() {
            return Ok(());
        }
        let to_driver = |err: mcore_ipc::IpcError| DriverError::new(err.to_string());
        let service = IpcService::new(self.config.clone(), self.events.clone(), self.region.clone())
            .map_err(to_driver)?;
        service.init().map_err(to_driver)?;
        service.register_app_message_handler(
            |data: &AppPayload, service: &IpcService| {
                service.send_message(&Envelope::App(*data));
            },
            service.clone(),
        );
        service.resume().map_err(to_driver)?;
        service.send_message(&Envelope::System(SystemMessage::CompanionStarted));
        self.app_core.raise(EventKind::RemoteApplication, COMPANION_HANDSHAKE);
        info!("companion: booted");
        *slot = Some(service);
        Ok(())
    }
}
