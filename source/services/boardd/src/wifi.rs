// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Wi-Fi task.
//!
//! The radio driver is owned by the task worker; every caller goes through the queue, so
//! power, connect and disconnect never interleave.

use std::net::Ipv4Addr;
use std::time::Duration;

use log::{debug, warn};

use mcore_task::{QueueTask, Reply, RequestHandler};

use crate::config::WifiConfig;
use crate::{BoardError, DriverError, Result};

/// Connect/disconnect attempts used when a caller does not choose.
pub const DEFAULT_RETRY_COUNT: u32 = 5;

/// Scan results returned when a caller does not choose.
pub const DEFAULT_SCAN_MAX_RESULTS: u8 = u8::MAX;

/// Network seen by a scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WifiNetwork {
    /// Network name.
    pub ssid: String,
    /// True when the network needs a key.
    pub secured: bool,
}

/// Antenna selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WifiAntenna {
    /// On-board antenna.
    Internal,
    /// U.FL connector.
    External,
}

impl TryFrom<i64> for WifiAntenna {
    type Error = i64;

    fn try_from(index: i64) -> core::result::Result<Self, i64> {
        match index {
            0 => Ok(Self::Internal),
            1 => Ok(Self::External),
            other => Err(other),
        }
    }
}

/// Wi-Fi radio driver.
pub trait WifiRadio: Send + 'static {
    /// Prepares the radio; called once at bring-up.
    fn init(&mut self) -> core::result::Result<(), DriverError>;
    /// Powers the radio on or off. Returns false on failure.
    fn set_power(&mut self, on: bool) -> bool;
    /// One association attempt.
    fn connect(&mut self, ssid: &str, psk: Option<&str>) -> bool;
    /// One disassociation attempt.
    fn disconnect(&mut self) -> bool;
    /// Returns true while associated.
    fn is_connected(&self) -> bool;
    /// Address obtained from the network, if any.
    fn ip(&self) -> Option<Ipv4Addr>;
    /// Selects the antenna.
    fn set_antenna(&mut self, antenna: WifiAntenna) -> bool;
    /// Lists visible networks, at most `max_results` of them.
    fn scan(&mut self, max_results: u8) -> Vec<WifiNetwork>;
}

/// Requests served by the Wi-Fi task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WifiRequest {
    /// Power the radio on or off.
    Power(bool),
    /// Associate with a network.
    Connect {
        /// Network name.
        ssid: String,
        /// Pre-shared key, `None` for open networks.
        psk: Option<String>,
        /// Attempts before giving up.
        retry_count: u32,
    },
    /// Leave the current network.
    Disconnect {
        /// Attempts before giving up.
        retry_count: u32,
    },
    /// Query association.
    Status,
    /// Query the address.
    GetIp,
    /// Choose the antenna.
    SetAntenna(WifiAntenna),
    /// List visible networks.
    Scan {
        /// Upper bound on returned networks.
        max_results: u8,
    },
}

/// Responses produced by the Wi-Fi task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WifiResponse {
    /// Outcome of a command or status query.
    Done(bool),
    /// Outcome of an address query.
    Ip(Option<Ipv4Addr>),
    /// Outcome of a scan.
    Networks(Vec<WifiNetwork>),
}

impl WifiResponse {
    fn ok(self) -> bool {
        matches!(self, Self::Done(true))
    }
}

/// Handler owning the radio driver.
pub struct WifiHandler {
    radio: Box<dyn WifiRadio>,
}

impl WifiHandler {
    fn connect(&mut self, ssid: &str, psk: Option<&str>, retry_count: u32) -> bool {
        if self.radio.is_connected() {
            return true;
        }
        for attempt in 1..=retry_count.max(1) {
            if self.radio.connect(ssid, psk) {
                debug!("wifi: connected to {ssid} (attempt {attempt})");
                return true;
            }
        }
        warn!("wifi: connecting to {ssid} failed after {} attempts", retry_count.max(1));
        false
    }

    fn disconnect(&mut self, retry_count: u32) -> bool {
        for _ in 0..retry_count.max(1) {
            if !self.radio.is_connected() || self.radio.disconnect() {
                return true;
            }
        }
        warn!("wifi: disconnect failed");
        false
    }
}

impl RequestHandler for WifiHandler {
    type Request = WifiRequest;
    type Response = WifiResponse;

    fn handle(&mut self, request: WifiRequest, reply: Reply<WifiResponse>) {
        let response = match request {
            WifiRequest::Power(on) => WifiResponse::Done(self.radio.set_power(on)),
            WifiRequest::Connect { ssid, psk, retry_count } => {
                WifiResponse::Done(self.connect(&ssid, psk.as_deref(), retry_count))
            }
            WifiRequest::Disconnect { retry_count } => {
                WifiResponse::Done(self.disconnect(retry_count))
            }
            WifiRequest::Status => WifiResponse::Done(self.radio.is_connected()),
            WifiRequest::GetIp => WifiResponse::Ip(self.radio.ip()),
            WifiRequest::SetAntenna(antenna) => {
                WifiResponse::Done(self.radio.set_antenna(antenna))
            }
            WifiRequest::Scan { max_results } => {
                let mut found = self.radio.scan(max_results);
                found.truncate(usize::from(max_results));
                WifiResponse::Networks(found)
            }
        };
        let _ = reply.send(response);
    }
}

/// Queue task fronting the Wi-Fi radio.
///
/// Calls that drive the radio wait for the configured reply timeout plus one attempt
/// budget per radio attempt, so a slow association is not reported as a failure.
pub struct WifiTask {
    task: QueueTask<WifiHandler>,
    retry_count: u32,
    attempt_timeout: Duration,
    stored: Option<(String, Option<String>)>,
}

impl WifiTask {
    /// Initializes the driver and binds it to a task. Driver failures are fatal.
    pub fn new(config: WifiConfig, mut radio: Box<dyn WifiRadio>) -> Result<Self> {
        radio.init().map_err(|source| BoardError::Driver { component: "wifi", source })?;
        let attempt_timeout = config.attempt_timeout();
        let stored = config.ssid.map(|ssid| (ssid, config.psk));
        Ok(Self {
            task: QueueTask::new(config.task, WifiHandler { radio }),
            retry_count: config.retry_count,
            attempt_timeout,
            stored,
        })
    }

    /// Starts the task worker.
    pub fn init(&self) -> Result<()> {
        Ok(self.task.init()?)
    }

    /// Attempts used when a caller does not choose.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Network saved in the configuration, if any.
    pub fn stored_ssid(&self) -> Option<&str> {
        self.stored.as_ref().map(|(ssid, _)| ssid.as_str())
    }

    fn budget(&self, attempts: u32) -> Duration {
        self.task
            .config()
            .reply_timeout()
            .saturating_add(self.attempt_timeout.saturating_mul(attempts.max(1)))
    }

    fn call(&self, request: WifiRequest) -> Result<WifiResponse> {
        Ok(self.task.send_request(request)?)
    }

    fn drive(&self, request: WifiRequest, attempts: u32) -> Result<WifiResponse> {
        Ok(self.task.send_request_timeout(request, self.budget(attempts))?)
    }

    /// Powers the radio on.
    pub fn turn_on(&self) -> Result<bool> {
        self.set_power(true)
    }

    /// Powers the radio off.
    pub fn turn_off(&self) -> Result<bool> {
        self.set_power(false)
    }

    /// Powers the radio on or off.
    pub fn set_power(&self, on: bool) -> Result<bool> {
        Ok(self.drive(WifiRequest::Power(on), 1)?.ok())
    }

    /// Associates with `ssid`, trying up to `retry_count` times (default when `None`).
    pub fn connect(&self, ssid: &str, psk: Option<&str>, retry_count: Option<u32>) -> Result<bool> {
        let retry_count = retry_count.unwrap_or(self.retry_count);
        let request = WifiRequest::Connect {
            ssid: ssid.to_owned(),
            psk: psk.map(str::to_owned),
            retry_count,
        };
        Ok(self.drive(request, retry_count)?.ok())
    }

    /// Associates with the network saved in the configuration.
    pub fn connect_stored(&self, retry_count: Option<u32>) -> Result<bool> {
        let (ssid, psk) = self.stored.as_ref().ok_or(BoardError::NoStoredNetwork)?;
        self.connect(ssid, psk.as_deref(), retry_count)
    }

    /// Leaves the current network.
    pub fn disconnect(&self, retry_count: Option<u32>) -> Result<bool> {
        let retry_count = retry_count.unwrap_or(self.retry_count);
        Ok(self.drive(WifiRequest::Disconnect { retry_count }, retry_count)?.ok())
    }

    /// Returns true while associated.
    pub fn is_connected(&self) -> Result<bool> {
        Ok(self.call(WifiRequest::Status)?.ok())
    }

    /// Address obtained from the network.
    pub fn ip(&self) -> Result<Option<Ipv4Addr>> {
        match self.call(WifiRequest::GetIp)? {
            WifiResponse::Ip(ip) => Ok(ip),
            _ => Ok(None),
        }
    }

    /// Selects the antenna.
    pub fn set_antenna(&self, antenna: WifiAntenna) -> Result<bool> {
        Ok(self.drive(WifiRequest::SetAntenna(antenna), 1)?.ok())
    }

    /// Lists up to `max_results` visible networks ([`DEFAULT_SCAN_MAX_RESULTS`] when `None`).
    pub fn scan(&self, max_results: Option<u8>) -> Result<Vec<WifiNetwork>> {
        let max_results = max_results.unwrap_or(DEFAULT_SCAN_MAX_RESULTS);
        match self.drive(WifiRequest::Scan { max_results }, 1)? {
            WifiResponse::Networks(found) => Ok(found),
            _ => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimRadio;
    use mcore_task::TaskConfig;

    fn task_with(config: WifiConfig, radio: SimRadio) -> WifiTask {
        let t = WifiTask::new(config, Box::new(radio)).unwrap();
        t.init().unwrap();
        t
    }

    fn task(radio: SimRadio) -> WifiTask {
        task_with(WifiConfig { task: TaskConfig::named("wifi"), ..WifiConfig::default() }, radio)
    }

    #[test]
    fn connect_requires_power() {
        let wifi = task(SimRadio::new().with_network("lab", Some("secret")));
        assert!(!wifi.connect("lab", Some("secret"), Some(1)).unwrap());
        assert!(wifi.turn_on().unwrap());
        assert!(wifi.connect("lab", Some("secret"), None).unwrap());
        assert!(wifi.is_connected().unwrap());
        assert_eq!(wifi.ip().unwrap(), Some(SimRadio::LEASED_IP));
    }

    #[test]
    fn wrong_key_fails_after_retries() {
        let radio = SimRadio::new().with_network("lab", Some("secret"));
        let attempts = radio.attempts();
        let wifi = task(radio);
        wifi.turn_on().unwrap();
        assert!(!wifi.connect("lab", Some("nope"), Some(3)).unwrap());
        assert_eq!(attempts.load(std::sync::atomic::Ordering::Relaxed), 3);
        assert_eq!(wifi.ip().unwrap(), None);
    }

    #[test]
    fn flaky_network_connects_within_default_retries() {
        let radio = SimRadio::new().with_network("lab", None).failing_first(4);
        let attempts = radio.attempts();
        let wifi = task(radio);
        wifi.turn_on().unwrap();
        assert!(wifi.connect("lab", None, None).unwrap());
        assert_eq!(attempts.load(std::sync::atomic::Ordering::Relaxed), 5);
    }

    #[test]
    fn disconnect_when_idle_succeeds() {
        let wifi = task(SimRadio::new().with_network("lab", None));
        assert!(wifi.disconnect(None).unwrap());
        wifi.turn_on().unwrap();
        wifi.connect("lab", None, None).unwrap();
        assert!(wifi.disconnect(None).unwrap());
        assert!(!wifi.is_connected().unwrap());
    }

    #[test]
    fn power_off_drops_association() {
        let wifi = task(SimRadio::new().with_network("lab", None));
        wifi.turn_on().unwrap();
        wifi.connect("lab", None, None).unwrap();
        assert!(wifi.turn_off().unwrap());
        assert!(!wifi.is_connected().unwrap());
    }

    #[test]
    fn antenna_selection() {
        let wifi = task(SimRadio::new());
        assert!(wifi.set_antenna(WifiAntenna::External).unwrap());
        assert_eq!(WifiAntenna::try_from(2), Err(2));
    }

    #[test]
    fn slow_association_within_retries_is_reported_connected() {
        let radio = SimRadio::new()
            .with_network("lab", Some("secret"))
            .failing_first(2)
            .with_attempt_delay(Duration::from_millis(100));
        let attempts = radio.attempts();
        let wifi = task_with(WifiConfig::default(), radio);
        wifi.turn_on().unwrap();
        assert!(wifi.connect("lab", Some("secret"), None).unwrap());
        assert_eq!(attempts.load(std::sync::atomic::Ordering::Relaxed), 3);
        assert!(wifi.is_connected().unwrap());
    }

    #[test]
    fn stored_network_is_used_without_ssid() {
        let config = WifiConfig {
            ssid: Some("lab".into()),
            psk: Some("secret".into()),
            ..WifiConfig::default()
        };
        let wifi = task_with(config, SimRadio::new().with_network("lab", Some("secret")));
        assert_eq!(wifi.stored_ssid(), Some("lab"));
        wifi.turn_on().unwrap();
        assert!(wifi.connect_stored(None).unwrap());
        assert!(wifi.is_connected().unwrap());
    }

    #[test]
    fn connect_stored_without_saved_network_fails() {
        let wifi = task(SimRadio::new());
        assert!(wifi.stored_ssid().is_none());
        assert!(matches!(wifi.connect_stored(None), Err(BoardError::NoStoredNetwork)));
    }

    #[test]
    fn scan_lists_networks_up_to_limit() {
        let wifi = task(
            SimRadio::new()
                .with_network("lab", Some("secret"))
                .with_network("guest", None)
                .with_network("office", Some("key")),
        );
        assert!(wifi.scan(None).unwrap().is_empty());
        wifi.turn_on().unwrap();
        let all = wifi.scan(None).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[1], WifiNetwork { ssid: "guest".into(), secured: false });
        assert_eq!(wifi.scan(Some(2)).unwrap().len(), 2);
        assert!(wifi.scan(Some(0)).unwrap().is_empty());
    }

    #[test]
    fn set_power_toggles_radio() {
        let wifi = task(SimRadio::new().with_network("lab", None));
        assert!(wifi.set_power(true).unwrap());
        assert!(wifi.connect("lab", None, Some(1)).unwrap());
        assert!(wifi.set_power(false).unwrap());
        assert!(!wifi.is_connected().unwrap());
    }
}
