// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Board configuration, loaded from TOML. Every field has a default, so an empty file is
//! valid.
//!
//! ```toml
//! companion_timeout_ms = 1000
//!
//! [ipc]
//! shmem_base = 0x202C0000
//!
//! [wifi]
//! name = "wifi_task"
//! retry_count = 5
//! attempt_timeout_ms = 5000
//! ssid = "nexus-lab"
//! psk = "nexus-lab"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use mcore_ipc::IpcConfig;
use mcore_task::TaskConfig;

use crate::wifi::DEFAULT_RETRY_COUNT;

/// Default bound on waiting for the companion to report in after boot.
pub const DEFAULT_COMPANION_TIMEOUT_MS: u64 = 1000;

/// Default time allowed for one radio attempt (association, scan, power change).
pub const DEFAULT_WIFI_ATTEMPT_TIMEOUT_MS: u64 = 5000;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("reading {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid configuration.
    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Wi-Fi task settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WifiConfig {
    /// Queue task identity.
    #[serde(flatten)]
    pub task: TaskConfig,
    /// Connect/disconnect attempts when a request does not name one.
    pub retry_count: u32,
    /// Time allowed for one radio attempt, in milliseconds.
    pub attempt_timeout_ms: u64,
    /// Saved network used when a connect names none.
    pub ssid: Option<String>,
    /// Key of the saved network.
    pub psk: Option<String>,
}

impl WifiConfig {
    /// Attempt timeout as a duration.
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            task: TaskConfig::named("wifi_task"),
            retry_count: DEFAULT_RETRY_COUNT,
            attempt_timeout_ms: DEFAULT_WIFI_ATTEMPT_TIMEOUT_MS,
            ssid: None,
            psk: None,
        }
    }
}

/// Complete board configuration.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    /// IPC layout of this (application) core.
    pub ipc: IpcConfig,
    /// Temperature sensor task.
    pub tempsense: TaskConfig,
    /// Wi-Fi task.
    pub wifi: WifiConfig,
    /// Bound on waiting for the companion after `start_m4`, in milliseconds.
    pub companion_timeout_ms: u64,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            ipc: IpcConfig::primary(),
            tempsense: TaskConfig::named("tempsense_task"),
            wifi: WifiConfig::default(),
            companion_timeout_ms: DEFAULT_COMPANION_TIMEOUT_MS,
        }
    }
}

impl BoardConfig {
    /// Parses a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&text)
    }

    /// Companion timeout as a duration.
    pub fn companion_timeout(&self) -> Duration {
        Duration::from_millis(self.companion_timeout_ms)
    }
}
