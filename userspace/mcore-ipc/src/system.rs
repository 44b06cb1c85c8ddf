// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Handling of SYSTEM envelopes: companion lifecycle tracking.

use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Sender, TrySendError};
use log::debug;
use parking_lot::Mutex;

use crate::protocol::SystemMessage;

/// Lifecycle of the peer core as reported over IPC.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompanionState {
    /// No lifecycle message received yet.
    Offline,
    /// Peer reported that its IPC workers are running.
    Started,
    /// Peer announced it is stopping.
    Stopping,
}

/// Lock order: `state` before `watchers`.
pub(crate) struct SystemHandler {
    state: Mutex<CompanionState>,
    watchers: Mutex<Vec<Sender<()>>>,
}

impl SystemHandler {
    pub(crate) fn new() -> Self {
        Self { state: Mutex::new(CompanionState::Offline), watchers: Mutex::new(Vec::new()) }
    }

    pub(crate) fn handle(&self, message: SystemMessage) {
        let next = match message {
            SystemMessage::CompanionStarted => CompanionState::Started,
            SystemMessage::CompanionStopping => CompanionState::Stopping,
        };
        let mut state = self.state.lock();
        debug!("ipc: companion {:?} -> {:?}", *state, next);
        *state = next;
        self.watchers
            .lock()
            .retain(|w| !matches!(w.try_send(()), Err(TrySendError::Disconnected(()))));
    }

    pub(crate) fn state(&self) -> CompanionState {
        *self.state.lock()
    }

    /// Waits until the peer reports `target`. Returns false on timeout.
    pub(crate) fn wait_for(&self, target: CompanionState, timeout: Duration) -> bool {
        let (watcher, changed) = bounded(1);
        {
            let state = self.state.lock();
            if *state == target {
                return true;
            }
            self.watchers.lock().push(watcher);
        }
        let deadline = Instant::now().checked_add(timeout);
        loop {
            let woke = match deadline {
                Some(deadline) => changed.recv_deadline(deadline).is_ok(),
                None => changed.recv().is_ok(),
            };
            if self.state() == target {
                return true;
            }
            if !woke {
                return false;
            }
        }
    }
}
