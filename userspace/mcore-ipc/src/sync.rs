// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Blocking primitives used by the IPC workers, built on single-slot channels.
//!
//! Every primitive owns both ends of its channel, so a blocking receive only returns once
//! something was sent.

use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;

/// Binary semaphore: `give` sets the flag, `take` waits for it and clears it.
pub struct BinarySemaphore {
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl BinarySemaphore {
    /// Creates an empty (taken) semaphore.
    pub fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self { tx, rx }
    }

    /// Releases the semaphore. Giving an already given semaphore has no effect.
    pub fn give(&self) {
        let _ = self.tx.try_send(());
    }

    /// Blocks until the semaphore is given, then takes it.
    pub fn take(&self) {
        let _ = self.rx.recv();
    }

    /// Like [`take`](Self::take) but gives up after `timeout`. Returns true on success.
    pub fn take_timeout(&self, timeout: Duration) -> bool {
        self.rx.recv_timeout(timeout).is_ok()
    }
}

impl Default for BinarySemaphore {
    fn default() -> Self {
        Self::new()
    }
}

/// Single-slot notification with overwrite semantics.
///
/// A value posted before the previous one was consumed replaces it.
pub struct TaskNotification<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> TaskNotification<T> {
    /// Creates an empty notification slot.
    pub fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self { tx, rx }
    }

    /// Posts `value`, returning the unconsumed value it replaced.
    pub fn notify_overwrite(&self, value: T) -> Option<T> {
        let mut replaced = None;
        let mut value = value;
        loop {
            match self.tx.try_send(value) {
                Ok(()) => return replaced,
                Err(TrySendError::Full(back)) => {
                    value = back;
                    if let Ok(previous) = self.rx.try_recv() {
                        replaced = Some(previous);
                    }
                }
                Err(TrySendError::Disconnected(_)) => return replaced,
            }
        }
    }

    /// Blocks until a value is posted and takes it.
    ///
    /// Returns `None` only if the slot was torn down, which cannot happen while `self` lives.
    pub fn wait(&self) -> Option<T> {
        self.rx.recv().ok()
    }
}

impl<T> Default for TaskNotification<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Start gate for suspended workers. Closed until [`open`](Self::open) is called once.
///
/// Opening drops the only sender; every receive on a disconnected channel returns at once.
pub struct RunGate {
    closer: Mutex<Option<Sender<()>>>,
    opened: Receiver<()>,
}

impl RunGate {
    /// Creates a closed gate.
    pub fn new() -> Self {
        let (closer, opened) = bounded(0);
        Self { closer: Mutex::new(Some(closer)), opened }
    }

    /// Opens the gate, releasing every current and future waiter.
    pub fn open(&self) {
        self.closer.lock().take();
    }

    /// Returns true once the gate has been opened.
    pub fn is_open(&self) -> bool {
        self.closer.lock().is_none()
    }

    /// Blocks while the gate is closed.
    pub fn wait(&self) {
        let _ = self.opened.recv();
    }
}

impl Default for RunGate {
    fn default() -> Self {
        Self::new()
    }
}
