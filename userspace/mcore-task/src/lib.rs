// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Queue-backed worker tasks with synchronous request/response calls
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable
//! TEST_COVERAGE: Unit + property tests per module (host)
//!
//! PUBLIC API:
//!   - QueueTask<H>: bounded request queue + dedicated worker
//!   - RequestHandler: per-subsystem strategy run on the worker
//!   - Reply<T>: single-use reply slot carried by each request
//!   - TaskConfig: worker identity and timeouts
//!   - TaskError: task error types
//!
//! INVARIANTS:
//!   - Requests are handled in FIFO order by exactly one worker
//!   - A synchronous request gets at most one reply; a missing reply is reported as NoReply
//!   - Every wait on the caller side is bounded by the configured timeouts

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs)]

mod config;
mod reply;
mod task;

pub use config::{
    TaskConfig, DEFAULT_ENQUEUE_TIMEOUT_MS, DEFAULT_QUEUE_LEN, DEFAULT_REPLY_TIMEOUT_MS,
    DEFAULT_TASK_PRIORITY, DEFAULT_TASK_STACK_SIZE,
};
pub use reply::Reply;
pub use task::{QueueTask, RequestHandler, TaskState};

use thiserror::Error;

/// Result type returned by queue-task operations.
pub type Result<T> = core::result::Result<T, TaskError>;

/// Errors produced by a queue task.
#[derive(Debug, Error)]
pub enum TaskError {
    /// A request was sent before `init()`.
    #[error("task {0} not initialized")]
    NotInitialized(String),
    /// `init()` was called twice.
    #[error("task {0} already initialized")]
    AlreadyInitialized(String),
    /// The queue stayed full for the whole enqueue timeout.
    #[error("task {0} queue full")]
    QueueFull(String),
    /// The handler did not reply within the reply timeout.
    #[error("task {0} reply timed out")]
    Timeout(String),
    /// The handler dropped the reply slot without replying.
    #[error("task {0} dropped the request without replying")]
    NoReply(String),
    /// The worker is gone.
    #[error("task {0} stopped")]
    Stopped(String),
    /// The configuration cannot be used.
    #[error("invalid task config: {0}")]
    InvalidConfig(&'static str),
    /// The worker thread could not be created.
    #[error("failed to spawn task {name}: {source}")]
    Spawn {
        /// Task name.
        name: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },
}
