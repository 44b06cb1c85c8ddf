// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use serde::Deserialize;

use crate::{Result, TaskError};

/// Default worker stack.
pub const DEFAULT_TASK_STACK_SIZE: usize = 64 * 1024;
/// Default worker priority.
pub const DEFAULT_TASK_PRIORITY: u8 = 4;
/// Default request queue depth.
pub const DEFAULT_QUEUE_LEN: usize = 4;
/// Default bound on waiting for queue space.
pub const DEFAULT_ENQUEUE_TIMEOUT_MS: u64 = 200;
/// Default bound on waiting for a reply.
pub const DEFAULT_REPLY_TIMEOUT_MS: u64 = 200;

/// Identity and timing of one queue task.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Worker thread name.
    pub name: String,
    /// Worker stack size in bytes.
    pub stack_size: usize,
    /// Priority recorded for the worker.
    pub priority: u8,
    /// Request queue depth.
    pub queue_len: usize,
    /// Bound on waiting for queue space, in milliseconds.
    pub enqueue_timeout_ms: u64,
    /// Bound on waiting for a reply, in milliseconds.
    pub reply_timeout_ms: u64,
}

impl TaskConfig {
    /// Default configuration named `name`.
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    /// Sets the queue depth.
    pub fn with_queue_len(mut self, queue_len: usize) -> Self {
        self.queue_len = queue_len;
        self
    }

    /// Sets the worker stack size.
    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }

    /// Sets the worker priority.
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the enqueue timeout.
    pub fn with_enqueue_timeout(mut self, timeout: Duration) -> Self {
        self.enqueue_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Sets the reply timeout.
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Enqueue timeout as a duration.
    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_ms)
    }

    /// Reply timeout as a duration.
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    /// Rejects configurations no worker can run with.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(TaskError::InvalidConfig("empty task name"));
        }
        if self.name.contains('\0') {
            return Err(TaskError::InvalidConfig("task name contains NUL"));
        }
        if self.queue_len == 0 {
            return Err(TaskError::InvalidConfig("queue length must be non-zero"));
        }
        if self.stack_size == 0 {
            return Err(TaskError::InvalidConfig("stack size must be non-zero"));
        }
        Ok(())
    }
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            name: "task".into(),
            stack_size: DEFAULT_TASK_STACK_SIZE,
            priority: DEFAULT_TASK_PRIORITY,
            queue_len: DEFAULT_QUEUE_LEN,
            enqueue_timeout_ms: DEFAULT_ENQUEUE_TIMEOUT_MS,
            reply_timeout_ms: DEFAULT_REPLY_TIMEOUT_MS,
        }
    }
}
