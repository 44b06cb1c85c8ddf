// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

use crossbeam_channel::Sender;

/// Single-use reply slot carried by one request.
///
/// Consumed by [`send`](Self::send), so a handler can reply at most once. Dropping it
/// unanswered wakes the caller with `NoReply`.
#[must_use = "a synchronous caller waits for this reply"]
pub struct Reply<T> {
    slot: Option<Sender<T>>,
}

impl<T> Reply<T> {
    pub(crate) fn new(slot: Sender<T>) -> Self {
        Self { slot: Some(slot) }
    }

    /// Slot of an asynchronous request; replies go nowhere.
    pub fn detached() -> Self {
        Self { slot: None }
    }

    /// Returns true if a caller is waiting for this reply.
    pub fn is_awaited(&self) -> bool {
        self.slot.is_some()
    }

    /// Delivers `value`. Returns false if nobody is waiting anymore.
    pub fn send(mut self, value: T) -> bool {
        match self.slot.take() {
            Some(slot) => slot.try_send(value).is_ok(),
            None => false,
        }
    }
}

impl<T> core::fmt::Debug for Reply<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Reply").field("awaited", &self.is_awaited()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{bounded, RecvError};

    #[test]
    fn delivers_once() {
        let (tx, rx) = bounded(1);
        let reply = Reply::new(tx);
        assert!(reply.is_awaited());
        assert!(reply.send(5));
        assert_eq!(rx.recv(), Ok(5));
        assert_eq!(rx.recv(), Err(RecvError));
    }

    #[test]
    fn detached_reply_is_discarded() {
        let reply = Reply::<u8>::detached();
        assert!(!reply.is_awaited());
        assert!(!reply.send(1));
    }

    #[test]
    fn late_reply_reports_failure() {
        let (tx, rx) = bounded(1);
        drop(rx);
        assert!(!Reply::new(tx).send(1));
    }
}
