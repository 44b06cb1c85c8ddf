// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Message buffer living in the shared-memory region.
//!
//! Frames are stored as a little-endian `u32` length prefix followed by the payload, in a
//! byte ring of fixed capacity. Exactly one core writes and exactly one core reads. A
//! blocked side is only woken by the cross-core interrupt handler, which calls
//! [`MessageBuffer::complete_from_isr`] after resolving the channel address.

use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::events::{EventKind, EventSink};

/// Bytes of bookkeeping stored in front of every frame.
pub const LENGTH_PREFIX_SIZE: usize = 4;

struct Ring {
    bytes: Box<[u8]>,
    head: usize,
    len: usize,
}

impl Ring {
    fn new(capacity: usize) -> Self {
        Self { bytes: vec![0u8; capacity].into_boxed_slice(), head: 0, len: 0 }
    }

    fn capacity(&self) -> usize {
        self.bytes.len()
    }

    fn free(&self) -> usize {
        self.capacity() - self.len
    }

    fn push(&mut self, data: &[u8]) {
        let cap = self.capacity();
        let mut tail = (self.head + self.len) % cap;
        for &b in data {
            self.bytes[tail] = b;
            tail = (tail + 1) % cap;
        }
        self.len += data.len();
    }

    fn peek(&self, out: &mut [u8]) {
        let cap = self.capacity();
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.bytes[(self.head + i) % cap];
        }
    }

    fn consume(&mut self, n: usize) {
        self.head = (self.head + n) % self.capacity();
        self.len -= n;
    }

    fn next_frame_len(&self) -> Option<usize> {
        if self.len < LENGTH_PREFIX_SIZE {
            return None;
        }
        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        self.peek(&mut prefix);
        Some(u32::from_le_bytes(prefix) as usize)
    }
}

/// Wake-up token for one blocked side. At most one ring is pending.
struct Doorbell {
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl Doorbell {
    fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self { tx, rx }
    }

    fn ring(&self) {
        let _ = self.tx.try_send(());
    }

    /// Drops a pending ring so the next `wait` only returns on a fresh one.
    fn clear(&self) {
        let _ = self.rx.try_recv();
    }

    fn wait(&self) {
        // Both ends live in `self`, so this only returns on a ring.
        let _ = self.rx.recv();
    }
}

/// Single-producer/single-consumer frame channel shared by two cores.
pub struct MessageBuffer {
    offset: u16,
    ring: Mutex<Ring>,
    readable: Doorbell,
    writable: Doorbell,
    writer_core: Arc<dyn EventSink>,
    reader_core: Arc<dyn EventSink>,
}

impl MessageBuffer {
    /// Creates a channel at `offset` with `capacity` bytes of storage.
    ///
    /// `writer_core` is notified after every receive (space freed), `reader_core` after
    /// every send (data available).
    pub fn new(
        offset: u16,
        capacity: usize,
        writer_core: Arc<dyn EventSink>,
        reader_core: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            offset,
            ring: Mutex::new(Ring::new(capacity)),
            readable: Doorbell::new(),
            writable: Doorbell::new(),
            writer_core,
            reader_core,
        }
    }

    /// Offset of this channel inside the shared region.
    pub fn offset(&self) -> u16 {
        self.offset
    }

    /// Total storage in bytes, prefixes included.
    pub fn capacity(&self) -> usize {
        self.ring.lock().capacity()
    }

    /// Bytes currently queued, prefixes included.
    pub fn bytes_available(&self) -> usize {
        self.ring.lock().len
    }

    /// Free storage in bytes.
    pub fn spaces_available(&self) -> usize {
        self.ring.lock().free()
    }

    /// Returns true when no frame is queued.
    pub fn is_empty(&self) -> bool {
        self.ring.lock().len == 0
    }

    /// Writes one frame, blocking until enough space is free.
    ///
    /// Returns the number of payload bytes written. A frame that can never fit (or an
    /// empty frame) is not written and `0` is returned.
    pub fn send(&self, frame: &[u8]) -> usize {
        let needed = frame.len() + LENGTH_PREFIX_SIZE;
        let Ok(len) = u32::try_from(frame.len()) else {
            return 0;
        };
        if frame.is_empty() || needed > self.capacity() {
            return 0;
        }
        loop {
            self.writable.clear();
            let mut ring = self.ring.lock();
            if ring.free() >= needed {
                ring.push(&len.to_le_bytes());
                ring.push(frame);
                break;
            }
            drop(ring);
            self.writable.wait();
        }

        self.reader_core.raise(EventKind::MessageBuffers, self.offset);
        frame.len()
    }

    /// Reads one frame into `out`, blocking until a frame is queued.
    ///
    /// Returns `0` when woken without a frame to deliver; the caller retries. A frame
    /// larger than `out` stays queued and `0` is returned.
    pub fn receive(&self, out: &mut [u8]) -> usize {
        self.readable.clear();
        let mut ring = self.ring.lock();
        if ring.len == 0 {
            drop(ring);
            self.readable.wait();
            ring = self.ring.lock();
        }
        let Some(frame_len) = ring.next_frame_len() else {
            return 0;
        };
        if frame_len > out.len() {
            return 0;
        }
        ring.consume(LENGTH_PREFIX_SIZE);
        ring.peek(&mut out[..frame_len]);
        ring.consume(frame_len);
        drop(ring);

        self.writer_core.raise(EventKind::MessageBuffers, self.offset);
        frame_len
    }

    /// Wakes any task blocked on this channel. Safe to call from the interrupt handler.
    pub fn complete_from_isr(&self) {
        self.readable.ring();
        self.writable.ring();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    /// Wakes the channel directly, standing in for the interrupt path.
    struct Loopback(parking_lot::Mutex<Option<std::sync::Weak<MessageBuffer>>>);

    impl EventSink for Loopback {
        fn raise(&self, _kind: EventKind, _data: u16) {
            if let Some(buf) = self.0.lock().as_ref().and_then(|w| w.upgrade()) {
                buf.complete_from_isr();
            }
        }
    }

    fn looped(capacity: usize) -> Arc<MessageBuffer> {
        let sink = Arc::new(Loopback(parking_lot::Mutex::new(None)));
        let buf = Arc::new(MessageBuffer::new(0x10, capacity, sink.clone(), sink.clone()));
        *sink.0.lock() = Some(Arc::downgrade(&buf));
        buf
    }

    #[test]
    fn frames_keep_boundaries_and_order() {
        let buf = looped(64);
        assert_eq!(buf.send(b"one"), 3);
        assert_eq!(buf.send(b"three"), 5);

        let mut out = [0u8; 16];
        let n = buf.receive(&mut out);
        assert_eq!(&out[..n], b"one");
        let n = buf.receive(&mut out);
        assert_eq!(&out[..n], b"three");
        assert!(buf.is_empty());
    }

    #[test]
    fn oversized_and_empty_frames_are_rejected() {
        let buf = looped(8);
        assert_eq!(buf.send(&[0u8; 5]), 0);
        assert_eq!(buf.send(&[]), 0);
        assert_eq!(buf.bytes_available(), 0);
    }

    #[test]
    fn short_output_leaves_frame_queued() {
        let buf = looped(32);
        buf.send(b"abcdef");
        let mut small = [0u8; 2];
        assert_eq!(buf.receive(&mut small), 0);
        assert_eq!(buf.bytes_available(), 6 + LENGTH_PREFIX_SIZE);

        let mut out = [0u8; 8];
        assert_eq!(buf.receive(&mut out), 6);
    }

    #[test]
    fn wraps_around_the_ring() {
        let buf = looped(12);
        let mut out = [0u8; 8];
        for round in 0u8..10 {
            let frame = [round; 5];
            assert_eq!(buf.send(&frame), 5);
            assert_eq!(buf.receive(&mut out), 5);
            assert_eq!(&out[..5], &frame);
        }
    }

    #[test]
    fn blocked_sender_resumes_after_receive() {
        let buf = looped(2 * (4 + LENGTH_PREFIX_SIZE));
        buf.send(b"aaaa");
        buf.send(b"bbbb");
        assert_eq!(buf.spaces_available(), 0);

        let writer = {
            let buf = buf.clone();
            thread::spawn(move || buf.send(b"cccc"))
        };
        thread::sleep(Duration::from_millis(20));
        let mut out = [0u8; 8];
        assert_eq!(buf.receive(&mut out), 4);
        assert_eq!(writer.join().unwrap(), 4);

        assert_eq!(buf.receive(&mut out), 4);
        assert_eq!(&out[..4], b"bbbb");
        assert_eq!(buf.receive(&mut out), 4);
        assert_eq!(&out[..4], b"cccc");
    }

    #[test]
    fn wake_without_data_reports_zero() {
        let buf = looped(32);
        let reader = {
            let buf = buf.clone();
            thread::spawn(move || {
                let mut out = [0u8; 8];
                buf.receive(&mut out)
            })
        };
        while !reader.is_finished() {
            buf.complete_from_isr();
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(reader.join().unwrap(), 0);
    }
}
