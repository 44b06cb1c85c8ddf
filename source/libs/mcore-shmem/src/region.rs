// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Shared-memory region layout and the message-buffer interrupt handler.

use std::sync::Arc;

use log::trace;
use thiserror::Error;

use crate::buffer::{MessageBuffer, LENGTH_PREFIX_SIZE};
use crate::events::{CoreEvents, EventHandler, EventSink};

/// Base address of the inter-core shared-memory window.
pub const SHMEM_BASE: u32 = 0x202C_0000;

/// Offset of the channel written by the application core.
pub const PRIMARY_TX_OFFSET: u16 = 0x1000;

/// Offset of the channel written by the companion core.
pub const COMPANION_TX_OFFSET: u16 = 0x2000;

/// Default storage per channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Resolves the address of a channel from the interrupt payload.
pub const fn channel_address(base: u32, event_data: u16) -> u32 {
    base | event_data as u32
}

/// Errors raised while laying out a region.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegionError {
    /// Offset bits collide with the base address, so OR-ing would alias.
    #[error("offset {offset:#06x} overlaps base address {base:#010x}")]
    OffsetOverlapsBase {
        /// Region base.
        base: u32,
        /// Rejected offset.
        offset: u16,
    },
    /// Two channels share one offset.
    #[error("duplicate channel offset {0:#06x}")]
    DuplicateOffset(u16),
    /// Channel cannot hold a single byte of payload.
    #[error("channel capacity {0} too small")]
    CapacityTooSmall(usize),
}

/// Incremental builder for a [`SharedRegion`].
pub struct RegionBuilder {
    base: u32,
    channels: Vec<Arc<MessageBuffer>>,
}

impl RegionBuilder {
    /// Adds a channel written by `writer` and read by `reader`.
    pub fn channel(
        mut self,
        offset: u16,
        capacity: usize,
        writer: Arc<dyn EventSink>,
        reader: Arc<dyn EventSink>,
    ) -> Result<Self, RegionError> {
        if self.base & u32::from(offset) != 0 {
            return Err(RegionError::OffsetOverlapsBase { base: self.base, offset });
        }
        if self.channels.iter().any(|c| c.offset() == offset) {
            return Err(RegionError::DuplicateOffset(offset));
        }
        if capacity <= LENGTH_PREFIX_SIZE {
            return Err(RegionError::CapacityTooSmall(capacity));
        }
        self.channels.push(Arc::new(MessageBuffer::new(offset, capacity, writer, reader)));
        Ok(self)
    }

    /// Freezes the layout.
    pub fn build(self) -> SharedRegion {
        SharedRegion { base: self.base, channels: self.channels }
    }
}

/// Fixed set of channels placed in the shared window.
pub struct SharedRegion {
    base: u32,
    channels: Vec<Arc<MessageBuffer>>,
}

impl SharedRegion {
    /// Starts laying out a region at `base`.
    pub fn builder(base: u32) -> RegionBuilder {
        RegionBuilder { base, channels: Vec::new() }
    }

    /// Base address of the region.
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Returns the channel placed at `offset`.
    pub fn channel(&self, offset: u16) -> Option<Arc<MessageBuffer>> {
        self.channels.iter().find(|c| c.offset() == offset).cloned()
    }

    /// Resolves an absolute channel address.
    pub fn resolve(&self, address: u32) -> Option<&MessageBuffer> {
        self.channels
            .iter()
            .find(|c| channel_address(self.base, c.offset()) == address)
            .map(|c| c.as_ref())
    }

    /// Interrupt body: wakes waiters of the channel named by `event_data`.
    ///
    /// Returns false when the payload does not name a channel of this region.
    pub fn on_message_event(&self, event_data: u16) -> bool {
        match self.resolve(channel_address(self.base, event_data)) {
            Some(channel) => {
                channel.complete_from_isr();
                true
            }
            None => {
                trace!("shmem: event for unknown channel {event_data:#06x}");
                false
            }
        }
    }
}

/// Builds the message-buffer interrupt handler bound to `region`.
///
/// The handler holds a weak reference, so registering it does not keep the region alive.
pub fn message_event_handler(region: &Arc<SharedRegion>) -> EventHandler {
    let region = Arc::downgrade(region);
    Arc::new(move |event_data: u16| {
        if let Some(region) = region.upgrade() {
            region.on_message_event(event_data);
        }
    })
}

/// Both cores' event managers wired to one region holding the two directional channels.
pub struct DualCore {
    /// Events raised on the application core.
    pub primary: Arc<CoreEvents>,
    /// Events raised on the companion core.
    pub companion: Arc<CoreEvents>,
    /// Shared window holding one channel per direction.
    pub region: Arc<SharedRegion>,
}

impl DualCore {
    /// Lays out the default two-channel region at `base`.
    pub fn new(base: u32, capacity: usize) -> Result<Self, RegionError> {
        Self::with_layout(base, PRIMARY_TX_OFFSET, COMPANION_TX_OFFSET, capacity)
    }

    /// Lays out a region at `base` with the application core writing `primary_tx` and the
    /// companion writing `companion_tx`.
    pub fn with_layout(
        base: u32,
        primary_tx: u16,
        companion_tx: u16,
        capacity: usize,
    ) -> Result<Self, RegionError> {
        let primary = Arc::new(CoreEvents::new("primary"));
        let companion = Arc::new(CoreEvents::new("companion"));
        let region = SharedRegion::builder(base)
            .channel(primary_tx, capacity, primary.clone(), companion.clone())?
            .channel(companion_tx, capacity, companion.clone(), primary.clone())?
            .build();
        Ok(Self { primary, companion, region: Arc::new(region) })
    }
}
