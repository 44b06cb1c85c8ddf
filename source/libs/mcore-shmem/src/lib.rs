// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Shared-memory transport between the application core and the companion core
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable
//! TEST_COVERAGE: Unit tests per module (host)
//!
//! PUBLIC API:
//!   - MessageBuffer: SPSC length-prefixed byte channel living in shared memory
//!   - SharedRegion: fixed table of channels addressed by base | offset
//!   - CoreEvents: per-core cross-core event manager (interrupt line model)
//!   - message_event_handler(): interrupt handler bound to a region
//!   - DualCore: primary/companion wiring over one region
//!
//! INVARIANTS:
//!   - Channel address = base | 16-bit event payload; the encoding is shared with the
//!     companion firmware and the platform memory map
//!   - The interrupt path never allocates; it only signals waiters of an existing channel
//!   - There is no transport error code; blocking is unbounded

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs)]

mod buffer;
mod events;
mod region;

pub use buffer::{MessageBuffer, LENGTH_PREFIX_SIZE};
pub use events::{CoreEvents, EventHandler, EventKind, EventSink};
pub use region::{
    channel_address, message_event_handler, DualCore, RegionBuilder, RegionError, SharedRegion,
    COMPANION_TX_OFFSET, DEFAULT_CHANNEL_CAPACITY, PRIMARY_TX_OFFSET, SHMEM_BASE,
};
