//! Control command framing.
//!
//! Commands travel board-ward as fixed 16-byte frames:
//!
//! ```text
//! byte 0       command code
//! byte 1       target channel number
//! bytes 2..16  payload, zero padded
//! ```
//!
//! The channel number rides in a single byte. 128 channels is a fixed
//! ceiling of the rack, not a general encoding; [`ChannelId`] enforces it.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{ChannelId, WireError};

/// Command frame size in bytes
pub const COMMAND_FRAME_SIZE: usize = 16;

/// Maximum command payload size in bytes
pub const MAX_COMMAND_PAYLOAD: usize = 14;

/// Command codes understood by board firmware
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandKind {
    /// Begin the programmed test on a channel
    Start = 0,
    /// Stop the running test
    Stop = 1,
    /// Pause the running test
    Pause = 2,
    /// Resume a paused test
    Resume = 3,
    /// Reset channel state
    Reset = 4,
    /// Request a status report
    GetStatus = 5,
}

impl TryFrom<u8> for CommandKind {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CommandKind::Start),
            1 => Ok(CommandKind::Stop),
            2 => Ok(CommandKind::Pause),
            3 => Ok(CommandKind::Resume),
            4 => Ok(CommandKind::Reset),
            5 => Ok(CommandKind::GetStatus),
            _ => Err(WireError::Command(value)),
        }
    }
}

/// One channel-addressed command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandMessage {
    /// What the target channel should do
    pub kind: CommandKind,
    /// Target channel
    pub channel: ChannelId,
    /// Opaque payload, at most [`MAX_COMMAND_PAYLOAD`] bytes
    pub payload: Vec<u8>,
}

impl CommandMessage {
    /// Command with an empty payload
    pub fn new(kind: CommandKind, channel: ChannelId) -> Self {
        Self {
            kind,
            channel,
            payload: Vec::new(),
        }
    }

    /// Command with an explicit payload
    pub fn with_payload(kind: CommandKind, channel: ChannelId, payload: Vec<u8>) -> Self {
        Self {
            kind,
            channel,
            payload,
        }
    }

    /// Lifecycle command stamped with the issue time (unix milliseconds,
    /// little-endian) as its payload, the form board firmware records for
    /// start/stop bookkeeping
    pub fn lifecycle(kind: CommandKind, channel: ChannelId) -> Self {
        let issued_ms = Utc::now().timestamp_millis();
        Self {
            kind,
            channel,
            payload: issued_ms.to_le_bytes().to_vec(),
        }
    }

    /// Encode to the 16-byte wire frame.
    ///
    /// A payload longer than the 14-byte slot is an error, never a silent
    /// truncation.
    pub fn encode(&self) -> Result<[u8; COMMAND_FRAME_SIZE], WireError> {
        if self.payload.len() > MAX_COMMAND_PAYLOAD {
            return Err(WireError::Payload(self.payload.len()));
        }

        let mut frame = [0u8; COMMAND_FRAME_SIZE];
        frame[0] = self.kind as u8;
        frame[1] = self.channel.get();
        frame[2..2 + self.payload.len()].copy_from_slice(&self.payload);
        Ok(frame)
    }
}
