//! Board and channel identifiers.
//!
//! The rack is a fixed fleet: 32 boards, 4 channels per board, 128 channels
//! total. Channels are numbered 1..=128 rack-wide, boards 1..=32, and the
//! mapping between them never changes:
//!
//! ```text
//! board   = (channel - 1) / 4 + 1
//! offset  = (channel - 1) % 4        (block position within a frame)
//! channel = (board - 1) * 4 + offset + 1
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::WireError;

/// Number of boards in a rack
pub const BOARD_COUNT: u8 = 32;

/// Channels served by one board
pub const CHANNELS_PER_BOARD: u8 = 4;

/// Total channels in a rack
pub const CHANNEL_COUNT: u8 = 128;

/// Identifier of one cycler board, valid range 1..=32
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BoardId(u8);

impl BoardId {
    /// Validate a raw board number
    pub fn new(board: u8) -> Result<Self, WireError> {
        if board == 0 || board > BOARD_COUNT {
            return Err(WireError::Board(board));
        }
        Ok(Self(board))
    }

    /// Raw board number
    pub fn get(self) -> u8 {
        self.0
    }

    /// The rack-wide channel carried at block `offset` (0..=3) of this
    /// board's telemetry frames
    pub fn channel_at(self, offset: u8) -> ChannelId {
        debug_assert!(offset < CHANNELS_PER_BOARD);
        ChannelId((self.0 - 1) * CHANNELS_PER_BOARD + offset + 1)
    }

    /// The four channels this board serves, in block order
    pub fn channels(self) -> impl Iterator<Item = ChannelId> {
        (0..CHANNELS_PER_BOARD).map(move |offset| self.channel_at(offset))
    }

    /// All boards of the rack in order
    pub fn all() -> impl Iterator<Item = BoardId> {
        (1..=BOARD_COUNT).map(BoardId)
    }
}

impl fmt::Display for BoardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one test channel, valid range 1..=128
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(u8);

impl ChannelId {
    /// Validate a raw channel number. Out-of-range input is rejected, never
    /// clamped or truncated.
    pub fn new(channel: u16) -> Result<Self, WireError> {
        if channel == 0 || channel > CHANNEL_COUNT as u16 {
            return Err(WireError::Channel(channel));
        }
        Ok(Self(channel as u8))
    }

    /// Raw channel number
    pub fn get(self) -> u8 {
        self.0
    }

    /// The board that serves this channel
    pub fn board(self) -> BoardId {
        BoardId((self.0 - 1) / CHANNELS_PER_BOARD + 1)
    }

    /// Block position of this channel within its board's telemetry frames
    pub fn offset(self) -> u8 {
        (self.0 - 1) % CHANNELS_PER_BOARD
    }

    /// All channels of the rack in order
    pub fn all() -> impl Iterator<Item = ChannelId> {
        (1..=CHANNEL_COUNT).map(ChannelId)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
