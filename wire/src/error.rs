//! Frame codec error types.

use thiserror::Error;

/// Frame codec errors
#[derive(Error, Debug)]
pub enum WireError {
    /// Input too short for the structure being decoded
    #[error("short input: need {need} bytes, have {have}")]
    Short {
        /// Bytes the structure requires
        need: usize,
        /// Bytes actually available
        have: usize,
    },

    /// Channel number outside 1..=128
    #[error("channel out of range: {0}")]
    Channel(u16),

    /// Board number outside 1..=32
    #[error("board out of range: {0}")]
    Board(u8),

    /// Command payload exceeds the 14-byte frame slot
    #[error("payload too large: {0} bytes")]
    Payload(usize),

    /// Unknown command code
    #[error("unknown command code {0}")]
    Command(u8),

    /// Unexpected step-data message id
    #[error("unexpected message id {0:#06x}")]
    MessageId(u16),
}
