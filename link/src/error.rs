//! Link layer error types.

use cycler_wire::BoardId;
use thiserror::Error;

/// Link layer errors
#[derive(Error, Debug)]
pub enum LinkError {
    /// Board has no live connection
    #[error("board {0} is not connected")]
    NotConnected(BoardId),

    /// Writing on a board's socket failed
    #[error("write to board {board} failed")]
    Write {
        /// The board whose socket failed
        board: BoardId,
        /// The underlying socket error
        #[source]
        source: std::io::Error,
    },

    /// Board's connection task is still live; restart refused
    #[error("board {0} is still active")]
    Active(BoardId),
}
