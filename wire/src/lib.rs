//! Binary frame codecs for the cycler rack protocol.
//!
//! This crate is the byte-exact protocol layer of the gateway: telemetry
//! frame assembly and decoding, command framing, the step-data exchange,
//! and the board/channel identifier arithmetic that ties frames to rack
//! positions. All codecs are pure and perform no I/O.
//!
//! ## Features
//!
//! - **Telemetry Decode**: 800-byte frames, four 200-byte channel blocks
//! - **Stream Reassembly**: frames cut byte-exact out of arbitrary TCP chunks
//! - **Command Framing**: fixed 16-byte channel-addressed command frames
//! - **Step-Data Codecs**: the mixed-endian request/ack pair, preserved
//!   exactly as board firmware speaks it
//! - **Identifier Arithmetic**: the fixed 32-board, 128-channel bijection
//!
//! ## Telemetry Wire Format
//!
//! ```text
//! +----------------------+----------------------------+
//! | block 0 (200B)       | channel (board-1)*4 + 1    |
//! +----------------------+----------------------------+
//! | block 1 (200B)       | channel (board-1)*4 + 2    |
//! +----------------------+----------------------------+
//! | block 2 (200B)       | channel (board-1)*4 + 3    |
//! +----------------------+----------------------------+
//! | block 3 (200B)       | channel (board-1)*4 + 4    |
//! +----------------------+----------------------------+
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod command;
pub mod error;
pub mod ident;
pub mod step_data;
pub mod telemetry;

// Re-export main types
pub use command::{CommandKind, CommandMessage, COMMAND_FRAME_SIZE, MAX_COMMAND_PAYLOAD};
pub use error::WireError;
pub use ident::{BoardId, ChannelId, BOARD_COUNT, CHANNELS_PER_BOARD, CHANNEL_COUNT};
pub use step_data::{
    StepDataAck, StepDataRequest, STEP_DATA_ACK_SIZE, STEP_DATA_MESSAGE_ID,
    STEP_DATA_REQUEST_SIZE,
};
pub use telemetry::{
    decode_block, decode_frame, ChannelReading, FrameAssembler, CHANNEL_BLOCK_SIZE,
    TELEMETRY_FRAME_SIZE,
};
