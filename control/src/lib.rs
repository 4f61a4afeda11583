//! Command routing for the cycler gateway.
//!
//! The control plane sits between operator surfaces and board links:
//! callers name channels by number, and this crate validates the number,
//! builds the wire frame, and routes it through [`cycler_link`] to the
//! board that owns the channel. Rack-wide broadcasts degrade per board
//! instead of failing whole.
//!
//! ## Features
//!
//! - **Validation First**: channel numbers checked before any socket I/O
//! - **Lifecycle Commands**: start/stop/pause/resume/reset with issue-time
//!   payloads
//! - **Step-Data Requests**: mixed-endian request framed for board firmware
//! - **Broadcast**: best-effort rack-wide fan-out with a delivery report

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod router;

// Re-export main types
pub use error::ControlError;
pub use router::{BroadcastReport, CommandRouter};
