//! Persistent TCP links to the rack's cycler boards.
//!
//! The gateway holds one long-lived connection per board. This crate owns
//! those connections: dialing with deterministic per-board addresses,
//! reassembling telemetry frames out of arbitrary TCP chunk boundaries,
//! pushing decoded readings into the channel registry, and writing command
//! frames back out. Every board runs under its own task, so a dead or
//! flapping board never stalls its neighbors.
//!
//! ## Features
//!
//! - **Supervised Links**: task-per-board lifecycle with cooperative shutdown
//! - **Bounded Reconnection**: exponential backoff until the retry budget is
//!   spent, then the board faults and waits for an operator restart
//! - **Frame Reassembly**: partial reads buffered until a full frame lands
//! - **Serialized Writes**: one in-flight write per board socket
//! - **Throughput Counters**: shared atomics with a periodic log reporter

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod manager;
pub mod stats;

// Re-export main types
pub use config::LinkConfig;
pub use error::LinkError;
pub use manager::{BoardState, LinkEvent, LinkManager, MAX_RECONNECT_BACKOFF};
pub use stats::{start_reporter, GatewayStats, StatsSnapshot};
