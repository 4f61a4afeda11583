//! Channel-addressed command routing.
//!
//! Callers hand the router a channel number as plain data; the router
//! validates it, stamps the command, encodes the wire frame, and hands it
//! to the link of the board that owns the channel. Validation happens
//! before any I/O, so an out-of-range channel never touches a socket.

use std::sync::Arc;

use tracing::{debug, info, warn};

use cycler_link::LinkManager;
use cycler_wire::{ChannelId, CommandKind, CommandMessage, StepDataRequest};

use crate::error::ControlError;

/// Outcome of a rack-wide broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Channels the broadcast addressed
    pub attempted: usize,
    /// Commands that reached a board socket
    pub sent: usize,
    /// Commands refused by their board link
    pub failed: usize,
}

/// Routes validated commands to the boards that own their channels
pub struct CommandRouter {
    link: Arc<LinkManager>,
}

impl CommandRouter {
    /// Create a router over the given board links
    pub fn new(link: Arc<LinkManager>) -> Self {
        Self { link }
    }

    /// Send a lifecycle command to one channel.
    ///
    /// The channel number is validated first; commands carry their issue
    /// time as payload.
    pub async fn send(&self, channel: u16, kind: CommandKind) -> Result<(), ControlError> {
        let channel = ChannelId::new(channel)?;
        self.send_command(&CommandMessage::lifecycle(kind, channel))
            .await
    }

    /// Send an already-built command to the board owning its channel
    pub async fn send_command(&self, message: &CommandMessage) -> Result<(), ControlError> {
        let frame = message.encode()?;
        let board = message.channel.board();
        self.link.send(board, &frame).await?;
        debug!(
            "channel {} {:?} routed to board {}",
            message.channel, message.kind, board
        );
        Ok(())
    }

    /// Send a command to every channel on the rack.
    ///
    /// Each channel is attempted independently; a dead board costs its four
    /// channels and nothing else. The report says how far the broadcast got.
    pub async fn broadcast(&self, kind: CommandKind) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        for channel in ChannelId::all() {
            report.attempted += 1;
            match self
                .send_command(&CommandMessage::lifecycle(kind, channel))
                .await
            {
                Ok(()) => report.sent += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!("channel {} {:?} broadcast skipped: {}", channel, kind, e);
                }
            }
        }
        info!(
            "broadcast {:?} reached {}/{} channels",
            kind, report.sent, report.attempted
        );
        report
    }

    /// Ask a board for one step-data record.
    ///
    /// The mixed-endian request rides as the payload of a status command
    /// addressed to the same channel.
    pub async fn request_step_data(
        &self,
        channel: u16,
        step_index: u32,
    ) -> Result<(), ControlError> {
        let channel = ChannelId::new(channel)?;
        let request = StepDataRequest::new(channel, step_index);
        let message = CommandMessage::with_payload(
            CommandKind::GetStatus,
            channel,
            request.encode().to_vec(),
        );
        self.send_command(&message).await
    }
}
