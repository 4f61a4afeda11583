//! Control plane error types

use thiserror::Error;

use cycler_link::LinkError;
use cycler_wire::WireError;

/// Errors from command routing
#[derive(Debug, Error)]
pub enum ControlError {
    /// The command never made it to encoding
    #[error(transparent)]
    Invalid(#[from] WireError),

    /// The command encoded fine but the board link refused it
    #[error(transparent)]
    Link(#[from] LinkError),
}
