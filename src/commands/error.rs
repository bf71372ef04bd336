//! Command Errors
//!
//! Handlers never panic on bad input. They build a [`CommandError`] and turn
//! it into an error response, which goes back to the one client that sent
//! the command.

use crate::persistence::SnapshotError;
use crate::protocol::{ErrorKind, RespValue};
use thiserror::Error;

/// Errors a command can report to its client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    /// Missing, extra, or malformed arguments
    #[error("{0}")]
    IllegalArgument(String),

    /// No registered verb matched
    #[error("{0}")]
    InvalidCommand(String),

    /// A snapshot file with the wrong header
    #[error("{0}")]
    Format(String),

    /// Anything else (I/O failures, mostly)
    #[error("{0}")]
    Unexpected(String),
}

/// Result type for command execution.
pub type CommandResult = Result<RespValue, CommandError>;

impl CommandError {
    /// Shorthand for the most common failure.
    pub fn illegal(message: impl Into<String>) -> Self {
        CommandError::IllegalArgument(message.into())
    }

    /// Returns the wire kind for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CommandError::IllegalArgument(_) => ErrorKind::IllegalArgument,
            CommandError::InvalidCommand(_) => ErrorKind::InvalidCommand,
            CommandError::Format(_) => ErrorKind::Format,
            CommandError::Unexpected(_) => ErrorKind::Unexpected,
        }
    }

    /// Converts this error into the value written back to the client.
    pub fn into_resp(self) -> RespValue {
        let kind = self.kind();
        RespValue::error(kind, self.to_string())
    }
}

impl From<CommandError> for RespValue {
    fn from(err: CommandError) -> Self {
        err.into_resp()
    }
}

impl From<SnapshotError> for CommandError {
    fn from(err: SnapshotError) -> Self {
        match err {
            SnapshotError::BadHeader { .. } => CommandError::Format(err.to_string()),
            other => CommandError::Unexpected(other.to_string()),
        }
    }
}
