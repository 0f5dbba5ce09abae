//! Command failures.

use crate::interfaces::{DisconnectReason, StorageError};
use crate::protocol::{Cents, ResponseClass, ResponseCode, SessionId};

use super::registry::RegistryError;
use super::CommandKind;

/// Typed failure of a command.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The server rejected the command; the connection stays usable.
    #[error("{kind} rejected: {code}")]
    Rejected {
        kind: CommandKind,
        code: ResponseCode,
    },

    /// The connection must be torn down and registration repeated.
    #[error("{kind} forced disconnect: {reason}")]
    Disconnected {
        kind: CommandKind,
        reason: DisconnectReason,
    },

    #[error("{kind} cancelled")]
    Cancelled { kind: CommandKind },

    #[error("No registered instance")]
    NotRegistered,

    #[error("No active session")]
    NoActiveSession,

    /// A session that still holds value has not been ended.
    #[error("Session {session_id} is still open")]
    SessionOpen { session_id: SessionId },

    #[error("No handler for {0}")]
    Unhandled(CommandKind),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Outcome error: {0}")]
    Outcome(#[from] OutcomeError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

impl CommandError {
    /// Classifier outcome behind this failure, if it came from the server.
    pub fn response_class(&self) -> Option<ResponseClass> {
        match self {
            CommandError::Rejected { .. } => Some(ResponseClass::BusinessFailure),
            CommandError::Disconnected { .. } => Some(ResponseClass::ForceDisconnect),
            _ => None,
        }
    }

    pub fn response_code(&self) -> Option<ResponseCode> {
        match self {
            CommandError::Rejected { code, .. } => Some(*code),
            CommandError::Disconnected {
                reason: DisconnectReason::Response(code),
                ..
            } => Some(*code),
            _ => None,
        }
    }

    pub fn is_force_disconnect(&self) -> bool {
        self.response_class() == Some(ResponseClass::ForceDisconnect)
    }
}

/// A play response could not be turned into outcomes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OutcomeError {
    #[error("Prize value {0} overflows millicents")]
    PrizeOverflow(Cents),

    #[error("Wager of {credits} credits at {denomination} overflows")]
    WagerOverflow { credits: i64, denomination: Cents },
}

/// The dispatch table is incomplete.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("No handler registered for {0}")]
    MissingHandler(CommandKind),
}
