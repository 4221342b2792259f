//! Classified errors surfaced to clients in action acks.
//!
//! DESIGN
//! ======
//! Two families share one enum: user errors carry their full message onto
//! the wire as `{errorName, errorMessage}`, while `Internal` (a server bug
//! or violated precondition) is logged with detail by the dispatch layer and
//! acked with a generic message. The connection stays open either way.

/// A classified failure of a client action.
#[derive(Debug, thiserror::Error)]
pub enum UserError {
    /// The dispatch gate rejected the action in the caller's current state.
    #[error("action {action} is not allowed in state {state}")]
    InvalidAction { action: &'static str, state: &'static str },

    /// The request named an unknown event or carried malformed arguments.
    #[error("unsupported action: {0}")]
    UnsupportedAction(String),

    /// Token verification failed.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// A user tried to invite themselves.
    #[error("cannot send an invite to yourself")]
    SelfInvite,

    /// The referenced invite does not exist.
    #[error("no matching invite")]
    InvalidInvite,

    /// A lock-in claim did not match the current inventories.
    #[error("inventory claim does not match the current trade inventories")]
    InventoryMismatch,

    /// Completion was attempted while a side of the trade is unlocked.
    #[error("cannot complete the trade while either side is unlocked")]
    CantCompleteEitherUnlocked,

    /// The user id already has a live connection.
    #[error("user {0} is already connected; log out first")]
    UserAlreadyAuthenticated(String),

    /// Server bug or violated precondition. Details are logged, not sent.
    #[error("internal error: {0}")]
    Internal(String),
}

impl UserError {
    /// Wire name for the `errorName` field of an error ack.
    #[must_use]
    pub fn error_name(&self) -> &'static str {
        match self {
            Self::InvalidAction { .. } | Self::UnsupportedAction(_) => "InvalidActionError",
            Self::Auth(_) => "AuthError",
            Self::SelfInvite => "SelfInviteError",
            Self::InvalidInvite => "InvalidInviteError",
            Self::InventoryMismatch => "InventoryMismatchError",
            Self::CantCompleteEitherUnlocked => "CantCompleteEitherUnlockedError",
            Self::UserAlreadyAuthenticated(_) => "UserAlreadyAuthenticatedError",
            Self::Internal(_) => "InternalError",
        }
    }

    /// Wire message for the `errorMessage` field. Internal detail stays in
    /// the server log.
    #[must_use]
    pub fn wire_message(&self) -> String {
        match self {
            Self::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }

    /// Whether this is a server-side failure rather than a user error.
    #[must_use]
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_))
    }
}
