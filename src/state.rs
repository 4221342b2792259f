//! Shared application state and the per-user state machine.
//!
//! DESIGN
//! ======
//! `AppState` is injected into axum handlers via the `State` extractor. It
//! holds the session coordinator behind a single mutex (every action runs
//! start-to-finish under it), the token verifier, and the optional
//! settlement client.
//!
//! `UserState::allows` is the dispatch gate's single source of truth: the
//! managers never re-check whether the caller was allowed to invoke them.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};

use crate::frame::Frame;
use crate::services::auth::TokenVerifier;
use crate::services::session::SessionCoordinator;
use crate::services::settlement::SettlementClient;

// =============================================================================
// USER STATE MACHINE
// =============================================================================

/// Where a connection sits in the trade lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserState {
    /// Connection exists but has not authenticated.
    NoUserId,
    /// Authenticated, idle.
    InLobby,
    /// Exactly one outbound invite outstanding.
    SentInvite,
    /// In an active trade pair, not locked.
    InTrade,
    /// In an active trade pair, locked.
    LockedIn,
}

/// Action discriminant used by the dispatch gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Authenticate,
    LogOut,
    SendInvite,
    CancelInvite,
    AcceptInvite,
    RejectInvite,
    UpdateInventory,
    LockIn,
    Unlock,
    CancelTrade,
    CompleteTrade,
}

impl UserState {
    /// Wire-facing state name used in `InvalidActionError` messages.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::NoUserId => "noUserId",
            Self::InLobby => "inLobby",
            Self::SentInvite => "sentInvite",
            Self::InTrade => "inTrade",
            Self::LockedIn => "lockedIn",
        }
    }

    /// The action allow-table. Accepting an invite while an outbound invite
    /// is outstanding is rejected: the caller must cancel their own invite
    /// first.
    #[must_use]
    pub fn allows(self, action: ActionKind) -> bool {
        use ActionKind as A;
        match self {
            Self::NoUserId => matches!(action, A::Authenticate),
            Self::InLobby => {
                matches!(action, A::LogOut | A::SendInvite | A::AcceptInvite | A::RejectInvite)
            }
            Self::SentInvite => matches!(action, A::CancelInvite | A::RejectInvite),
            Self::InTrade => matches!(action, A::UpdateInventory | A::LockIn | A::CancelTrade),
            Self::LockedIn => matches!(action, A::Unlock | A::CompleteTrade),
        }
    }
}

impl ActionKind {
    /// Wire-facing action name used in `InvalidActionError` messages.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Authenticate => "authenticate",
            Self::LogOut => "logOut",
            Self::SendInvite => "sendInvite",
            Self::CancelInvite => "cancelInvite",
            Self::AcceptInvite => "acceptInvite",
            Self::RejectInvite => "rejectInvite",
            Self::UpdateInventory => "updateInventory",
            Self::LockIn => "lockIn",
            Self::Unlock => "unlock",
            Self::CancelTrade => "cancelTrade",
            Self::CompleteTrade => "completeTrade",
        }
    }
}

// =============================================================================
// CONNECTION REGISTRY ENTRY
// =============================================================================

/// Registry entry for one authenticated connection: the authoritative user
/// state and the sender for outgoing notification frames.
#[derive(Debug)]
pub struct ConnectionEntry {
    pub state: UserState,
    pub tx: mpsc::Sender<Frame>,
}

// =============================================================================
// APP STATE
// =============================================================================

/// Shared application state, injected into axum handlers via the State
/// extractor. Clone is required by axum — all inner fields are Arc-wrapped.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Mutex<SessionCoordinator>>,
    pub verifier: Arc<TokenVerifier>,
    /// `None` when settlement env vars are not configured (development).
    pub settlement: Option<Arc<SettlementClient>>,
}

impl AppState {
    #[must_use]
    pub fn new(verifier: TokenVerifier, settlement: Option<Arc<SettlementClient>>) -> Self {
        Self {
            coordinator: Arc::new(Mutex::new(SessionCoordinator::new())),
            verifier: Arc::new(verifier),
            settlement,
        }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
pub mod test_helpers {
    use super::*;

    /// App state with verification disabled (token is taken as the user id)
    /// and no settlement client.
    #[must_use]
    pub fn test_app_state() -> AppState {
        AppState::new(TokenVerifier::disabled(), None)
    }
}
