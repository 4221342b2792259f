//! Session coordination — connection registry, dispatch gate, and the
//! translation of manager events into state transitions and peer
//! notifications.
//!
//! ARCHITECTURE
//! ============
//! All inbound actions pass through here. `handle` reads the caller's
//! current state, consults the allow-table, delegates to the invite or
//! trade manager, and applies the returned events: it is the only writer of
//! `UserState` and the only place peer notifications are emitted. The whole
//! of `handle` runs under the coordinator mutex held by the socket layer,
//! so every action observes a consistent view of all three shared maps.
//!
//! LIFECYCLE
//! =========
//! 1. Connection authenticates → registry entry created, deferred invites
//!    replayed.
//! 2. Actions dispatch through the gate; managers return events; events
//!    become transitions + notifications.
//! 3. logOut or socket close → invites cancelled/rejected, any active trade
//!    cancelled, registry entry removed.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::UserError;
use crate::frame::{Data, Frame};
use crate::services::auth::TokenVerifier;
use crate::services::invite::{InviteEvent, InviteManager, UserId};
use crate::services::trade::{Inventory, TradeEvent, TradeManager, TradePair};
use crate::state::{ActionKind, ConnectionEntry, UserState};

// =============================================================================
// ACTIONS
// =============================================================================

/// A parsed client action with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Authenticate { token: String },
    LogOut,
    SendInvite { to: UserId },
    CancelInvite,
    AcceptInvite { from: UserId },
    RejectInvite { from: UserId },
    UpdateInventory { inventory: Inventory },
    LockIn { self_inventory: Inventory, other_inventory: Inventory },
    Unlock,
    CancelTrade,
    CompleteTrade,
}

impl Action {
    /// Discriminant for the dispatch gate.
    #[must_use]
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Authenticate { .. } => ActionKind::Authenticate,
            Self::LogOut => ActionKind::LogOut,
            Self::SendInvite { .. } => ActionKind::SendInvite,
            Self::CancelInvite => ActionKind::CancelInvite,
            Self::AcceptInvite { .. } => ActionKind::AcceptInvite,
            Self::RejectInvite { .. } => ActionKind::RejectInvite,
            Self::UpdateInventory { .. } => ActionKind::UpdateInventory,
            Self::LockIn { .. } => ActionKind::LockIn,
            Self::Unlock => ActionKind::Unlock,
            Self::CancelTrade => ActionKind::CancelTrade,
            Self::CompleteTrade => ActionKind::CompleteTrade,
        }
    }

    /// Parse a request frame into a typed action.
    ///
    /// # Errors
    ///
    /// Unknown events and missing or mistyped arguments are classified as
    /// `InvalidActionError` — the closed error set has no closer name.
    pub fn from_frame(frame: &Frame) -> Result<Self, UserError> {
        let action = match frame.event.as_str() {
            "authenticate" => Self::Authenticate { token: require_str(frame, "token")? },
            "logOut" => Self::LogOut,
            "sendInvite" => Self::SendInvite { to: require_str(frame, "to")? },
            "cancelInvite" => Self::CancelInvite,
            "acceptInvite" => Self::AcceptInvite { from: require_str(frame, "from")? },
            "rejectInvite" => Self::RejectInvite { from: require_str(frame, "from")? },
            "updateInventory" => {
                Self::UpdateInventory { inventory: require_inventory(frame, "inventory")? }
            }
            "lockIn" => Self::LockIn {
                self_inventory: require_inventory(frame, "selfInventory")?,
                other_inventory: require_inventory(frame, "otherInventory")?,
            },
            "unlock" => Self::Unlock,
            "cancelTrade" => Self::CancelTrade,
            "completeTrade" => Self::CompleteTrade,
            other => return Err(UserError::UnsupportedAction(format!("unknown event: {other}"))),
        };
        Ok(action)
    }
}

fn require_str(frame: &Frame, key: &str) -> Result<String, UserError> {
    frame
        .data
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            UserError::UnsupportedAction(format!("{}: string field {key} required", frame.event))
        })
}

fn require_inventory(frame: &Frame, key: &str) -> Result<Inventory, UserError> {
    let Some(value) = frame.data.get(key) else {
        return Err(UserError::UnsupportedAction(format!(
            "{}: field {key} required",
            frame.event
        )));
    };
    serde_json::from_value(value.clone()).map_err(|_| {
        UserError::UnsupportedAction(format!("{}: {key} must be a list of item ids", frame.event))
    })
}

// =============================================================================
// SESSION
// =============================================================================

/// Per-connection handle owned by the socket loop: the authenticated user
/// (if any) and the sender the coordinator registers for notifications.
#[derive(Debug)]
pub struct Session {
    pub user_id: Option<UserId>,
    pub tx: mpsc::Sender<Frame>,
}

impl Session {
    #[must_use]
    pub fn new(tx: mpsc::Sender<Frame>) -> Self {
        Self { user_id: None, tx }
    }
}

// =============================================================================
// COORDINATOR
// =============================================================================

/// Owner of the connection registry; surrounds the two managers.
#[derive(Default)]
pub struct SessionCoordinator {
    connections: HashMap<UserId, ConnectionEntry>,
    invites: InviteManager,
    trades: TradeManager,
}

impl SessionCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatch one action for one connection. Returns the completed trade
    /// pair when this action finished a two-phase completion, so the caller
    /// can dispatch settlement outside the coordinator lock.
    ///
    /// # Errors
    ///
    /// Classified `UserError`s become error acks; the connection stays open.
    pub fn handle(
        &mut self,
        verifier: &TokenVerifier,
        session: &mut Session,
        action: Action,
    ) -> Result<Option<TradePair>, UserError> {
        let state = self.state_of(session)?;
        let kind = action.kind();
        if !state.allows(kind) {
            return Err(UserError::InvalidAction { action: kind.name(), state: state.name() });
        }

        match action {
            Action::Authenticate { token } => {
                self.authenticate(verifier, session, &token)?;
                Ok(None)
            }
            Action::LogOut => {
                self.log_out(session);
                Ok(None)
            }
            Action::SendInvite { to } => {
                let user = required_user(session)?;
                let events = self.invites.send_invite(&user, &to)?;
                self.apply_invite_events(events);
                Ok(None)
            }
            Action::CancelInvite => {
                let user = required_user(session)?;
                let events = self.invites.cancel_invite(&user)?;
                self.apply_invite_events(events);
                Ok(None)
            }
            Action::AcceptInvite { from } => {
                let user = required_user(session)?;
                let events = self.invites.accept_invite(&from, &user)?;
                self.apply_invite_events(events);
                Ok(None)
            }
            Action::RejectInvite { from } => {
                let user = required_user(session)?;
                let events = self.invites.reject_invite(&from, &user)?;
                self.apply_invite_events(events);
                Ok(None)
            }
            Action::UpdateInventory { inventory } => {
                let user = required_user(session)?;
                let events = self.trades.update_inventory(&user, inventory)?;
                self.apply_trade_events(events);
                Ok(None)
            }
            Action::LockIn { self_inventory, other_inventory } => {
                let user = required_user(session)?;
                let events = self.trades.lock_in(&user, &self_inventory, &other_inventory)?;
                self.apply_trade_events(events);
                Ok(None)
            }
            Action::Unlock => {
                let user = required_user(session)?;
                let events = self.trades.unlock(&user)?;
                self.apply_trade_events(events);
                Ok(None)
            }
            Action::CancelTrade => {
                let user = required_user(session)?;
                let events = self.trades.cancel_trade(&user)?;
                self.apply_trade_events(events);
                Ok(None)
            }
            Action::CompleteTrade => {
                let user = required_user(session)?;
                let events = self.trades.complete_trade(&user)?;
                Ok(self.apply_trade_events(events))
            }
        }
    }

    /// Socket-close cleanup. Also the body of an explicit logOut.
    pub fn disconnect(&mut self, user: &str) {
        let invite_events = self.invites.user_disconnected(user);
        let trade_events = self.trades.user_disconnected(user);
        self.connections.remove(user);
        self.apply_invite_events(invite_events);
        self.apply_trade_events(trade_events);
        debug!(%user, "session closed");
    }

    fn log_out(&mut self, session: &mut Session) {
        if let Some(user) = session.user_id.take() {
            self.disconnect(&user);
        }
    }

    fn authenticate(
        &mut self,
        verifier: &TokenVerifier,
        session: &mut Session,
        token: &str,
    ) -> Result<(), UserError> {
        let user_id = verifier.verify(token)?;
        if self.connections.contains_key(&user_id) {
            return Err(UserError::UserAlreadyAuthenticated(user_id));
        }
        self.connections.insert(
            user_id.clone(),
            ConnectionEntry { state: UserState::InLobby, tx: session.tx.clone() },
        );
        session.user_id = Some(user_id.clone());
        debug!(user = %user_id, "authenticated");

        let events = self.invites.user_connected(&user_id);
        self.apply_invite_events(events);
        Ok(())
    }

    fn state_of(&self, session: &Session) -> Result<UserState, UserError> {
        match &session.user_id {
            None => Ok(UserState::NoUserId),
            Some(user) => self
                .connections
                .get(user)
                .map(|entry| entry.state)
                .ok_or_else(|| {
                    UserError::Internal(format!("no registry entry for authenticated user {user}"))
                }),
        }
    }
}

fn required_user(session: &Session) -> Result<UserId, UserError> {
    session
        .user_id
        .clone()
        .ok_or_else(|| UserError::Internal("action dispatched without an authenticated user".into()))
}

// =============================================================================
// EVENT APPLICATION
// =============================================================================

impl SessionCoordinator {
    fn apply_invite_events(&mut self, events: Vec<InviteEvent>) {
        for event in events {
            match event {
                InviteEvent::Sent { from, to } => {
                    self.set_state(&from, UserState::SentInvite);
                    self.emit_to(&to, Frame::request("inviteReceived", Data::new()).with_data("from", from));
                }
                InviteEvent::Cancelled { from, to } => {
                    self.set_state(&from, UserState::InLobby);
                    self.emit_to(&to, Frame::request("inviteCancelled", Data::new()).with_data("from", from));
                }
                InviteEvent::Accepted { from, to } => {
                    self.emit_to(&from, Frame::request("inviteAccepted", Data::new()).with_data("to", to.clone()));
                    match self.trades.start_trade(&from, &to) {
                        Ok(trade_events) => {
                            self.apply_trade_events(trade_events);
                        }
                        Err(e) => warn!(error = %e, %from, %to, "trade failed to start after accept"),
                    }
                }
                InviteEvent::Rejected { from, to } => {
                    self.set_state(&from, UserState::InLobby);
                    self.emit_to(&from, Frame::request("inviteRejected", Data::new()).with_data("to", to));
                }
            }
        }
    }

    /// Apply trade events; returns the pair of a finished completion.
    fn apply_trade_events(&mut self, events: Vec<TradeEvent>) -> Option<TradePair> {
        let mut completed = None;
        for event in events {
            match event {
                TradeEvent::Started { u1, u2 } => {
                    self.set_state(&u1, UserState::InTrade);
                    self.set_state(&u2, UserState::InTrade);
                    self.emit_to(&u1, Frame::request("tradeStarted", Data::new()).with_data("peer", u2.clone()));
                    self.emit_to(&u2, Frame::request("tradeStarted", Data::new()).with_data("peer", u1));
                }
                TradeEvent::InventoryUpdated { peer, inventory } => {
                    self.emit_to(
                        &peer,
                        Frame::request("inventoryUpdated", Data::new())
                            .with_data("inventory", serde_json::json!(inventory)),
                    );
                }
                TradeEvent::LockedIn { user, peer, self_inventory, other_inventory } => {
                    self.set_state(&user, UserState::LockedIn);
                    self.emit_to(
                        &peer,
                        Frame::request("lockedIn", Data::new())
                            .with_data("selfInventory", serde_json::json!(self_inventory))
                            .with_data("otherInventory", serde_json::json!(other_inventory)),
                    );
                }
                TradeEvent::Unlocked { user, peer } => {
                    self.set_state(&user, UserState::InTrade);
                    self.emit_to(&peer, Frame::request("unlocked", Data::new()));
                }
                TradeEvent::Cancelled { user, peer } => {
                    self.set_state(&user, UserState::InLobby);
                    self.set_state(&peer, UserState::InLobby);
                    self.emit_to(&peer, Frame::request("tradeCancelled", Data::new()));
                }
                TradeEvent::Completed { pair } => {
                    for user in [&pair.a.user_id, &pair.b.user_id] {
                        self.set_state(user, UserState::InLobby);
                        self.emit_to(user, Frame::request("tradeCompleted", Data::new()));
                    }
                    completed = Some(pair);
                }
            }
        }
        completed
    }

    fn set_state(&mut self, user: &str, state: UserState) {
        if let Some(entry) = self.connections.get_mut(user) {
            entry.state = state;
        }
    }

    /// Best-effort notification: a missing registry entry means the peer
    /// already went through disconnect cleanup, and a full or closed channel
    /// discards the frame. Notifications are never retried.
    fn emit_to(&self, user: &str, frame: Frame) {
        let Some(entry) = self.connections.get(user) else {
            return;
        };
        if entry.tx.try_send(frame).is_err() {
            warn!(%user, "dropping notification for unreachable peer");
        }
    }
}

// =============================================================================
// QUERIES (used by the socket layer's logging and by tests)
// =============================================================================

impl SessionCoordinator {
    /// Registry state for `user`, if connected.
    #[must_use]
    pub fn user_state(&self, user: &str) -> Option<UserState> {
        self.connections.get(user).map(|entry| entry.state)
    }

    /// Whether `user` has a live registry entry.
    #[must_use]
    pub fn is_connected(&self, user: &str) -> bool {
        self.connections.contains_key(user)
    }

    /// Whether `user` is in an active trade pair.
    #[must_use]
    pub fn is_trading(&self, user: &str) -> bool {
        self.trades.contains(user)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
