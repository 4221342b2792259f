//! Invite graph — single outbound invite per user, deferred delivery for
//! offline recipients.
//!
//! DESIGN
//! ======
//! Operations validate preconditions first and mutate second, so no partial
//! state survives an error path. Every mutation pairs `invite_sent_to` on
//! the sender with membership in the recipient's `pending_invites` within
//! one operation.
//!
//! Operations return `InviteEvent` lists; the session coordinator owns all
//! outbound concerns — state transitions and peer notifications — so this
//! manager is testable with nothing but its own maps.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::error::UserError;

/// Opaque user identifier supplied by the credential verifier.
pub type UserId = String;

// =============================================================================
// TYPES
// =============================================================================

/// Per-user invite bookkeeping, lazily materialized on first touch.
#[derive(Debug, Default)]
struct InviteInfo {
    /// At most one outbound invite.
    invite_sent_to: Option<UserId>,
    /// Users who have invited this user. Authoritative, survives offline.
    pending_invites: HashSet<UserId>,
    /// Subset of `pending_invites` that arrived while this user was
    /// offline; replayed and drained on connect.
    pending_notifications: HashSet<UserId>,
    connected: bool,
}

/// What happened inside the invite graph. The coordinator translates these
/// into `UserState` transitions and peer notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InviteEvent {
    /// `from` has an outstanding invite to `to`.
    Sent { from: UserId, to: UserId },
    /// `from` withdrew the invite to `to`.
    Cancelled { from: UserId, to: UserId },
    /// `to` accepted the invite from `from`.
    Accepted { from: UserId, to: UserId },
    /// `to` rejected the invite from `from`.
    Rejected { from: UserId, to: UserId },
}

/// Owner of all `InviteInfo` entries.
#[derive(Debug, Default)]
pub struct InviteManager {
    users: HashMap<UserId, InviteInfo>,
}

// =============================================================================
// OPERATIONS
// =============================================================================

impl InviteManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn info(&mut self, user: &str) -> &mut InviteInfo {
        self.users.entry(user.to_string()).or_default()
    }

    /// Mark `user` connected and replay invites that arrived while offline.
    pub fn user_connected(&mut self, user: &str) -> Vec<InviteEvent> {
        let info = self.info(user);
        info.connected = true;
        let queued: Vec<UserId> = info.pending_notifications.drain().collect();
        if !queued.is_empty() {
            debug!(%user, count = queued.len(), "replaying deferred invites");
        }
        queued
            .into_iter()
            .map(|from| InviteEvent::Sent { from, to: user.to_string() })
            .collect()
    }

    /// Tear down `user`'s corner of the invite graph: cancel their outbound
    /// invite (same code path as an explicit cancel) and reject every
    /// inbound invite from the sender's side.
    pub fn user_disconnected(&mut self, user: &str) -> Vec<InviteEvent> {
        let mut events = Vec::new();

        if self.info(user).invite_sent_to.is_some() {
            if let Ok(cancelled) = self.cancel_invite(user) {
                events.extend(cancelled);
            }
        }

        let inbound: Vec<UserId> = self.info(user).pending_invites.drain().collect();
        for from in inbound {
            self.info(&from).invite_sent_to = None;
            events.push(InviteEvent::Rejected { from, to: user.to_string() });
        }

        let info = self.info(user);
        info.pending_notifications.clear();
        info.connected = false;
        events
    }

    /// Record an invite from `from` to `to`. If `to` is offline the
    /// recipient notification is deferred to `user_connected`; the sender's
    /// state change happens either way.
    ///
    /// # Errors
    ///
    /// `SelfInviteError` when `from == to`; internal when `from` already has
    /// an outbound invite (the dispatch gate should have prevented this).
    pub fn send_invite(&mut self, from: &str, to: &str) -> Result<Vec<InviteEvent>, UserError> {
        if from == to {
            return Err(UserError::SelfInvite);
        }
        if self.info(from).invite_sent_to.is_some() {
            return Err(UserError::Internal(format!(
                "sendInvite from {from} with an outbound invite already present"
            )));
        }

        self.info(from).invite_sent_to = Some(to.to_string());
        let recipient = self.info(to);
        recipient.pending_invites.insert(from.to_string());
        if !recipient.connected {
            recipient.pending_notifications.insert(from.to_string());
        }
        Ok(vec![InviteEvent::Sent { from: from.to_string(), to: to.to_string() }])
    }

    /// Withdraw `from`'s outbound invite.
    ///
    /// # Errors
    ///
    /// `InvalidInviteError` when no outbound invite exists.
    pub fn cancel_invite(&mut self, from: &str) -> Result<Vec<InviteEvent>, UserError> {
        let Some(to) = self.info(from).invite_sent_to.take() else {
            return Err(UserError::InvalidInvite);
        };
        self.unlink(from, &to);
        Ok(vec![InviteEvent::Cancelled { from: from.to_string(), to }])
    }

    /// `to` accepts the invite from `from`.
    ///
    /// # Errors
    ///
    /// `InvalidInviteError` when `from` has no outstanding invite to `to`.
    pub fn accept_invite(&mut self, from: &str, to: &str) -> Result<Vec<InviteEvent>, UserError> {
        self.resolve(from, to)?;
        Ok(vec![InviteEvent::Accepted { from: from.to_string(), to: to.to_string() }])
    }

    /// `to` rejects the invite from `from`.
    ///
    /// # Errors
    ///
    /// `InvalidInviteError` when `from` has no outstanding invite to `to`.
    pub fn reject_invite(&mut self, from: &str, to: &str) -> Result<Vec<InviteEvent>, UserError> {
        self.resolve(from, to)?;
        Ok(vec![InviteEvent::Rejected { from: from.to_string(), to: to.to_string() }])
    }

    /// Validate that `from → to` exists, then remove the pairing.
    fn resolve(&mut self, from: &str, to: &str) -> Result<(), UserError> {
        if self.info(from).invite_sent_to.as_deref() != Some(to) {
            return Err(UserError::InvalidInvite);
        }
        self.info(from).invite_sent_to = None;
        self.unlink(from, to);
        Ok(())
    }

    /// Drop `from` from the recipient's sets. A cancelled or resolved invite
    /// must never be replayed on reconnect, so the deferred-notification
    /// entry goes with it.
    fn unlink(&mut self, from: &str, to: &str) {
        let recipient = self.info(to);
        recipient.pending_invites.remove(from);
        recipient.pending_notifications.remove(from);
    }
}

// =============================================================================
// QUERIES (used by coordinator consistency checks and tests)
// =============================================================================

impl InviteManager {
    /// Who `user` has invited, if anyone.
    #[must_use]
    pub fn outbound(&self, user: &str) -> Option<&str> {
        self.users.get(user).and_then(|info| info.invite_sent_to.as_deref())
    }

    /// Whether `from` currently appears in `to`'s inbound set.
    #[must_use]
    pub fn is_pending(&self, from: &str, to: &str) -> bool {
        self.users.get(to).is_some_and(|info| info.pending_invites.contains(from))
    }

    /// Whether an invite from `from` awaits replay to the offline user `to`.
    #[must_use]
    pub fn is_deferred(&self, from: &str, to: &str) -> bool {
        self.users.get(to).is_some_and(|info| info.pending_notifications.contains(from))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "invite_test.rs"]
mod tests;
