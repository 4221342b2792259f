//! Trade pairs — mirrored per-user views, auto-unlock on inventory change,
//! two-phase completion.
//!
//! DESIGN
//! ======
//! A pair is stored once, keyed by the user who sent the accepted invite,
//! with a `partners` index giving O(1) peer lookup from either side. Any
//! lookup resolves to `(self, other)` by identity comparison, so both users
//! see the same pair.
//!
//! Any change to either inventory invalidates the peer's lock-in: the lock
//! encodes agreement over a specific inventory snapshot, so update unlocks
//! every locked side and clears its acceptance.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::UserError;
use crate::services::invite::UserId;

/// Proposed item list. Order carries no meaning; equality is multiset
/// equality.
pub type Inventory = Vec<String>;

// =============================================================================
// TYPES
// =============================================================================

/// One user's half of a trade pair. This is also the settlement wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTradeInfo {
    pub user_id: UserId,
    pub inventory: Inventory,
    pub locked_in: bool,
    pub accepted: bool,
}

impl UserTradeInfo {
    fn new(user_id: &str) -> Self {
        Self { user_id: user_id.to_string(), inventory: Vec::new(), locked_in: false, accepted: false }
    }
}

/// An active trade session between two users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradePair {
    pub a: UserTradeInfo,
    pub b: UserTradeInfo,
}

/// What happened inside a trade pair. The coordinator translates these into
/// `UserState` transitions and peer notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TradeEvent {
    /// A new pair exists for `u1` and `u2`.
    Started { u1: UserId, u2: UserId },
    /// `peer` should see the updater's new inventory.
    InventoryUpdated { peer: UserId, inventory: Inventory },
    /// `user` locked in over the given snapshot.
    LockedIn { user: UserId, peer: UserId, self_inventory: Inventory, other_inventory: Inventory },
    /// `user`'s lock was released (explicitly or by an inventory change).
    Unlocked { user: UserId, peer: UserId },
    /// The pair was torn down before completion.
    Cancelled { user: UserId, peer: UserId },
    /// Both sides accepted; the pair has been removed.
    Completed { pair: TradePair },
}

/// Owner of all active trade pairs.
#[derive(Debug, Default)]
pub struct TradeManager {
    /// Pair storage, keyed by the first user of the pair.
    pairs: HashMap<UserId, TradePair>,
    /// Both directions of each pair: user → partner.
    partners: HashMap<UserId, UserId>,
}

// =============================================================================
// OPERATIONS
// =============================================================================

impl TradeManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a fresh pair for `u1` and `u2`, both sides empty and unlocked.
    ///
    /// # Errors
    ///
    /// Internal when either user is already trading (the invite flow should
    /// have prevented this).
    pub fn start_trade(&mut self, u1: &str, u2: &str) -> Result<Vec<TradeEvent>, UserError> {
        if self.partners.contains_key(u1) || self.partners.contains_key(u2) {
            return Err(UserError::Internal(format!(
                "startTrade({u1}, {u2}) with a side already in a trade"
            )));
        }
        self.pairs.insert(
            u1.to_string(),
            TradePair { a: UserTradeInfo::new(u1), b: UserTradeInfo::new(u2) },
        );
        self.partners.insert(u1.to_string(), u2.to_string());
        self.partners.insert(u2.to_string(), u1.to_string());
        debug!(%u1, %u2, "trade started");
        Ok(vec![TradeEvent::Started { u1: u1.to_string(), u2: u2.to_string() }])
    }

    /// Replace `user`'s proposed inventory. Every locked side is unlocked
    /// (acceptance cleared) before the peer is told about the new list.
    pub fn update_inventory(&mut self, user: &str, inventory: Inventory) -> Result<Vec<TradeEvent>, UserError> {
        let pair = self.pair_mut(user)?;
        let (me, other) = sides_mut(pair, user);
        me.inventory = inventory.clone();
        let me_id = me.user_id.clone();
        let other_id = other.user_id.clone();

        let mut events = Vec::new();
        if me.locked_in {
            me.locked_in = false;
            me.accepted = false;
            events.push(TradeEvent::Unlocked { user: me_id.clone(), peer: other_id.clone() });
        }
        if other.locked_in {
            other.locked_in = false;
            other.accepted = false;
            events.push(TradeEvent::Unlocked { user: other_id.clone(), peer: me_id });
        }
        events.push(TradeEvent::InventoryUpdated { peer: other_id, inventory });
        Ok(events)
    }

    /// Lock `user` in over a claimed `(self, other)` inventory snapshot.
    ///
    /// # Errors
    ///
    /// `InventoryMismatchError` unless both claims match the stored
    /// inventories as multisets.
    pub fn lock_in(
        &mut self,
        user: &str,
        self_claim: &[String],
        other_claim: &[String],
    ) -> Result<Vec<TradeEvent>, UserError> {
        let pair = self.pair_mut(user)?;
        let (me, other) = sides_mut(pair, user);
        if !multiset_equal(self_claim, &me.inventory) || !multiset_equal(other_claim, &other.inventory) {
            return Err(UserError::InventoryMismatch);
        }
        me.locked_in = true;
        Ok(vec![TradeEvent::LockedIn {
            user: me.user_id.clone(),
            peer: other.user_id.clone(),
            self_inventory: me.inventory.clone(),
            other_inventory: other.inventory.clone(),
        }])
    }

    /// Release `user`'s lock and acceptance.
    pub fn unlock(&mut self, user: &str) -> Result<Vec<TradeEvent>, UserError> {
        let pair = self.pair_mut(user)?;
        let (me, other) = sides_mut(pair, user);
        me.locked_in = false;
        me.accepted = false;
        Ok(vec![TradeEvent::Unlocked { user: me.user_id.clone(), peer: other.user_id.clone() }])
    }

    /// Tear down `user`'s pair.
    pub fn cancel_trade(&mut self, user: &str) -> Result<Vec<TradeEvent>, UserError> {
        let key = self.key_of(user)?;
        let pair = self.remove_pair(&key).ok_or_else(|| desync(user))?;
        let peer = if pair.a.user_id == user { &pair.b } else { &pair.a };
        debug!(%user, peer = %peer.user_id, "trade cancelled");
        Ok(vec![TradeEvent::Cancelled { user: user.to_string(), peer: peer.user_id.clone() }])
    }

    /// Two-phase completion: mark `user` accepted; when both sides have
    /// accepted, remove the pair and emit `Completed`.
    ///
    /// # Errors
    ///
    /// `CantCompleteEitherUnlockedError` when either side is not locked.
    pub fn complete_trade(&mut self, user: &str) -> Result<Vec<TradeEvent>, UserError> {
        let key = self.key_of(user)?;
        let pair = self.pairs.get_mut(&key).ok_or_else(|| desync(user))?;
        let (me, other) = sides_mut(pair, user);
        if !me.locked_in || !other.locked_in {
            return Err(UserError::CantCompleteEitherUnlocked);
        }
        me.accepted = true;
        if !other.accepted {
            // Wait for the peer's completeTrade.
            return Ok(Vec::new());
        }
        let pair = self.remove_pair(&key).ok_or_else(|| desync(user))?;
        debug!(u1 = %pair.a.user_id, u2 = %pair.b.user_id, "trade completed");
        Ok(vec![TradeEvent::Completed { pair }])
    }

    /// Connection loss while trading tears the pair down.
    pub fn user_disconnected(&mut self, user: &str) -> Vec<TradeEvent> {
        if self.partners.contains_key(user) {
            self.cancel_trade(user).unwrap_or_default()
        } else {
            Vec::new()
        }
    }
}

// =============================================================================
// LOOKUPS
// =============================================================================

impl TradeManager {
    /// Whether `user` is currently in a trade pair.
    #[must_use]
    pub fn contains(&self, user: &str) -> bool {
        self.partners.contains_key(user)
    }

    /// `(self, other)` views for `user`, if trading.
    #[must_use]
    pub fn trade_info(&self, user: &str) -> Option<(&UserTradeInfo, &UserTradeInfo)> {
        let key = self.key_of(user).ok()?;
        let pair = self.pairs.get(&key)?;
        if pair.a.user_id == user { Some((&pair.a, &pair.b)) } else { Some((&pair.b, &pair.a)) }
    }

    fn key_of(&self, user: &str) -> Result<UserId, UserError> {
        if self.pairs.contains_key(user) {
            return Ok(user.to_string());
        }
        self.partners.get(user).cloned().ok_or_else(|| desync(user))
    }

    fn pair_mut(&mut self, user: &str) -> Result<&mut TradePair, UserError> {
        let key = self.key_of(user)?;
        self.pairs.get_mut(&key).ok_or_else(|| desync(user))
    }

    fn remove_pair(&mut self, key: &str) -> Option<TradePair> {
        let pair = self.pairs.remove(key)?;
        self.partners.remove(&pair.a.user_id);
        self.partners.remove(&pair.b.user_id);
        Some(pair)
    }
}

fn desync(user: &str) -> UserError {
    UserError::Internal(format!("trade operation for {user} who is not in a pair"))
}

/// Split a pair into `(self, other)` by identity.
fn sides_mut<'p>(pair: &'p mut TradePair, user: &str) -> (&'p mut UserTradeInfo, &'p mut UserTradeInfo) {
    let TradePair { a, b } = pair;
    if a.user_id == user { (a, b) } else { (b, a) }
}

/// Multiset equality: equal length and equal sorted contents.
#[must_use]
pub fn multiset_equal(left: &[String], right: &[String]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    let mut left: Vec<&String> = left.iter().collect();
    let mut right: Vec<&String> = right.iter().collect();
    left.sort();
    right.sort();
    left == right
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "trade_test.rs"]
mod tests;
