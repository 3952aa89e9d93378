//! Linked external wallets.
//!
//! Native-asset deposits carry no memo channel, so attribution works by
//! matching the transfer's sender address against the wallets users have
//! connected. Address equality is canonical (workchain + account hash), not
//! textual — the chain crate owns the parsing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::UserId;

/// One external wallet connected by a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkedWallet {
    pub user: UserId,
    /// Address as the user's wallet app reported it (any encoding).
    pub address: String,
    /// Whether this is the user's active send-to wallet. At most one active
    /// wallet per user.
    pub active: bool,
    pub linked_at: DateTime<Utc>,
}

impl LinkedWallet {
    #[must_use]
    pub fn new(user: UserId, address: impl Into<String>) -> Self {
        Self {
            user,
            address: address.into(),
            active: true,
            linked_at: Utc::now(),
        }
    }
}
