//! Balance tracking types for the SlotPay escrow model.
//!
//! Every user has an `available` balance (usable for new orders and
//! withdrawals) and a `frozen` balance (escrowed by active orders).
//! `total_deposited` / `total_withdrawn` are lifetime counters used for
//! audit; they need not equal `available + frozen` because withdrawal fees
//! are burned, not held as a balance.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single balance row for a (user, currency) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Balance {
    /// Available for new orders / withdrawal.
    pub available: Decimal,
    /// Frozen / escrowed for orders awaiting completion or cancellation.
    pub frozen: Decimal,
    /// Lifetime sum of reconciled chain deposits.
    pub total_deposited: Decimal,
    /// Lifetime sum of withdrawal debits (gross, including fees).
    pub total_withdrawn: Decimal,
}

impl Balance {
    /// Create a zero balance.
    #[must_use]
    pub fn new() -> Self {
        Self {
            available: Decimal::ZERO,
            frozen: Decimal::ZERO,
            total_deposited: Decimal::ZERO,
            total_withdrawn: Decimal::ZERO,
        }
    }

    /// Total held balance (available + frozen).
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.available + self.frozen
    }

    /// Whether this row holds no balance at all.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.available.is_zero() && self.frozen.is_zero()
    }
}

impl Default for Balance {
    fn default() -> Self {
        Self::new()
    }
}
