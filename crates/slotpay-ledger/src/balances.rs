//! The balance ledger — the source of truth for all user funds.
//!
//! Every mutation goes through one of the primitives below, each executed
//! under an exclusive lock on the affected row(s). A primitive either fully
//! applies or leaves the row untouched; a failed precondition returns a
//! typed error with zero mutation.
//!
//! Cross-row operations ([`BalanceLedger::release`]) acquire both row locks
//! in ascending `(user, currency)` order, so two releases running in
//! opposite directions cannot deadlock. Row locks are never held across
//! I/O — all critical sections are a handful of `Decimal` operations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use rust_decimal::Decimal;
use slotpay_types::{Balance, Currency, Result, SlotpayError, UserId};
use tracing::{debug, warn};

use crate::conservation::ConservationTracker;

type RowKey = (UserId, Currency);
type RowRef = Arc<Mutex<Balance>>;

/// Acquire a row lock, recovering from poisoning: a panicked holder can only
/// have been mid-read, never mid-write, because every mutation is a single
/// non-panicking arithmetic block.
fn lock_row(row: &Mutex<Balance>) -> MutexGuard<'_, Balance> {
    row.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Per-(user, currency) balance rows with atomic mutation primitives.
///
/// Rows are created lazily on first credit/freeze and never deleted.
pub struct BalanceLedger {
    rows: RwLock<HashMap<RowKey, RowRef>>,
    conservation: Mutex<ConservationTracker>,
}

impl BalanceLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            conservation: Mutex::new(ConservationTracker::new()),
        }
    }

    /// Look up an existing row without creating it.
    fn row(&self, user: UserId, currency: Currency) -> Option<RowRef> {
        self.rows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(user, currency))
            .cloned()
    }

    /// Look up a row, creating a zero row if absent.
    fn ensure_row(&self, user: UserId, currency: Currency) -> RowRef {
        if let Some(row) = self.row(user, currency) {
            return row;
        }
        let mut rows = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        rows.entry((user, currency))
            .or_insert_with(|| Arc::new(Mutex::new(Balance::new())))
            .clone()
    }

    /// Move `amount` from `available` to `frozen` (order escrow).
    ///
    /// # Errors
    /// Returns [`SlotpayError::InsufficientBalance`] if available < amount;
    /// the row is unchanged. Callers must surface this to the user, not
    /// retry it.
    pub fn freeze(&self, user: UserId, currency: Currency, amount: Decimal) -> Result<()> {
        let Some(row) = self.row(user, currency) else {
            return Err(SlotpayError::InsufficientBalance {
                needed: amount,
                available: Decimal::ZERO,
            });
        };
        let mut balance = lock_row(&row);
        if balance.available < amount {
            return Err(SlotpayError::InsufficientBalance {
                needed: amount,
                available: balance.available,
            });
        }
        balance.available -= amount;
        balance.frozen += amount;
        debug!(%user, %currency, %amount, "froze escrow funds");
        Ok(())
    }

    /// Pay out escrowed funds: decrement `from`'s frozen, credit `to`'s
    /// available (creating the row if absent). Used on order completion.
    ///
    /// # Errors
    /// Returns [`SlotpayError::InsufficientFrozen`] if `from` has less than
    /// `amount` frozen. Nothing is mutated on failure.
    pub fn release(
        &self,
        from: UserId,
        to: UserId,
        currency: Currency,
        amount: Decimal,
    ) -> Result<()> {
        let from_row = self
            .row(from, currency)
            .ok_or(SlotpayError::InsufficientFrozen)?;
        let to_row = self.ensure_row(to, currency);

        // Same row: degenerate release, equivalent to a refund.
        if from == to {
            let mut balance = lock_row(&from_row);
            if balance.frozen < amount {
                return Err(SlotpayError::InsufficientFrozen);
            }
            balance.frozen -= amount;
            balance.available += amount;
            return Ok(());
        }

        // Deterministic lock order: ascending (user, currency) key.
        let (mut from_guard, mut to_guard) = if (from, currency) < (to, currency) {
            let f = lock_row(&from_row);
            let t = lock_row(&to_row);
            (f, t)
        } else {
            let t = lock_row(&to_row);
            let f = lock_row(&from_row);
            (f, t)
        };

        if from_guard.frozen < amount {
            return Err(SlotpayError::InsufficientFrozen);
        }
        from_guard.frozen -= amount;
        to_guard.available += amount;
        debug!(%from, %to, %currency, %amount, "released escrow to seller");
        Ok(())
    }

    /// Move `amount` back from `frozen` to `available` (order cancelled).
    ///
    /// # Errors
    /// Returns [`SlotpayError::InsufficientFrozen`] if frozen < amount.
    pub fn refund(&self, user: UserId, currency: Currency, amount: Decimal) -> Result<()> {
        let Some(row) = self.row(user, currency) else {
            return Err(SlotpayError::InsufficientFrozen);
        };
        let mut balance = lock_row(&row);
        if balance.frozen < amount {
            return Err(SlotpayError::InsufficientFrozen);
        }
        balance.frozen -= amount;
        balance.available += amount;
        debug!(%user, %currency, %amount, "refunded escrow to buyer");
        Ok(())
    }

    /// Unconditional credit of `available` and `total_deposited`.
    ///
    /// Only the deposit reconciler calls this, and only after the external
    /// event's idempotency key was claimed — the ledger itself does not
    /// deduplicate.
    pub fn credit(&self, user: UserId, currency: Currency, amount: Decimal) {
        let row = self.ensure_row(user, currency);
        {
            let mut balance = lock_row(&row);
            balance.available += amount;
            balance.total_deposited += amount;
        }
        self.conservation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record_credit(currency, amount);
        debug!(%user, %currency, %amount, "credited deposit");
    }

    /// Debit `available` for a withdrawal request (gross = amount + fee).
    /// Called at request time, before the chain send, so the same funds
    /// cannot be withdrawn twice while a send is in flight.
    ///
    /// # Errors
    /// Returns [`SlotpayError::InsufficientBalance`] if available < gross.
    pub fn debit_for_withdrawal(
        &self,
        user: UserId,
        currency: Currency,
        gross: Decimal,
    ) -> Result<()> {
        let Some(row) = self.row(user, currency) else {
            return Err(SlotpayError::InsufficientBalance {
                needed: gross,
                available: Decimal::ZERO,
            });
        };
        {
            let mut balance = lock_row(&row);
            if balance.available < gross {
                return Err(SlotpayError::InsufficientBalance {
                    needed: gross,
                    available: balance.available,
                });
            }
            balance.available -= gross;
            balance.total_withdrawn += gross;
        }
        self.conservation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record_debit(currency, gross);
        debug!(%user, %currency, %gross, "debited withdrawal");
        Ok(())
    }

    /// Reverse a withdrawal debit after a failed chain send: credit the
    /// gross amount back and roll back the lifetime counter.
    pub fn reverse_withdrawal(&self, user: UserId, currency: Currency, gross: Decimal) {
        let row = self.ensure_row(user, currency);
        {
            let mut balance = lock_row(&row);
            balance.available += gross;
            balance.total_withdrawn -= gross;
            if balance.total_withdrawn < Decimal::ZERO {
                warn!(%user, %currency, "total_withdrawn went negative on reversal, clamping");
                balance.total_withdrawn = Decimal::ZERO;
            }
        }
        self.conservation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record_debit_reversal(currency, gross);
        debug!(%user, %currency, %gross, "reversed failed withdrawal");
    }

    /// Snapshot of one balance row (zero row if absent).
    #[must_use]
    pub fn balance(&self, user: UserId, currency: Currency) -> Balance {
        self.row(user, currency)
            .map(|row| lock_row(&row).clone())
            .unwrap_or_default()
    }

    /// Snapshot of all of a user's rows, one per currency held.
    #[must_use]
    pub fn balances_for_user(&self, user: UserId) -> Vec<(Currency, Balance)> {
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<(Currency, Balance)> = rows
            .iter()
            .filter(|((row_user, _), _)| *row_user == user)
            .map(|((_, currency), row)| (*currency, lock_row(row).clone()))
            .collect();
        out.sort_by_key(|(currency, _)| *currency);
        out
    }

    /// Total supply of a currency: Σ(available + frozen) over all rows.
    #[must_use]
    pub fn total_supply(&self, currency: Currency) -> Decimal {
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        rows.iter()
            .filter(|((_, row_currency), _)| *row_currency == currency)
            .map(|(_, row)| lock_row(row).total())
            .sum()
    }

    /// Check the conservation invariant for a currency against the current
    /// row totals.
    pub fn verify_conservation(&self, currency: Currency) -> Result<()> {
        let actual = self.total_supply(currency);
        self.conservation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .verify(currency, actual)
    }
}

impl Default for BalanceLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn funded_ledger(user: UserId, currency: Currency, amount: Decimal) -> BalanceLedger {
        let ledger = BalanceLedger::new();
        ledger.credit(user, currency, amount);
        ledger
    }

    #[test]
    fn credit_creates_row_and_counts_deposit() {
        let ledger = BalanceLedger::new();
        let user = UserId(1);
        ledger.credit(user, Currency::Usdt, Decimal::new(100, 0));

        let balance = ledger.balance(user, Currency::Usdt);
        assert_eq!(balance.available, Decimal::new(100, 0));
        assert_eq!(balance.frozen, Decimal::ZERO);
        assert_eq!(balance.total_deposited, Decimal::new(100, 0));
    }

    #[test]
    fn freeze_moves_available_to_frozen() {
        let user = UserId(1);
        let ledger = funded_ledger(user, Currency::Usdt, Decimal::new(100, 0));

        ledger.freeze(user, Currency::Usdt, Decimal::new(30, 0)).unwrap();
        let balance = ledger.balance(user, Currency::Usdt);
        assert_eq!(balance.available, Decimal::new(70, 0));
        assert_eq!(balance.frozen, Decimal::new(30, 0));
    }

    #[test]
    fn freeze_insufficient_fails_without_mutation() {
        let user = UserId(1);
        let ledger = funded_ledger(user, Currency::Usdt, Decimal::new(10, 0));

        let err = ledger
            .freeze(user, Currency::Usdt, Decimal::new(20, 0))
            .unwrap_err();
        assert!(matches!(err, SlotpayError::InsufficientBalance { .. }));
        assert_eq!(
            ledger.balance(user, Currency::Usdt).available,
            Decimal::new(10, 0)
        );
    }

    #[test]
    fn freeze_on_missing_row_fails() {
        let ledger = BalanceLedger::new();
        let err = ledger
            .freeze(UserId(9), Currency::Ton, Decimal::ONE)
            .unwrap_err();
        assert!(matches!(err, SlotpayError::InsufficientBalance { .. }));
    }

    #[test]
    fn release_pays_seller_and_creates_row() {
        let buyer = UserId(1);
        let seller = UserId(2);
        let ledger = funded_ledger(buyer, Currency::Usdt, Decimal::new(100, 0));
        ledger.freeze(buyer, Currency::Usdt, Decimal::new(30, 0)).unwrap();

        ledger
            .release(buyer, seller, Currency::Usdt, Decimal::new(30, 0))
            .unwrap();

        assert_eq!(ledger.balance(buyer, Currency::Usdt).frozen, Decimal::ZERO);
        assert_eq!(
            ledger.balance(buyer, Currency::Usdt).available,
            Decimal::new(70, 0)
        );
        assert_eq!(
            ledger.balance(seller, Currency::Usdt).available,
            Decimal::new(30, 0)
        );
    }

    #[test]
    fn release_more_than_frozen_fails_without_mutation() {
        let buyer = UserId(1);
        let seller = UserId(2);
        let ledger = funded_ledger(buyer, Currency::Usdt, Decimal::new(100, 0));
        ledger.freeze(buyer, Currency::Usdt, Decimal::new(30, 0)).unwrap();

        let err = ledger
            .release(buyer, seller, Currency::Usdt, Decimal::new(31, 0))
            .unwrap_err();
        assert!(matches!(err, SlotpayError::InsufficientFrozen));
        assert_eq!(
            ledger.balance(buyer, Currency::Usdt).frozen,
            Decimal::new(30, 0)
        );
        assert!(ledger.balance(seller, Currency::Usdt).is_zero());
    }

    #[test]
    fn opposite_direction_releases_do_not_deadlock() {
        // Two releases in opposite directions on the same pair of users.
        let a = UserId(1);
        let b = UserId(2);
        let ledger = Arc::new(BalanceLedger::new());
        ledger.credit(a, Currency::Usdt, Decimal::new(50, 0));
        ledger.credit(b, Currency::Usdt, Decimal::new(50, 0));
        ledger.freeze(a, Currency::Usdt, Decimal::new(50, 0)).unwrap();
        ledger.freeze(b, Currency::Usdt, Decimal::new(50, 0)).unwrap();

        let handles: Vec<_> = [(a, b), (b, a)]
            .into_iter()
            .map(|(from, to)| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let _ = ledger.release(from, to, Currency::Usdt, Decimal::new(5, 1));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // Conservation: total supply unchanged by releases.
        assert_eq!(ledger.total_supply(Currency::Usdt), Decimal::new(100, 0));
        ledger.verify_conservation(Currency::Usdt).unwrap();
    }

    #[test]
    fn refund_restores_available() {
        let user = UserId(1);
        let ledger = funded_ledger(user, Currency::Ton, Decimal::new(10, 0));
        ledger.freeze(user, Currency::Ton, Decimal::new(4, 0)).unwrap();
        ledger.refund(user, Currency::Ton, Decimal::new(4, 0)).unwrap();

        let balance = ledger.balance(user, Currency::Ton);
        assert_eq!(balance.available, Decimal::new(10, 0));
        assert_eq!(balance.frozen, Decimal::ZERO);
    }

    #[test]
    fn debit_for_withdrawal_tracks_lifetime_total() {
        let user = UserId(1);
        let ledger = funded_ledger(user, Currency::Ton, Decimal::new(10, 0));
        ledger
            .debit_for_withdrawal(user, Currency::Ton, Decimal::new(515, 2))
            .unwrap();

        let balance = ledger.balance(user, Currency::Ton);
        assert_eq!(balance.available, Decimal::new(485, 2));
        assert_eq!(balance.total_withdrawn, Decimal::new(515, 2));
    }

    #[test]
    fn debit_insufficient_fails() {
        let user = UserId(1);
        let ledger = funded_ledger(user, Currency::Ton, Decimal::ONE);
        let err = ledger
            .debit_for_withdrawal(user, Currency::Ton, Decimal::new(2, 0))
            .unwrap_err();
        assert!(matches!(err, SlotpayError::InsufficientBalance { .. }));
        assert_eq!(ledger.balance(user, Currency::Ton).available, Decimal::ONE);
    }

    #[test]
    fn reverse_withdrawal_restores_exact_pre_request_balance() {
        let user = UserId(1);
        let ledger = funded_ledger(user, Currency::Usdt, Decimal::new(50, 0));
        let before = ledger.balance(user, Currency::Usdt).available;

        let gross = Decimal::new(103, 1); // 10 + 0.3 fee
        ledger.debit_for_withdrawal(user, Currency::Usdt, gross).unwrap();
        ledger.reverse_withdrawal(user, Currency::Usdt, gross);

        let after = ledger.balance(user, Currency::Usdt);
        assert_eq!(after.available, before);
        assert_eq!(after.total_withdrawn, Decimal::ZERO);
        ledger.verify_conservation(Currency::Usdt).unwrap();
    }

    #[test]
    fn conservation_holds_across_escrow_cycle() {
        let buyer = UserId(1);
        let seller = UserId(2);
        let ledger = BalanceLedger::new();
        ledger.credit(buyer, Currency::Usdt, Decimal::new(100, 0));

        ledger.freeze(buyer, Currency::Usdt, Decimal::new(30, 0)).unwrap();
        ledger
            .release(buyer, seller, Currency::Usdt, Decimal::new(30, 0))
            .unwrap();
        ledger.freeze(buyer, Currency::Usdt, Decimal::new(20, 0)).unwrap();
        ledger.refund(buyer, Currency::Usdt, Decimal::new(20, 0)).unwrap();

        ledger.verify_conservation(Currency::Usdt).unwrap();
        assert_eq!(ledger.total_supply(Currency::Usdt), Decimal::new(100, 0));
    }

    #[test]
    fn balances_for_user_lists_all_currencies() {
        let user = UserId(1);
        let ledger = BalanceLedger::new();
        ledger.credit(user, Currency::Usdt, Decimal::new(5, 0));
        ledger.credit(user, Currency::Ton, Decimal::new(2, 0));
        ledger.credit(UserId(2), Currency::Ton, Decimal::new(9, 0));

        let balances = ledger.balances_for_user(user);
        assert_eq!(balances.len(), 2);
        assert!(balances.iter().all(|(_, b)| !b.is_zero()));
    }

    #[test]
    fn no_negative_balances_under_concurrent_freeze() {
        // Many threads race to freeze from the same row; total frozen must
        // never exceed the deposit and available must never go negative.
        let user = UserId(1);
        let ledger = Arc::new(funded_ledger(user, Currency::Usdt, Decimal::new(10, 0)));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || {
                    let mut frozen = 0u32;
                    for _ in 0..10 {
                        if ledger.freeze(user, Currency::Usdt, Decimal::ONE).is_ok() {
                            frozen += 1;
                        }
                    }
                    frozen
                })
            })
            .collect();
        let total_frozen: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(total_frozen, 10, "exactly the deposit can be frozen");
        let balance = ledger.balance(user, Currency::Usdt);
        assert_eq!(balance.available, Decimal::ZERO);
        assert_eq!(balance.frozen, Decimal::new(10, 0));
    }
}
