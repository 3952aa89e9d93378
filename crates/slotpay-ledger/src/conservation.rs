//! Conservation invariant tracker.
//!
//! Mathematical invariant checked after settlement activity:
//! ```text
//! ∀ currency: Σ(available + frozen) == Σ(credits) − Σ(withdrawal debits)
//! ```
//!
//! Escrow operations (freeze/release/refund) move value between rows and
//! sub-balances but never change the total — only chain deposits and
//! withdrawal debits do. If this invariant breaks, value was created or
//! destroyed inside the ledger and the operation must be treated as a
//! defect, not masked.

use std::collections::HashMap;

use rust_decimal::Decimal;
use slotpay_types::{Currency, Result, SlotpayError};

/// Tracks per-currency external flow totals and validates conservation.
#[derive(Debug, Default)]
pub struct ConservationTracker {
    /// Total credited by the deposit reconciler since start.
    credits: HashMap<Currency, Decimal>,
    /// Total debited by withdrawal requests since start, net of reversals.
    debits: HashMap<Currency, Decimal>,
}

impl ConservationTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a chain deposit credit.
    pub fn record_credit(&mut self, currency: Currency, amount: Decimal) {
        *self.credits.entry(currency).or_insert(Decimal::ZERO) += amount;
    }

    /// Record a withdrawal debit (gross, including fee).
    pub fn record_debit(&mut self, currency: Currency, gross: Decimal) {
        *self.debits.entry(currency).or_insert(Decimal::ZERO) += gross;
    }

    /// Record the reversal of a failed withdrawal debit.
    pub fn record_debit_reversal(&mut self, currency: Currency, gross: Decimal) {
        *self.debits.entry(currency).or_insert(Decimal::ZERO) -= gross;
    }

    /// Expected total supply: credits − debits.
    #[must_use]
    pub fn expected_supply(&self, currency: Currency) -> Decimal {
        let credited = self.credits.get(&currency).copied().unwrap_or(Decimal::ZERO);
        let debited = self.debits.get(&currency).copied().unwrap_or(Decimal::ZERO);
        credited - debited
    }

    /// Verify that the actual supply (sum of all balance rows) matches the
    /// expected supply for a currency.
    pub fn verify(&self, currency: Currency, actual_supply: Decimal) -> Result<()> {
        let expected = self.expected_supply(currency);
        if actual_supply != expected {
            return Err(SlotpayError::ConservationViolation {
                reason: format!(
                    "{currency}: actual supply {actual_supply} != expected {expected} \
                     (credits={}, debits={})",
                    self.credits.get(&currency).copied().unwrap_or(Decimal::ZERO),
                    self.debits.get(&currency).copied().unwrap_or(Decimal::ZERO),
                ),
            });
        }
        Ok(())
    }
}
