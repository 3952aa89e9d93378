//! External transaction records — the deposit/withdrawal audit log.
//!
//! One record per external chain event (deposit) or withdrawal request.
//! Records are keyed by [`EventKey`] and never deleted; the key's uniqueness
//! is the idempotency guard against re-processing a chain event observed
//! again on a later poll.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Currency, EventKey, UserId};

/// Direction of value flow relative to the custodial wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxDirection {
    Deposit,
    Withdrawal,
}

/// Processing status of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    /// Queued for the withdrawal settler. Deposits are never pending —
    /// they are recorded only once credited.
    Pending,
    Completed,
    Failed,
}

/// One external transaction: a reconciled deposit or a withdrawal request
/// and its outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxRecord {
    /// Unique external event identifier (idempotency key).
    pub key: EventKey,
    pub user: UserId,
    pub currency: Currency,
    /// Net amount: credited (deposit) or sent to the destination (withdrawal).
    pub amount: Decimal,
    pub direction: TxDirection,
    pub status: TxStatus,
    /// Chain transaction hash, once known.
    pub tx_hash: Option<String>,
    /// Destination wallet address (withdrawals only).
    pub destination: Option<String>,
    /// Free-text memo forwarded with the transfer (withdrawals only).
    pub memo: Option<String>,
    /// Fee burned on withdrawal; zero for deposits.
    pub fee: Decimal,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl TxRecord {
    /// A reconciled deposit. Deposits are born completed: the record is
    /// inserted in the same guarded step as the ledger credit.
    #[must_use]
    pub fn deposit(key: EventKey, user: UserId, currency: Currency, amount: Decimal) -> Self {
        let now = Utc::now();
        Self {
            key,
            user,
            currency,
            amount,
            direction: TxDirection::Deposit,
            status: TxStatus::Completed,
            tx_hash: None,
            destination: None,
            memo: None,
            fee: Decimal::ZERO,
            created_at: now,
            resolved_at: Some(now),
        }
    }

    /// A queued withdrawal request. The ledger was already debited for
    /// `amount + fee` when this record was created.
    #[must_use]
    pub fn withdrawal(
        key: EventKey,
        user: UserId,
        currency: Currency,
        amount: Decimal,
        fee: Decimal,
        destination: impl Into<String>,
        memo: Option<String>,
    ) -> Self {
        Self {
            key,
            user,
            currency,
            amount,
            direction: TxDirection::Withdrawal,
            status: TxStatus::Pending,
            tx_hash: None,
            destination: Some(destination.into()),
            memo,
            fee,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    /// Gross amount the user's balance was debited (net + fee).
    #[must_use]
    pub fn gross(&self) -> Decimal {
        self.amount + self.fee
    }

    /// Whether the withdrawal settler still has to process this record.
    #[must_use]
    pub fn is_pending_withdrawal(&self) -> bool {
        self.direction == TxDirection::Withdrawal && self.status == TxStatus::Pending
    }
}
