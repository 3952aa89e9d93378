//! Chain-boundary and notification models.
//!
//! Every external API response is modeled as an explicit tagged type with
//! required-field validation at the boundary. Unknown or malformed actions
//! become [`TransferAction::Unsupported`] — logged and skipped, never a
//! crash deeper in the pipeline.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Currency, OrderId};

// ---------------------------------------------------------------------------
// Inbound: event feed
// ---------------------------------------------------------------------------

/// One action inside a feed event, already validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferAction {
    /// Fungible-token transfer with an optional free-text comment (memo).
    TokenTransfer {
        /// Amount in smallest token units.
        amount_raw: u64,
        sender: String,
        recipient: String,
        comment: Option<String>,
    },
    /// Native-asset transfer. No memo channel.
    NativeTransfer {
        /// Amount in nanotons.
        amount_raw: u64,
        sender: String,
        recipient: String,
    },
    /// Anything the feed reported that we do not reconcile (swaps, NFT
    /// operations, malformed entries). Kept so the caller can log it.
    Unsupported { kind: String },
}

/// One event from the account event feed. An event groups the actions of a
/// single chain trace and may reappear across polls — the caller must
/// deduplicate via [`crate::EventKey`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEvent {
    /// Feed-native event identifier, when the indexer provides a stable one.
    pub event_id: Option<String>,
    /// Underlying chain transaction hashes, oldest first.
    pub base_transactions: Vec<String>,
    pub actions: Vec<TransferAction>,
}

impl TransferEvent {
    /// The best available chain hash for this event.
    #[must_use]
    pub fn primary_hash(&self) -> Option<&str> {
        self.base_transactions
            .first()
            .map(String::as_str)
            .or(self.event_id.as_deref())
    }
}

// ---------------------------------------------------------------------------
// Outbound: withdrawal submission
// ---------------------------------------------------------------------------

/// An outbound transfer from the custodial wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub currency: Currency,
    pub destination: String,
    pub amount: Decimal,
    /// Free-text comment forwarded with the transfer.
    pub memo: Option<String>,
}

/// Result of handing a [`TransferRequest`] to the custodial wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmitOutcome {
    /// Broadcast accepted. For token transfers the resolved per-owner token
    /// sub-account is reported so the hash lookup can poll it too.
    Accepted { token_wallet: Option<String> },
    /// The custodial account is not deployed on-chain yet; the caller should
    /// run the deploy step and retry once.
    WalletUninitialized,
    /// The wallet refused the transfer outright.
    Rejected { reason: String },
}

/// On-chain finality of a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxFinality {
    Confirmed,
    Rejected,
    /// The indexer could not answer (timeout, not yet indexed).
    Unknown,
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// Why a published post failed delivery verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TamperKind {
    /// The post is gone from the channel.
    Deleted,
    /// The post is still there but its content changed.
    Edited,
}

/// An event pushed to a user through the notification sink. Rendering is the
/// sink's concern; this is the typed payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserEvent {
    DepositCredited {
        currency: Currency,
        amount: Decimal,
    },
    WithdrawalCompleted {
        currency: Currency,
        /// Gross amount the balance was debited.
        amount: Decimal,
        destination: String,
        tx_hash: Option<String>,
    },
    WithdrawalFailed {
        currency: Currency,
        /// Gross amount returned to the balance.
        amount: Decimal,
        destination: String,
        reason: String,
    },
    /// Sent to both buyer and seller when verification finds the post
    /// deleted or edited before its paid duration elapsed.
    PostTampered {
        order: OrderId,
        kind: TamperKind,
    },
}

impl UserEvent {
    /// Short machine tag, used in logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DepositCredited { .. } => "deposit_credited",
            Self::WithdrawalCompleted { .. } => "withdrawal_completed",
            Self::WithdrawalFailed { .. } => "withdrawal_failed",
            Self::PostTampered { .. } => "post_tampered",
        }
    }
}
