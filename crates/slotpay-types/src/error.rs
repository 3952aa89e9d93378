//! Error types for the SlotPay engine.
//!
//! All errors use the `SP_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Order / escrow errors
//! - 2xx: Balance errors
//! - 3xx: Deposit reconciliation errors
//! - 4xx: Withdrawal errors
//! - 5xx: Delivery verification errors
//! - 7xx: Chain / network errors
//! - 9xx: General / internal errors

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{EventKey, OrderId, OrderStatus};

/// Central error enum for all SlotPay operations.
#[derive(Debug, Error)]
pub enum SlotpayError {
    // =================================================================
    // Order / Escrow Errors (1xx)
    // =================================================================
    /// The requested order does not exist.
    #[error("SP_ERR_100: Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The order request failed validation (bad amount, buyer == seller, etc.).
    #[error("SP_ERR_101: Invalid order: {reason}")]
    InvalidOrder { reason: String },

    /// A transition was attempted from a terminal state. Rejecting this is
    /// what prevents double-release and double-refund.
    #[error("SP_ERR_102: Order {0} already processed")]
    OrderAlreadyProcessed(OrderId),

    /// The order is not in the state the transition requires.
    #[error("SP_ERR_103: Wrong order status: expected {expected}, got {actual}")]
    WrongOrderStatus {
        expected: OrderStatus,
        actual: OrderStatus,
    },

    /// Publishing the post to the channel failed; the order stays
    /// pending_seller and the approval is retryable.
    #[error("SP_ERR_104: Publish failed: {reason}")]
    PublishFailed { reason: String },

    // =================================================================
    // Balance Errors (2xx)
    // =================================================================
    /// Not enough available balance. Surfaced to the user, never retried.
    #[error("SP_ERR_200: Insufficient available balance: need {needed}, have {available}")]
    InsufficientBalance { needed: Decimal, available: Decimal },

    /// Not enough frozen balance to release or refund. If the state machine
    /// is respected this cannot happen; treat as a defect, not a retry.
    #[error("SP_ERR_201: Insufficient frozen balance")]
    InsufficientFrozen,

    /// Conservation invariant violated — critical money-safety alert.
    #[error("SP_ERR_202: Conservation violation: {reason}")]
    ConservationViolation { reason: String },

    // =================================================================
    // Deposit Errors (3xx)
    // =================================================================
    /// The external event was already credited (idempotency guard hit).
    #[error("SP_ERR_300: Event already processed: {0}")]
    EventAlreadyProcessed(EventKey),

    /// The transfer could not be attributed to any user.
    #[error("SP_ERR_301: Unattributed transfer from {sender}")]
    UnattributedTransfer { sender: String },

    // =================================================================
    // Withdrawal Errors (4xx)
    // =================================================================
    /// Destination address failed validation.
    #[error("SP_ERR_400: Invalid destination address: {reason}")]
    InvalidDestination { reason: String },

    /// Requested amount is below the configured minimum.
    #[error("SP_ERR_401: Withdrawal below minimum of {minimum}")]
    WithdrawalBelowMinimum { minimum: Decimal },

    /// The custodial wallet refused the transfer.
    #[error("SP_ERR_402: Transfer rejected: {reason}")]
    TransferRejected { reason: String },

    /// The custodial account is not deployed on-chain.
    #[error("SP_ERR_403: Custodial wallet not initialized on-chain")]
    WalletUninitialized,

    /// The currency never leaves the platform (stars).
    #[error("SP_ERR_404: Withdrawals not supported for {0}")]
    UnsupportedWithdrawalCurrency(crate::Currency),

    // =================================================================
    // Verification Errors (5xx)
    // =================================================================
    /// The verification side-channel is not configured or unreachable.
    #[error("SP_ERR_500: Content source unavailable: {reason}")]
    ContentUnavailable { reason: String },

    // =================================================================
    // Chain / Network Errors (7xx)
    // =================================================================
    /// The chain indexer / API call failed (transport, HTTP, decode).
    #[error("SP_ERR_700: Chain API error: {reason}")]
    ChainApi { reason: String },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("SP_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("SP_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (missing env var, invalid value).
    #[error("SP_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// I/O error.
    #[error("SP_ERR_903: I/O error: {0}")]
    Io(String),
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, SlotpayError>;

impl From<std::io::Error> for SlotpayError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for SlotpayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
