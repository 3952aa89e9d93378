//! The typed operations surface exposed to the route layer.
//!
//! Each operation maps 1:1 onto the ledger/escrow primitives and returns an
//! explicit success/failure result. User errors (insufficient balance, wrong
//! state, invalid destination) surface synchronously and are never retried
//! here.

use std::sync::Arc;

use rust_decimal::Decimal;
use slotpay_chain::{ContentPublisher, TonAddress};
use slotpay_ledger::{BalanceLedger, NewOrder, OrderEscrow};
use slotpay_types::{
    Balance, Currency, EventKey, LinkedWallet, Order, OrderId, OrderStatus, PostContent, Result,
    SlotpayError, TxRecord, UserId, WithdrawalConfig,
};
use tracing::info;
use uuid::Uuid;

use crate::records::TxRecordStore;
use crate::wallets::WalletRegistry;

/// Event-key prefix for withdrawal requests (internal origin, so a fresh
/// UUID rather than a chain-derived id).
const WITHDRAWAL_KEY_PREFIX: &str = "wd_";

/// The escrow and settlement operations the route layer calls.
pub struct EscrowApi {
    ledger: Arc<BalanceLedger>,
    escrow: Arc<OrderEscrow>,
    records: Arc<TxRecordStore>,
    wallets: Arc<WalletRegistry>,
    publisher: Arc<dyn ContentPublisher>,
    withdrawals: WithdrawalConfig,
}

impl EscrowApi {
    #[must_use]
    pub fn new(
        ledger: Arc<BalanceLedger>,
        escrow: Arc<OrderEscrow>,
        records: Arc<TxRecordStore>,
        wallets: Arc<WalletRegistry>,
        publisher: Arc<dyn ContentPublisher>,
        withdrawals: WithdrawalConfig,
    ) -> Self {
        Self {
            ledger,
            escrow,
            records,
            wallets,
            publisher,
            withdrawals,
        }
    }

    /// Create an ad order. Freezes the buyer's funds; a failed freeze
    /// rejects the order with no side effects.
    pub fn create_escrow_order(&self, request: NewOrder) -> Result<Order> {
        self.escrow.create(&self.ledger, request)
    }

    /// Buyer submits the post content for seller approval.
    pub fn submit_order_content(
        &self,
        actor: UserId,
        id: OrderId,
        content: PostContent,
    ) -> Result<()> {
        let order = self.escrow.get(id).ok_or(SlotpayError::OrderNotFound(id))?;
        if order.buyer != actor {
            return Err(SlotpayError::InvalidOrder {
                reason: "only the buyer may submit content".into(),
            });
        }
        self.escrow.submit_content(id, content)
    }

    /// Seller sends the post back to the buyer for edits.
    pub fn request_order_revision(&self, actor: UserId, id: OrderId) -> Result<()> {
        let order = self.escrow.get(id).ok_or(SlotpayError::OrderNotFound(id))?;
        if order.seller != actor {
            return Err(SlotpayError::InvalidOrder {
                reason: "only the seller may request a revision".into(),
            });
        }
        self.escrow.request_revision(id)
    }

    /// Seller approves: publish the post to the channel, then release the
    /// escrow. Publishing comes first — if it fails, the order stays
    /// `pending_seller` and the approval can be retried safely.
    pub async fn approve_order(&self, actor: UserId, id: OrderId) -> Result<Order> {
        let order = self.escrow.get(id).ok_or(SlotpayError::OrderNotFound(id))?;
        if order.seller != actor {
            return Err(SlotpayError::InvalidOrder {
                reason: "only the seller may approve".into(),
            });
        }
        if order.status.is_terminal() {
            return Err(SlotpayError::OrderAlreadyProcessed(id));
        }
        if order.status != OrderStatus::PendingSeller {
            return Err(SlotpayError::WrongOrderStatus {
                expected: OrderStatus::PendingSeller,
                actual: order.status,
            });
        }
        let content = order.content.as_ref().ok_or_else(|| SlotpayError::InvalidOrder {
            reason: "order has no content to publish".into(),
        })?;

        let published = self.publisher.publish(order.channel, content).await?;
        info!(order = %id, channel = %order.channel, location = %published.location,
              "ad post published");

        self.escrow.complete(&self.ledger, id, published)
    }

    /// Buyer or seller cancels an active order; the buyer is refunded.
    pub fn cancel_order(&self, actor: UserId, id: OrderId) -> Result<Order> {
        let order = self.escrow.get(id).ok_or(SlotpayError::OrderNotFound(id))?;
        if order.buyer != actor && order.seller != actor {
            return Err(SlotpayError::InvalidOrder {
                reason: "not a party to this order".into(),
            });
        }
        self.escrow.cancel(&self.ledger, id)
    }

    /// Seller declines the submitted post outright: the same refund
    /// transition as a cancel, restricted to the seller.
    pub fn decline_order(&self, actor: UserId, id: OrderId) -> Result<Order> {
        let order = self.escrow.get(id).ok_or(SlotpayError::OrderNotFound(id))?;
        if order.seller != actor {
            return Err(SlotpayError::InvalidOrder {
                reason: "only the seller may decline".into(),
            });
        }
        self.escrow.cancel(&self.ledger, id)
    }

    /// Request a withdrawal. The gross amount (net + fee) is debited
    /// immediately so the same funds cannot be withdrawn twice while the
    /// chain send is in flight; the settler picks the request up on its
    /// next tick.
    pub fn request_withdrawal(
        &self,
        user: UserId,
        currency: Currency,
        amount: Decimal,
        destination: Option<String>,
    ) -> Result<TxRecord> {
        let policy = self
            .withdrawals
            .policy(currency)
            .ok_or(SlotpayError::UnsupportedWithdrawalCurrency(currency))?;
        if amount < policy.minimum {
            return Err(SlotpayError::WithdrawalBelowMinimum {
                minimum: policy.minimum,
            });
        }

        // Explicit destination, or the user's connected wallet.
        let destination = match destination {
            Some(address) => address,
            None => {
                self.wallets
                    .active_wallet(user)
                    .ok_or_else(|| SlotpayError::InvalidDestination {
                        reason: "no destination given and no wallet connected".into(),
                    })?
                    .address
            }
        };
        TonAddress::parse(&destination)?;

        let gross = amount + policy.fee;
        self.ledger.debit_for_withdrawal(user, currency, gross)?;

        let key = EventKey::from_native(WITHDRAWAL_KEY_PREFIX, &Uuid::now_v7().to_string());
        let record = TxRecord::withdrawal(
            key,
            user,
            currency,
            amount,
            policy.fee,
            destination,
            None,
        );
        if let Err(e) = self.records.insert(record.clone()) {
            // A fresh UUID key cannot collide; undo the debit if it somehow
            // did rather than strand the user's funds.
            self.ledger.reverse_withdrawal(user, currency, gross);
            return Err(e);
        }
        info!(%user, %currency, %amount, fee = %policy.fee, key = %record.key,
              "withdrawal queued");
        Ok(record)
    }

    /// All of a user's balances.
    #[must_use]
    pub fn get_balances(&self, user: UserId) -> Vec<(Currency, Balance)> {
        self.ledger.balances_for_user(user)
    }

    /// One order, by id.
    #[must_use]
    pub fn get_order(&self, id: OrderId) -> Option<Order> {
        self.escrow.get(id)
    }

    /// Connect an external wallet (becomes the active one).
    pub fn link_wallet(&self, user: UserId, address: &str) -> Result<LinkedWallet> {
        self.wallets.link(user, address)
    }

    /// Disconnect all of a user's wallets.
    pub fn unlink_wallet(&self, user: UserId) {
        self.wallets.unlink(user);
    }
}
