//! The order escrow state machine.
//!
//! ```text
//!  [create]      -> writing_post    (ledger: freeze — failure rejects the order)
//!  writing_post  -> pending_seller  (buyer submits content; no ledger effect)
//!  pending_seller -> done           (publish first, then ledger: release)
//!  pending_seller -> writing_post   (seller requests revision; no ledger effect)
//!  writing_post | pending_seller -> cancelled  (ledger: refund)
//! ```
//!
//! `done` and `cancelled` are terminal. A transition attempted from a
//! terminal state fails with [`SlotpayError::OrderAlreadyProcessed`] and
//! performs zero ledger mutation — that is what makes double-release and
//! double-refund impossible.
//!
//! The external publish side effect is the caller's responsibility and must
//! happen *before* [`OrderEscrow::complete`]: if publishing fails the order
//! stays `pending_seller` and approval is safely retryable.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::Utc;
use rust_decimal::Decimal;
use slotpay_types::{
    constants, ChannelId, Currency, FormatId, Order, OrderId, OrderStatus, PostContent, PostToken,
    PublishedPost, Result, SlotpayError, UserId,
};
use tracing::info;

use crate::balances::BalanceLedger;

/// Parameters for creating an order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub buyer: UserId,
    pub seller: UserId,
    pub channel: ChannelId,
    pub format: FormatId,
    pub currency: Currency,
    pub amount: Decimal,
    pub duration_hours: u32,
}

/// Order store and lifecycle driver.
///
/// Invariant maintained together with the ledger: the buyer's frozen balance
/// in a currency is always ≥ the sum of their active (non-terminal) orders
/// in that currency, because freeze happens before insert and release/refund
/// happen inside the same guarded transition that makes the order terminal.
pub struct OrderEscrow {
    orders: RwLock<HashMap<OrderId, Order>>,
}

impl OrderEscrow {
    #[must_use]
    pub fn new() -> Self {
        Self {
            orders: RwLock::new(HashMap::new()),
        }
    }

    /// Create an order, freezing the buyer's funds first. If the freeze
    /// fails (insufficient balance) no order is created.
    pub fn create(&self, ledger: &BalanceLedger, request: NewOrder) -> Result<Order> {
        if request.buyer == request.seller {
            return Err(SlotpayError::InvalidOrder {
                reason: "buyer and seller are the same user".into(),
            });
        }
        if request.amount <= Decimal::ZERO {
            return Err(SlotpayError::InvalidOrder {
                reason: format!("non-positive amount: {}", request.amount),
            });
        }

        ledger.freeze(request.buyer, request.currency, request.amount)?;

        let order = Order {
            id: OrderId::new(),
            buyer: request.buyer,
            seller: request.seller,
            channel: request.channel,
            format: request.format,
            currency: request.currency,
            amount: request.amount,
            status: OrderStatus::WritingPost,
            content: None,
            post_token: PostToken::generate(),
            duration_hours: if request.duration_hours == 0 {
                constants::DEFAULT_DURATION_HOURS
            } else {
                request.duration_hours
            },
            created_at: Utc::now(),
            done_at: None,
            published: None,
            verified_at: None,
            flagged_at: None,
        };

        let mut orders = self.orders.write().unwrap_or_else(PoisonError::into_inner);
        orders.insert(order.id, order.clone());
        info!(order = %order.id, buyer = %order.buyer, amount = %order.amount,
              currency = %order.currency, "order created, funds frozen");
        Ok(order)
    }

    /// Buyer submits the ad content: `writing_post → pending_seller`.
    pub fn submit_content(&self, id: OrderId, content: PostContent) -> Result<()> {
        self.transition(id, OrderStatus::WritingPost, |order| {
            order.content = Some(content);
            order.status = OrderStatus::PendingSeller;
            Ok(())
        })
    }

    /// Seller sends the post back for edits: `pending_seller → writing_post`.
    pub fn request_revision(&self, id: OrderId) -> Result<()> {
        self.transition(id, OrderStatus::PendingSeller, |order| {
            order.status = OrderStatus::WritingPost;
            Ok(())
        })
    }

    /// Finish an order after the post was published:
    /// `pending_seller → done`, releasing the escrow to the seller.
    ///
    /// The caller must have performed the publish side effect already; this
    /// method only records its location and moves the money.
    pub fn complete(
        &self,
        ledger: &BalanceLedger,
        id: OrderId,
        published: PublishedPost,
    ) -> Result<Order> {
        let mut orders = self.orders.write().unwrap_or_else(PoisonError::into_inner);
        let order = orders.get_mut(&id).ok_or(SlotpayError::OrderNotFound(id))?;
        Self::check_active(order, OrderStatus::PendingSeller)?;

        // Money moves before the state flips; a release failure leaves the
        // order pending_seller and nothing mutated.
        ledger.release(order.buyer, order.seller, order.currency, order.amount)?;

        order.status = OrderStatus::Done;
        order.done_at = Some(Utc::now());
        order.published = Some(published);
        info!(order = %order.id, seller = %order.seller, amount = %order.amount,
              currency = %order.currency, "order done, escrow released to seller");
        Ok(order.clone())
    }

    /// Cancel or decline an active order, refunding the buyer:
    /// `writing_post | pending_seller → cancelled`.
    pub fn cancel(&self, ledger: &BalanceLedger, id: OrderId) -> Result<Order> {
        let mut orders = self.orders.write().unwrap_or_else(PoisonError::into_inner);
        let order = orders.get_mut(&id).ok_or(SlotpayError::OrderNotFound(id))?;
        if order.status.is_terminal() {
            return Err(SlotpayError::OrderAlreadyProcessed(id));
        }

        ledger.refund(order.buyer, order.currency, order.amount)?;

        order.status = OrderStatus::Cancelled;
        info!(order = %order.id, buyer = %order.buyer, amount = %order.amount,
              currency = %order.currency, "order cancelled, escrow refunded");
        Ok(order.clone())
    }

    /// Record a successful delivery verification.
    pub fn mark_verified(&self, id: OrderId) -> Result<()> {
        let mut orders = self.orders.write().unwrap_or_else(PoisonError::into_inner);
        let order = orders.get_mut(&id).ok_or(SlotpayError::OrderNotFound(id))?;
        if order.status != OrderStatus::Done {
            return Err(SlotpayError::WrongOrderStatus {
                expected: OrderStatus::Done,
                actual: order.status,
            });
        }
        order.verified_at = Some(Utc::now());
        Ok(())
    }

    /// Flag an order whose published post was found deleted or edited.
    /// Flagged orders leave the verification queue for manual follow-up.
    pub fn mark_flagged(&self, id: OrderId) -> Result<()> {
        let mut orders = self.orders.write().unwrap_or_else(PoisonError::into_inner);
        let order = orders.get_mut(&id).ok_or(SlotpayError::OrderNotFound(id))?;
        if order.status != OrderStatus::Done {
            return Err(SlotpayError::WrongOrderStatus {
                expected: OrderStatus::Done,
                actual: order.status,
            });
        }
        order.flagged_at = Some(Utc::now());
        Ok(())
    }

    /// Snapshot of one order.
    #[must_use]
    pub fn get(&self, id: OrderId) -> Option<Order> {
        self.orders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Look up an order by its opaque deep-link token.
    #[must_use]
    pub fn find_by_token(&self, token: &PostToken) -> Option<Order> {
        self.orders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .find(|order| &order.post_token == token)
            .cloned()
    }

    /// All done-and-published orders still awaiting delivery verification.
    #[must_use]
    pub fn awaiting_verification(&self) -> Vec<Order> {
        let orders = self.orders.read().unwrap_or_else(PoisonError::into_inner);
        let mut due: Vec<Order> = orders
            .values()
            .filter(|order| order.awaits_verification())
            .cloned()
            .collect();
        due.sort_by_key(|order| order.done_at);
        due
    }

    /// Number of orders tracked.
    #[must_use]
    pub fn count(&self) -> usize {
        self.orders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Shared guard: terminal states win over status mismatches so callers
    /// get the precise "already processed" error.
    fn check_active(order: &Order, expected: OrderStatus) -> Result<()> {
        if order.status.is_terminal() {
            return Err(SlotpayError::OrderAlreadyProcessed(order.id));
        }
        if order.status != expected {
            return Err(SlotpayError::WrongOrderStatus {
                expected,
                actual: order.status,
            });
        }
        Ok(())
    }

    fn transition(
        &self,
        id: OrderId,
        expected: OrderStatus,
        apply: impl FnOnce(&mut Order) -> Result<()>,
    ) -> Result<()> {
        let mut orders = self.orders.write().unwrap_or_else(PoisonError::into_inner);
        let order = orders.get_mut(&id).ok_or(SlotpayError::OrderNotFound(id))?;
        Self::check_active(order, expected)?;
        apply(order)
    }
}

impl Default for OrderEscrow {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotpay_types::MessageLocation;

    fn setup(buyer_funds: Decimal) -> (OrderEscrow, BalanceLedger, NewOrder) {
        let escrow = OrderEscrow::new();
        let ledger = BalanceLedger::new();
        let buyer = UserId(1);
        ledger.credit(buyer, Currency::Usdt, buyer_funds);
        let request = NewOrder {
            buyer,
            seller: UserId(2),
            channel: ChannelId(-100),
            format: FormatId::new(),
            currency: Currency::Usdt,
            amount: Decimal::new(30, 0),
            duration_hours: 24,
        };
        (escrow, ledger, request)
    }

    fn published() -> PublishedPost {
        PublishedPost {
            location: MessageLocation {
                chat_id: -100,
                message_id: 42,
            },
            link: Some("https://example.org/c/42".into()),
        }
    }

    #[test]
    fn create_freezes_funds() {
        let (escrow, ledger, request) = setup(Decimal::new(100, 0));
        let order = escrow.create(&ledger, request).unwrap();

        assert_eq!(order.status, OrderStatus::WritingPost);
        let balance = ledger.balance(order.buyer, Currency::Usdt);
        assert_eq!(balance.available, Decimal::new(70, 0));
        assert_eq!(balance.frozen, Decimal::new(30, 0));
    }

    #[test]
    fn create_insufficient_balance_creates_no_order() {
        let (escrow, ledger, request) = setup(Decimal::new(10, 0));
        let err = escrow.create(&ledger, request).unwrap_err();
        assert!(matches!(err, SlotpayError::InsufficientBalance { .. }));
        assert_eq!(escrow.count(), 0);
    }

    #[test]
    fn create_rejects_self_purchase() {
        let (escrow, ledger, mut request) = setup(Decimal::new(100, 0));
        request.seller = request.buyer;
        let err = escrow.create(&ledger, request).unwrap_err();
        assert!(matches!(err, SlotpayError::InvalidOrder { .. }));
        // No freeze happened either.
        assert_eq!(
            ledger.balance(UserId(1), Currency::Usdt).frozen,
            Decimal::ZERO
        );
    }

    #[test]
    fn full_cycle_to_done_releases_escrow() {
        let (escrow, ledger, request) = setup(Decimal::new(100, 0));
        let order = escrow.create(&ledger, request).unwrap();

        escrow
            .submit_content(order.id, PostContent::text_only("<b>ad</b>"))
            .unwrap();
        let done = escrow.complete(&ledger, order.id, published()).unwrap();

        assert_eq!(done.status, OrderStatus::Done);
        assert!(done.done_at.is_some());
        assert!(done.published.is_some());
        assert_eq!(
            ledger.balance(done.seller, Currency::Usdt).available,
            Decimal::new(30, 0)
        );
        assert_eq!(ledger.balance(done.buyer, Currency::Usdt).frozen, Decimal::ZERO);
    }

    #[test]
    fn complete_requires_pending_seller() {
        let (escrow, ledger, request) = setup(Decimal::new(100, 0));
        let order = escrow.create(&ledger, request).unwrap();

        let err = escrow.complete(&ledger, order.id, published()).unwrap_err();
        assert!(matches!(err, SlotpayError::WrongOrderStatus { .. }));
        // Funds stay frozen.
        assert_eq!(
            ledger.balance(order.buyer, Currency::Usdt).frozen,
            Decimal::new(30, 0)
        );
    }

    #[test]
    fn terminal_orders_reject_every_transition() {
        let (escrow, ledger, request) = setup(Decimal::new(100, 0));
        let order = escrow.create(&ledger, request).unwrap();
        escrow
            .submit_content(order.id, PostContent::text_only("ad"))
            .unwrap();
        escrow.complete(&ledger, order.id, published()).unwrap();

        let seller_before = ledger.balance(order.seller, Currency::Usdt);

        let err = escrow.complete(&ledger, order.id, published()).unwrap_err();
        assert!(matches!(err, SlotpayError::OrderAlreadyProcessed(_)));
        let err = escrow.cancel(&ledger, order.id).unwrap_err();
        assert!(matches!(err, SlotpayError::OrderAlreadyProcessed(_)));
        let err = escrow
            .submit_content(order.id, PostContent::text_only("x"))
            .unwrap_err();
        assert!(matches!(err, SlotpayError::OrderAlreadyProcessed(_)));

        // Zero ledger mutation from the rejected attempts.
        assert_eq!(ledger.balance(order.seller, Currency::Usdt), seller_before);
    }

    #[test]
    fn cancel_refunds_buyer_from_both_active_states() {
        let (escrow, ledger, request) = setup(Decimal::new(100, 0));
        let buyer = request.buyer;

        // Cancel from writing_post.
        let first = escrow.create(&ledger, request.clone()).unwrap();
        escrow.cancel(&ledger, first.id).unwrap();
        assert_eq!(
            ledger.balance(buyer, Currency::Usdt).available,
            Decimal::new(100, 0)
        );

        // Cancel from pending_seller.
        let second = escrow.create(&ledger, request).unwrap();
        escrow
            .submit_content(second.id, PostContent::text_only("ad"))
            .unwrap();
        escrow.cancel(&ledger, second.id).unwrap();
        assert_eq!(
            ledger.balance(buyer, Currency::Usdt).available,
            Decimal::new(100, 0)
        );
        assert_eq!(ledger.balance(buyer, Currency::Usdt).frozen, Decimal::ZERO);
    }

    #[test]
    fn revision_roundtrip() {
        let (escrow, ledger, request) = setup(Decimal::new(100, 0));
        let order = escrow.create(&ledger, request).unwrap();
        escrow
            .submit_content(order.id, PostContent::text_only("v1"))
            .unwrap();
        escrow.request_revision(order.id).unwrap();
        assert_eq!(escrow.get(order.id).unwrap().status, OrderStatus::WritingPost);

        // Resubmission is allowed after a revision request.
        escrow
            .submit_content(order.id, PostContent::text_only("v2"))
            .unwrap();
        let stored = escrow.get(order.id).unwrap();
        assert_eq!(stored.status, OrderStatus::PendingSeller);
        assert_eq!(stored.content.unwrap().text_html, "v2");
    }

    #[test]
    fn find_by_token() {
        let (escrow, ledger, request) = setup(Decimal::new(100, 0));
        let order = escrow.create(&ledger, request).unwrap();
        let found = escrow.find_by_token(&order.post_token).unwrap();
        assert_eq!(found.id, order.id);
        assert!(escrow.find_by_token(&PostToken::generate()).is_none());
    }

    #[test]
    fn awaiting_verification_lists_done_unverified() {
        let (escrow, ledger, request) = setup(Decimal::new(100, 0));
        let order = escrow.create(&ledger, request).unwrap();
        escrow
            .submit_content(order.id, PostContent::text_only("ad"))
            .unwrap();
        escrow.complete(&ledger, order.id, published()).unwrap();

        let due = escrow.awaiting_verification();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, order.id);

        escrow.mark_verified(order.id).unwrap();
        assert!(escrow.awaiting_verification().is_empty());
    }

    #[test]
    fn scenario_from_escrow_accounting() {
        // Buyer with 100 USDT creates an order for 30 → 70/30.
        // Seller approves → release → seller +30, buyer frozen 0.
        // Separate 20 USDT order cancelled before approval → refund.
        let (escrow, ledger, request) = setup(Decimal::new(100, 0));
        let buyer = request.buyer;
        let seller = request.seller;

        let first = escrow.create(&ledger, request.clone()).unwrap();
        assert_eq!(
            ledger.balance(buyer, Currency::Usdt).available,
            Decimal::new(70, 0)
        );
        assert_eq!(
            ledger.balance(buyer, Currency::Usdt).frozen,
            Decimal::new(30, 0)
        );

        escrow
            .submit_content(first.id, PostContent::text_only("ad"))
            .unwrap();
        escrow.complete(&ledger, first.id, published()).unwrap();
        assert_eq!(
            ledger.balance(seller, Currency::Usdt).available,
            Decimal::new(30, 0)
        );
        assert_eq!(ledger.balance(buyer, Currency::Usdt).frozen, Decimal::ZERO);

        let mut second_request = request;
        second_request.amount = Decimal::new(20, 0);
        let second = escrow.create(&ledger, second_request).unwrap();
        escrow.cancel(&ledger, second.id).unwrap();
        assert_eq!(
            ledger.balance(buyer, Currency::Usdt).available,
            Decimal::new(70, 0)
        );
        ledger.verify_conservation(Currency::Usdt).unwrap();
    }
}
