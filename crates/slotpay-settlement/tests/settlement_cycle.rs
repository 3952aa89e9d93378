//! End-to-end integration tests across the escrow and settlement planes.
//!
//! These exercise the full money cycle with scripted collaborators:
//! chain deposit → escrow order → publish + release → withdrawal → delivery
//! verification. They verify idempotent crediting, exact failure refunds,
//! the optimistic unknown-finality rule, and the verification diff.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;
use slotpay_chain::{
    ChainClient, ContentPublisher, ContentSource, EventFeed, NotificationSink, TonAddress,
};
use slotpay_ledger::{BalanceLedger, NewOrder, OrderEscrow};
use slotpay_settlement::{
    DeliveryVerifier, DepositScanner, EscrowApi, RetryPacing, TxRecordStore, WalletRegistry,
    WithdrawalSettler,
};
use slotpay_types::*;

// ---------------------------------------------------------------------------
// Scripted collaborators
// ---------------------------------------------------------------------------

/// Feed that returns the same scripted events on every poll, like a real
/// indexer re-serving recent history.
#[derive(Default)]
struct ScriptedFeed {
    events: Mutex<Vec<TransferEvent>>,
}

impl ScriptedFeed {
    fn set_events(&self, events: Vec<TransferEvent>) {
        *self.events.lock().unwrap() = events;
    }
}

#[async_trait]
impl EventFeed for ScriptedFeed {
    async fn recent_events(&self, _account: &str, _limit: usize) -> Result<Vec<TransferEvent>> {
        Ok(self.events.lock().unwrap().clone())
    }
}

/// Chain client with scripted submit outcomes and a fixed finality answer.
struct ScriptedChain {
    submits: Mutex<VecDeque<SubmitOutcome>>,
    finality: Mutex<TxFinality>,
    deploys: AtomicUsize,
}

impl ScriptedChain {
    fn new(finality: TxFinality) -> Self {
        Self {
            submits: Mutex::new(VecDeque::new()),
            finality: Mutex::new(finality),
            deploys: AtomicUsize::new(0),
        }
    }

    fn push_submit(&self, outcome: SubmitOutcome) {
        self.submits.lock().unwrap().push_back(outcome);
    }
}

#[async_trait]
impl ChainClient for ScriptedChain {
    async fn submit_transfer(&self, _request: &TransferRequest) -> Result<SubmitOutcome> {
        self.submits
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| SlotpayError::ChainApi {
                reason: "no scripted submit outcome".into(),
            })
    }

    async fn deploy_wallet(&self) -> Result<()> {
        self.deploys.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn transaction_status(&self, _hash: &str) -> TxFinality {
        *self.finality.lock().unwrap()
    }
}

/// Notification sink that records everything it is given.
#[derive(Default)]
struct RecordingSink {
    sent: Mutex<Vec<(UserId, UserEvent)>>,
}

impl RecordingSink {
    fn events_for(&self, user: UserId) -> Vec<UserEvent> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(recipient, _)| *recipient == user)
            .map(|(_, event)| event.clone())
            .collect()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send(&self, user: UserId, event: &UserEvent) {
        self.sent.lock().unwrap().push((user, event.clone()));
    }
}

/// Publisher that can be told to fail, then succeed.
struct ScriptedPublisher {
    failures_left: AtomicUsize,
    published: AtomicUsize,
}

impl ScriptedPublisher {
    fn new(failures: usize) -> Self {
        Self {
            failures_left: AtomicUsize::new(failures),
            published: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ContentPublisher for ScriptedPublisher {
    async fn publish(&self, channel: ChannelId, _content: &PostContent) -> Result<PublishedPost> {
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                left.checked_sub(1)
            })
            .is_ok()
        {
            return Err(SlotpayError::PublishFailed {
                reason: "channel unreachable".into(),
            });
        }
        let message_id = 1_000 + self.published.fetch_add(1, Ordering::SeqCst) as i64;
        Ok(PublishedPost {
            location: MessageLocation {
                chat_id: channel.0,
                message_id,
            },
            link: None,
        })
    }
}

/// Content source returning a scripted live message.
#[derive(Default)]
struct ScriptedContent {
    /// `None` = the post is gone.
    live: Mutex<Option<String>>,
}

#[async_trait]
impl ContentSource for ScriptedContent {
    async fn fetch_message(&self, _location: MessageLocation) -> Result<Option<String>> {
        Ok(self.live.lock().unwrap().clone())
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

const CUSTODIAL: &str = "0:00000000000000000000000000000000000000000000000000000000000000aa";

fn custodial_address() -> TonAddress {
    TonAddress::parse(CUSTODIAL).unwrap()
}

fn token_deposit_event(event_id: &str, amount_raw: u64, memo: &str) -> TransferEvent {
    TransferEvent {
        event_id: Some(event_id.to_string()),
        base_transactions: vec![format!("tx_{event_id}")],
        actions: vec![TransferAction::TokenTransfer {
            amount_raw,
            sender: "0:00000000000000000000000000000000000000000000000000000000000000bb".into(),
            recipient: CUSTODIAL.into(),
            comment: Some(memo.to_string()),
        }],
    }
}

fn native_deposit_event(event_id: &str, amount_raw: u64, sender: &TonAddress) -> TransferEvent {
    TransferEvent {
        event_id: Some(event_id.to_string()),
        base_transactions: vec![format!("tx_{event_id}")],
        actions: vec![TransferAction::NativeTransfer {
            amount_raw,
            sender: sender.to_friendly(),
            recipient: custodial_address().to_friendly(),
        }],
    }
}

struct Engine {
    ledger: Arc<BalanceLedger>,
    escrow: Arc<OrderEscrow>,
    records: Arc<TxRecordStore>,
    wallets: Arc<WalletRegistry>,
    feed: Arc<ScriptedFeed>,
    sink: Arc<RecordingSink>,
}

impl Engine {
    fn new() -> Self {
        Self {
            ledger: Arc::new(BalanceLedger::new()),
            escrow: Arc::new(OrderEscrow::new()),
            records: Arc::new(TxRecordStore::new()),
            wallets: Arc::new(WalletRegistry::new()),
            feed: Arc::new(ScriptedFeed::default()),
            sink: Arc::new(RecordingSink::default()),
        }
    }

    fn token_scanner(&self) -> DepositScanner {
        DepositScanner::memo_attributed(
            self.feed.clone(),
            self.records.clone(),
            self.ledger.clone(),
            self.sink.clone(),
            CUSTODIAL,
            50,
        )
    }

    fn native_scanner(&self) -> DepositScanner {
        DepositScanner::sender_attributed(
            self.feed.clone(),
            self.records.clone(),
            self.ledger.clone(),
            self.sink.clone(),
            self.wallets.clone(),
            CUSTODIAL,
            50,
        )
    }

    fn settler(&self, chain: Arc<ScriptedChain>, currency: Currency) -> WithdrawalSettler {
        WithdrawalSettler::new(
            self.records.clone(),
            self.ledger.clone(),
            chain,
            self.feed.clone(),
            self.sink.clone(),
            currency,
            CUSTODIAL,
            10,
            RetryPacing::immediate(),
        )
    }

    fn api(&self, publisher: Arc<dyn ContentPublisher>) -> EscrowApi {
        EscrowApi::new(
            self.ledger.clone(),
            self.escrow.clone(),
            self.records.clone(),
            self.wallets.clone(),
            publisher,
            WithdrawalConfig::default(),
        )
    }

    fn new_order(&self, buyer: UserId, seller: UserId, amount: Decimal) -> NewOrder {
        NewOrder {
            buyer,
            seller,
            channel: ChannelId(-100),
            format: FormatId::new(),
            currency: Currency::Usdt,
            amount,
            duration_hours: 24,
        }
    }
}

// ---------------------------------------------------------------------------
// Deposit reconciliation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn replayed_feed_credits_exactly_once() {
    let engine = Engine::new();
    let scanner = engine.token_scanner();
    let user = UserId(42);

    engine.feed.set_events(vec![
        token_deposit_event("ev1", 25_000_000, "42"),
        token_deposit_event("ev2", 10_000_000, "42"),
    ]);

    assert_eq!(scanner.scan().await.unwrap(), 2);
    // Replay the identical feed page: nothing new may be credited.
    assert_eq!(scanner.scan().await.unwrap(), 0);
    assert_eq!(scanner.scan().await.unwrap(), 0);

    let balance = engine.ledger.balance(user, Currency::Usdt);
    assert_eq!(balance.available, Decimal::new(35, 0));
    assert_eq!(balance.total_deposited, Decimal::new(35, 0));
    engine.ledger.verify_conservation(Currency::Usdt).unwrap();

    // One notification per credited deposit, not per poll.
    assert_eq!(engine.sink.events_for(user).len(), 2);
}

#[tokio::test]
async fn unattributed_and_malformed_deposits_are_skipped() {
    let engine = Engine::new();
    let scanner = engine.token_scanner();

    engine.feed.set_events(vec![
        token_deposit_event("ev1", 5_000_000, "not-a-user-id"),
        TransferEvent {
            event_id: Some("ev2".into()),
            base_transactions: vec![],
            actions: vec![TransferAction::Unsupported {
                kind: "JettonSwap".into(),
            }],
        },
        token_deposit_event("ev3", 7_000_000, "77"),
    ]);

    // One bad event never aborts the batch: the valid one still lands.
    assert_eq!(scanner.scan().await.unwrap(), 1);
    assert_eq!(
        engine.ledger.balance(UserId(77), Currency::Usdt).available,
        Decimal::new(7, 0)
    );
}

#[tokio::test]
async fn native_deposits_attribute_by_linked_wallet() {
    let engine = Engine::new();
    let scanner = engine.native_scanner();
    let user = UserId(9);
    let sender = TonAddress {
        workchain: 0,
        hash: [5; 32],
    };
    let stranger = TonAddress {
        workchain: 0,
        hash: [6; 32],
    };

    // Linked with one encoding, matched against another.
    engine.wallets.link(user, &sender.to_string()).unwrap();

    engine.feed.set_events(vec![
        native_deposit_event("ev1", 2_500_000_000, &sender),
        native_deposit_event("ev2", 9_000_000_000, &stranger),
    ]);

    assert_eq!(scanner.scan().await.unwrap(), 1);
    assert_eq!(
        engine.ledger.balance(user, Currency::Ton).available,
        Decimal::new(25, 1)
    );
    // The stranger's transfer stays unattributed.
    assert_eq!(engine.records.len(), 1);
}

#[tokio::test]
async fn deposit_without_native_id_uses_synthetic_key() {
    let engine = Engine::new();
    let scanner = engine.token_scanner();

    let mut event = token_deposit_event("ignored", 1_000_000, "5");
    event.event_id = None;
    event.base_transactions.clear();
    engine.feed.set_events(vec![event]);

    assert_eq!(scanner.scan().await.unwrap(), 1);
    // Same (sender, amount) re-polled: synthetic key blocks re-credit.
    assert_eq!(scanner.scan().await.unwrap(), 0);
    assert_eq!(
        engine.ledger.balance(UserId(5), Currency::Usdt).available,
        Decimal::ONE
    );
}

// ---------------------------------------------------------------------------
// Escrow API
// ---------------------------------------------------------------------------

#[tokio::test]
async fn publish_failure_keeps_order_pending_and_retryable() {
    let engine = Engine::new();
    let publisher = Arc::new(ScriptedPublisher::new(1));
    let api = engine.api(publisher.clone());
    let buyer = UserId(1);
    let seller = UserId(2);
    engine.ledger.credit(buyer, Currency::Usdt, Decimal::new(100, 0));

    let order = api
        .create_escrow_order(engine.new_order(buyer, seller, Decimal::new(30, 0)))
        .unwrap();
    api.submit_order_content(buyer, order.id, PostContent::text_only("<b>ad</b>"))
        .unwrap();

    // First approval: publish fails, no ledger movement, state unchanged.
    let err = api.approve_order(seller, order.id).await.unwrap_err();
    assert!(matches!(err, SlotpayError::PublishFailed { .. }));
    let stored = api.get_order(order.id).unwrap();
    assert_eq!(stored.status, OrderStatus::PendingSeller);
    assert_eq!(
        engine.ledger.balance(buyer, Currency::Usdt).frozen,
        Decimal::new(30, 0)
    );
    assert!(engine.ledger.balance(seller, Currency::Usdt).is_zero());

    // Retry: publish succeeds, escrow releases.
    let done = api.approve_order(seller, order.id).await.unwrap();
    assert_eq!(done.status, OrderStatus::Done);
    assert_eq!(
        engine.ledger.balance(seller, Currency::Usdt).available,
        Decimal::new(30, 0)
    );
    engine.ledger.verify_conservation(Currency::Usdt).unwrap();
}

#[tokio::test]
async fn double_approval_is_rejected_with_no_second_payout() {
    let engine = Engine::new();
    let api = engine.api(Arc::new(ScriptedPublisher::new(0)));
    let buyer = UserId(1);
    let seller = UserId(2);
    engine.ledger.credit(buyer, Currency::Usdt, Decimal::new(50, 0));

    let order = api
        .create_escrow_order(engine.new_order(buyer, seller, Decimal::new(30, 0)))
        .unwrap();
    api.submit_order_content(buyer, order.id, PostContent::text_only("ad"))
        .unwrap();
    api.approve_order(seller, order.id).await.unwrap();

    let err = api.approve_order(seller, order.id).await.unwrap_err();
    assert!(matches!(err, SlotpayError::OrderAlreadyProcessed(_)));
    assert_eq!(
        engine.ledger.balance(seller, Currency::Usdt).available,
        Decimal::new(30, 0),
        "no double payout"
    );
}

#[tokio::test]
async fn seller_decline_refunds_buyer() {
    let engine = Engine::new();
    let api = engine.api(Arc::new(ScriptedPublisher::new(0)));
    let buyer = UserId(1);
    let seller = UserId(2);
    engine.ledger.credit(buyer, Currency::Usdt, Decimal::new(50, 0));

    let order = api
        .create_escrow_order(engine.new_order(buyer, seller, Decimal::new(30, 0)))
        .unwrap();
    api.submit_order_content(buyer, order.id, PostContent::text_only("ad"))
        .unwrap();

    // Only the seller may decline.
    let err = api.decline_order(buyer, order.id).unwrap_err();
    assert!(matches!(err, SlotpayError::InvalidOrder { .. }));

    let declined = api.decline_order(seller, order.id).unwrap();
    assert_eq!(declined.status, OrderStatus::Cancelled);
    let balance = engine.ledger.balance(buyer, Currency::Usdt);
    assert_eq!(balance.available, Decimal::new(50, 0));
    assert_eq!(balance.frozen, Decimal::ZERO);
}

// ---------------------------------------------------------------------------
// Withdrawal settlement
// ---------------------------------------------------------------------------

#[tokio::test]
async fn confirmed_withdrawal_completes_with_explorer_hash() {
    let engine = Engine::new();
    let api = engine.api(Arc::new(ScriptedPublisher::new(0)));
    let user = UserId(1);
    engine.ledger.credit(user, Currency::Usdt, Decimal::new(50, 0));

    let destination = TonAddress {
        workchain: 0,
        hash: [3; 32],
    };
    let record = api
        .request_withdrawal(
            user,
            Currency::Usdt,
            Decimal::new(10, 0),
            Some(destination.to_friendly()),
        )
        .unwrap();
    // Gross 10.3 debited immediately.
    assert_eq!(
        engine.ledger.balance(user, Currency::Usdt).available,
        Decimal::new(397, 1)
    );

    // The hot wallet's feed later shows the outbound transfer.
    engine.feed.set_events(vec![TransferEvent {
        event_id: Some("out1".into()),
        base_transactions: vec!["outbound_hash".into()],
        actions: vec![TransferAction::TokenTransfer {
            amount_raw: 10_000_000,
            sender: CUSTODIAL.into(),
            recipient: destination.to_string(),
            comment: None,
        }],
    }]);

    let chain = Arc::new(ScriptedChain::new(TxFinality::Confirmed));
    chain.push_submit(SubmitOutcome::Accepted { token_wallet: None });
    let settler = engine.settler(chain, Currency::Usdt);

    assert_eq!(settler.settle_pending().await, 1);
    let resolved = engine.records.get(&record.key).unwrap();
    assert_eq!(resolved.status, TxStatus::Completed);
    assert_eq!(resolved.tx_hash.as_deref(), Some("outbound_hash"));

    let events = engine.sink.events_for(user);
    assert!(matches!(
        events.last(),
        Some(UserEvent::WithdrawalCompleted { tx_hash: Some(hash), .. }) if hash == "outbound_hash"
    ));
    // Settled batch drained; next tick is a no-op.
    assert_eq!(settler.settle_pending().await, 0);
}

#[tokio::test]
async fn failed_send_restores_exact_pre_request_balance() {
    let engine = Engine::new();
    let api = engine.api(Arc::new(ScriptedPublisher::new(0)));
    let user = UserId(1);
    engine.ledger.credit(user, Currency::Ton, Decimal::new(20, 0));
    let before = engine.ledger.balance(user, Currency::Ton).available;

    let destination = TonAddress {
        workchain: 0,
        hash: [4; 32],
    };
    let record = api
        .request_withdrawal(
            user,
            Currency::Ton,
            Decimal::new(5, 0),
            Some(destination.to_friendly()),
        )
        .unwrap();

    let chain = Arc::new(ScriptedChain::new(TxFinality::Unknown));
    chain.push_submit(SubmitOutcome::Rejected {
        reason: "insufficient gas".into(),
    });
    let settler = engine.settler(chain, Currency::Ton);
    assert_eq!(settler.settle_pending().await, 0);

    // Full reversal of amount + fee.
    let after = engine.ledger.balance(user, Currency::Ton);
    assert_eq!(after.available, before);
    assert_eq!(after.total_withdrawn, Decimal::ZERO);
    assert_eq!(
        engine.records.get(&record.key).unwrap().status,
        TxStatus::Failed
    );
    assert!(matches!(
        engine.sink.events_for(user).last(),
        Some(UserEvent::WithdrawalFailed { .. })
    ));
    engine.ledger.verify_conservation(Currency::Ton).unwrap();
}

#[tokio::test]
async fn onchain_rejection_refunds_after_send() {
    let engine = Engine::new();
    let api = engine.api(Arc::new(ScriptedPublisher::new(0)));
    let user = UserId(1);
    engine.ledger.credit(user, Currency::Ton, Decimal::new(20, 0));

    let destination = TonAddress {
        workchain: 0,
        hash: [4; 32],
    };
    api.request_withdrawal(
        user,
        Currency::Ton,
        Decimal::new(5, 0),
        Some(destination.to_string()),
    )
    .unwrap();

    engine.feed.set_events(vec![TransferEvent {
        event_id: Some("out".into()),
        base_transactions: vec!["rejected_hash".into()],
        actions: vec![TransferAction::NativeTransfer {
            amount_raw: 5_000_000_000,
            sender: CUSTODIAL.into(),
            recipient: destination.to_friendly(),
        }],
    }]);

    let chain = Arc::new(ScriptedChain::new(TxFinality::Rejected));
    chain.push_submit(SubmitOutcome::Accepted { token_wallet: None });
    let settler = engine.settler(chain, Currency::Ton);
    assert_eq!(settler.settle_pending().await, 0);

    let balance = engine.ledger.balance(user, Currency::Ton);
    assert_eq!(balance.available, Decimal::new(20, 0));
    engine.ledger.verify_conservation(Currency::Ton).unwrap();
}

#[tokio::test]
async fn unknown_finality_is_treated_as_completed() {
    // Once the custodial wallet broadcast the transfer, an unknown result
    // must not reverse the debit (double-spend risk). Deliberate trade-off.
    let engine = Engine::new();
    let api = engine.api(Arc::new(ScriptedPublisher::new(0)));
    let user = UserId(1);
    engine.ledger.credit(user, Currency::Ton, Decimal::new(20, 0));

    let destination = TonAddress {
        workchain: 0,
        hash: [4; 32],
    };
    let record = api
        .request_withdrawal(
            user,
            Currency::Ton,
            Decimal::new(5, 0),
            Some(destination.to_string()),
        )
        .unwrap();

    // No matching event ever appears; finality stays unknown.
    let chain = Arc::new(ScriptedChain::new(TxFinality::Unknown));
    chain.push_submit(SubmitOutcome::Accepted { token_wallet: None });
    let settler = engine.settler(chain, Currency::Ton);

    assert_eq!(settler.settle_pending().await, 1);
    let resolved = engine.records.get(&record.key).unwrap();
    assert_eq!(resolved.status, TxStatus::Completed);
    assert_eq!(resolved.tx_hash, None);
    // The debit stands.
    assert_eq!(
        engine.ledger.balance(user, Currency::Ton).available,
        Decimal::new(1485, 2)
    );
}

#[tokio::test]
async fn uninitialized_wallet_deploys_then_retries_once() {
    let engine = Engine::new();
    let api = engine.api(Arc::new(ScriptedPublisher::new(0)));
    let user = UserId(1);
    engine.ledger.credit(user, Currency::Usdt, Decimal::new(50, 0));

    let destination = TonAddress {
        workchain: 0,
        hash: [8; 32],
    };
    api.request_withdrawal(
        user,
        Currency::Usdt,
        Decimal::new(10, 0),
        Some(destination.to_string()),
    )
    .unwrap();

    let chain = Arc::new(ScriptedChain::new(TxFinality::Unknown));
    chain.push_submit(SubmitOutcome::WalletUninitialized);
    chain.push_submit(SubmitOutcome::Accepted { token_wallet: None });
    let settler = engine.settler(chain.clone(), Currency::Usdt);

    assert_eq!(settler.settle_pending().await, 1);
    assert_eq!(chain.deploys.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn below_minimum_and_unsupported_currency_rejected_upfront() {
    let engine = Engine::new();
    let api = engine.api(Arc::new(ScriptedPublisher::new(0)));
    let user = UserId(1);
    engine.ledger.credit(user, Currency::Ton, Decimal::new(20, 0));
    engine.ledger.credit(user, Currency::Stars, Decimal::new(500, 0));

    let err = api
        .request_withdrawal(user, Currency::Ton, Decimal::new(5, 2), Some("0:aa".into()))
        .unwrap_err();
    assert!(matches!(err, SlotpayError::WithdrawalBelowMinimum { .. }));

    let err = api
        .request_withdrawal(user, Currency::Stars, Decimal::new(100, 0), None)
        .unwrap_err();
    assert!(matches!(
        err,
        SlotpayError::UnsupportedWithdrawalCurrency(Currency::Stars)
    ));

    // No debit happened in either case.
    assert_eq!(
        engine.ledger.balance(user, Currency::Ton).available,
        Decimal::new(20, 0)
    );
    assert!(engine.records.is_empty());
}

// ---------------------------------------------------------------------------
// Delivery verification
// ---------------------------------------------------------------------------

async fn done_order(engine: &Engine, text: &str) -> Order {
    let api = engine.api(Arc::new(ScriptedPublisher::new(0)));
    let buyer = UserId(1);
    let seller = UserId(2);
    engine.ledger.credit(buyer, Currency::Usdt, Decimal::new(100, 0));
    let order = api
        .create_escrow_order(engine.new_order(buyer, seller, Decimal::new(30, 0)))
        .unwrap();
    api.submit_order_content(buyer, order.id, PostContent::text_only(text))
        .unwrap();
    api.approve_order(seller, order.id).await.unwrap()
}

fn past_duration(engine: &Engine, order: &Order) -> chrono::DateTime<chrono::Utc> {
    let done_at = engine.escrow.get(order.id).unwrap().done_at.unwrap();
    done_at + chrono::Duration::hours(25)
}

#[tokio::test]
async fn intact_post_is_verified_after_duration() {
    let engine = Engine::new();
    let order = done_order(&engine, "<b>Great offer!</b>").await;

    let content = Arc::new(ScriptedContent::default());
    // Live copy differs only in markup and spacing.
    *content.live.lock().unwrap() = Some("Great   offer!\n\n#ad".into());

    let verifier = DeliveryVerifier::new(engine.escrow.clone(), content, engine.sink.clone());

    // Before the duration elapses nothing happens.
    assert_eq!(verifier.verify_due(chrono::Utc::now()).await, 0);
    assert!(engine.escrow.get(order.id).unwrap().verified_at.is_none());

    // After it elapses the order verifies.
    assert_eq!(verifier.verify_due(past_duration(&engine, &order)).await, 1);
    assert!(engine.escrow.get(order.id).unwrap().verified_at.is_some());
    // No tamper notifications.
    assert!(engine
        .sink
        .events_for(UserId(1))
        .iter()
        .all(|event| !matches!(event, UserEvent::PostTampered { .. })));
}

#[tokio::test]
async fn edited_post_notifies_both_parties_and_flags() {
    let engine = Engine::new();
    let order = done_order(&engine, "original ad text").await;

    let content = Arc::new(ScriptedContent::default());
    *content.live.lock().unwrap() = Some("completely rewritten by the channel owner".into());

    let verifier = DeliveryVerifier::new(engine.escrow.clone(), content, engine.sink.clone());
    assert_eq!(verifier.verify_due(past_duration(&engine, &order)).await, 0);

    let stored = engine.escrow.get(order.id).unwrap();
    assert!(stored.verified_at.is_none());
    assert!(stored.flagged_at.is_some());

    for user in [UserId(1), UserId(2)] {
        assert!(matches!(
            engine.sink.events_for(user).last(),
            Some(UserEvent::PostTampered {
                kind: TamperKind::Edited,
                ..
            })
        ));
    }

    // Flagged orders leave the queue: no repeat notifications next tick.
    let sent_before = engine.sink.events_for(UserId(1)).len();
    assert_eq!(verifier.verify_due(past_duration(&engine, &order)).await, 0);
    assert_eq!(engine.sink.events_for(UserId(1)).len(), sent_before);
}

#[tokio::test]
async fn deleted_post_notifies_deleted_kind() {
    let engine = Engine::new();
    let order = done_order(&engine, "ad").await;

    let content = Arc::new(ScriptedContent::default()); // live = None
    let verifier = DeliveryVerifier::new(engine.escrow.clone(), content, engine.sink.clone());
    verifier.verify_due(past_duration(&engine, &order)).await;

    assert!(engine.escrow.get(order.id).unwrap().flagged_at.is_some());
    assert!(matches!(
        engine.sink.events_for(UserId(2)).last(),
        Some(UserEvent::PostTampered {
            kind: TamperKind::Deleted,
            ..
        })
    ));
}

// ---------------------------------------------------------------------------
// Whole-cycle conservation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn full_cycle_conserves_value() {
    let engine = Engine::new();
    let api = engine.api(Arc::new(ScriptedPublisher::new(0)));
    let buyer = UserId(42);
    let seller = UserId(43);
    let scanner = engine.token_scanner();

    // 1. Buyer deposits 100 USDT on-chain.
    engine
        .feed
        .set_events(vec![token_deposit_event("dep1", 100_000_000, "42")]);
    scanner.scan().await.unwrap();

    // 2. Order for 30, approved and released to the seller.
    let order = api
        .create_escrow_order(engine.new_order(buyer, seller, Decimal::new(30, 0)))
        .unwrap();
    api.submit_order_content(buyer, order.id, PostContent::text_only("ad"))
        .unwrap();
    api.approve_order(seller, order.id).await.unwrap();

    // 3. A second order for 20 is cancelled and refunded.
    let second = api
        .create_escrow_order(engine.new_order(buyer, seller, Decimal::new(20, 0)))
        .unwrap();
    api.cancel_order(buyer, second.id).unwrap();

    // 4. Seller withdraws 10 (+0.3 fee); chain confirms.
    let destination = TonAddress {
        workchain: 0,
        hash: [9; 32],
    };
    api.request_withdrawal(
        seller,
        Currency::Usdt,
        Decimal::new(10, 0),
        Some(destination.to_string()),
    )
    .unwrap();
    engine.feed.set_events(vec![]);
    let chain = Arc::new(ScriptedChain::new(TxFinality::Confirmed));
    chain.push_submit(SubmitOutcome::Accepted { token_wallet: None });
    engine.settler(chain, Currency::Usdt).settle_pending().await;

    // Final books: buyer 70, seller 30 − 10.3 = 19.7, supply 89.7.
    assert_eq!(
        engine.ledger.balance(buyer, Currency::Usdt).available,
        Decimal::new(70, 0)
    );
    assert_eq!(
        engine.ledger.balance(seller, Currency::Usdt).available,
        Decimal::new(197, 1)
    );
    assert_eq!(
        engine.ledger.total_supply(Currency::Usdt),
        Decimal::new(897, 1)
    );
    engine.ledger.verify_conservation(Currency::Usdt).unwrap();
}
