//! Deposit reconciliation.
//!
//! Polls the custodial deposit account's event feed and credits each
//! incoming transfer to exactly one user, exactly once. Two attribution
//! strategies:
//!
//! - **Memo**: the transfer comment carries the user's numeric id (token
//!   deposits — tokens have a comment field).
//! - **Sender**: the sender address is matched against linked wallets
//!   (native deposits — no memo channel exists).
//!
//! Idempotency: a prefixed [`EventKey`] is claimed in the record store
//! before the ledger credit; re-polled events hit the key and are skipped.
//! Unattributed or malformed transfers are logged and dropped for manual
//! reconciliation — one bad event never aborts the batch.

use std::sync::Arc;

use rust_decimal::Decimal;
use slotpay_chain::{EventFeed, NotificationSink, TonAddress};
use slotpay_ledger::BalanceLedger;
use slotpay_types::{
    Currency, EventKey, Result, SlotpayError, TransferAction, TransferEvent, TxRecord, UserEvent,
    UserId,
};
use tracing::{debug, info, warn};

use crate::records::TxRecordStore;
use crate::wallets::WalletRegistry;

/// Event-key prefix for memo-attributed token deposits.
const TOKEN_DEPOSIT_PREFIX: &str = "usdt_";
/// Event-key prefix for sender-attributed native deposits.
const NATIVE_DEPOSIT_PREFIX: &str = "ton_dep_";

enum Attribution {
    /// Comment parses as a user id.
    Memo,
    /// Sender address matches a linked wallet.
    Sender(Arc<WalletRegistry>),
}

/// One deposit reconciler instance per supported asset.
pub struct DepositScanner {
    feed: Arc<dyn EventFeed>,
    records: Arc<TxRecordStore>,
    ledger: Arc<BalanceLedger>,
    notifier: Arc<dyn NotificationSink>,
    currency: Currency,
    /// Custodial deposit address whose feed is polled.
    wallet_address: String,
    key_prefix: &'static str,
    scan_limit: usize,
    attribution: Attribution,
}

impl DepositScanner {
    /// Memo-attributed scanner for token deposits.
    #[must_use]
    pub fn memo_attributed(
        feed: Arc<dyn EventFeed>,
        records: Arc<TxRecordStore>,
        ledger: Arc<BalanceLedger>,
        notifier: Arc<dyn NotificationSink>,
        wallet_address: impl Into<String>,
        scan_limit: usize,
    ) -> Self {
        Self {
            feed,
            records,
            ledger,
            notifier,
            currency: Currency::Usdt,
            wallet_address: wallet_address.into(),
            key_prefix: TOKEN_DEPOSIT_PREFIX,
            scan_limit,
            attribution: Attribution::Memo,
        }
    }

    /// Sender-attributed scanner for native deposits.
    #[must_use]
    pub fn sender_attributed(
        feed: Arc<dyn EventFeed>,
        records: Arc<TxRecordStore>,
        ledger: Arc<BalanceLedger>,
        notifier: Arc<dyn NotificationSink>,
        wallets: Arc<WalletRegistry>,
        wallet_address: impl Into<String>,
        scan_limit: usize,
    ) -> Self {
        Self {
            feed,
            records,
            ledger,
            notifier,
            currency: Currency::Ton,
            wallet_address: wallet_address.into(),
            key_prefix: NATIVE_DEPOSIT_PREFIX,
            scan_limit,
            attribution: Attribution::Sender(wallets),
        }
    }

    /// One scan tick. Returns the number of deposits newly credited.
    ///
    /// # Errors
    /// Only a feed fetch failure is an error (the whole tick is retried on
    /// the next interval); per-event problems are logged and skipped.
    pub async fn scan(&self) -> Result<usize> {
        let events = self
            .feed
            .recent_events(&self.wallet_address, self.scan_limit)
            .await?;

        let mut credited = 0;
        for event in events {
            if self.process_event(&event).await {
                credited += 1;
            }
        }
        if credited > 0 {
            info!(currency = %self.currency, credited, "deposit scan credited transfers");
        }
        Ok(credited)
    }

    /// Process one feed event; true if a credit happened.
    async fn process_event(&self, event: &TransferEvent) -> bool {
        // One transfer per event: an event groups the actions of a single
        // chain trace, so crediting more than one would double-count.
        for action in &event.actions {
            let Some((amount_raw, sender, recipient, comment)) = self.incoming_transfer(action)
            else {
                continue;
            };
            if !TonAddress::same_account(recipient, &self.wallet_address) {
                continue; // outgoing or unrelated transfer in our feed
            }

            let key = self.event_key(event, sender, amount_raw);
            if self.records.contains(&key) {
                return false;
            }

            let Some(user) = self.attribute(sender, comment) else {
                debug!(currency = %self.currency, sender = %truncate(sender, 24),
                       "skip deposit: unattributed transfer");
                return false;
            };

            let amount = self.currency.amount_from_chain_units(amount_raw);
            return self.credit_once(key, user, amount, event).await;
        }
        false
    }

    /// Extract the action this scanner's asset cares about.
    fn incoming_transfer<'a>(
        &self,
        action: &'a TransferAction,
    ) -> Option<(u64, &'a str, &'a str, Option<&'a str>)> {
        match (&self.attribution, action) {
            (
                Attribution::Memo,
                TransferAction::TokenTransfer {
                    amount_raw,
                    sender,
                    recipient,
                    comment,
                },
            ) => Some((*amount_raw, sender, recipient, comment.as_deref())),
            (
                Attribution::Sender(_),
                TransferAction::NativeTransfer {
                    amount_raw,
                    sender,
                    recipient,
                },
            ) => Some((*amount_raw, sender, recipient, None)),
            _ => None,
        }
    }

    /// Idempotency key: the feed's native id when present, else a digest of
    /// (sender, amount).
    fn event_key(&self, event: &TransferEvent, sender: &str, amount_raw: u64) -> EventKey {
        match event.primary_hash() {
            Some(native_id) => EventKey::from_native(self.key_prefix, native_id),
            None => EventKey::synthetic(self.key_prefix, sender, amount_raw),
        }
    }

    fn attribute(&self, sender: &str, comment: Option<&str>) -> Option<UserId> {
        match &self.attribution {
            Attribution::Memo => UserId::from_memo(comment?),
            Attribution::Sender(wallets) => wallets.find_user_by_sender(sender),
        }
    }

    /// Claim the key and credit the ledger. The record insert comes first:
    /// a key that is claimed but never credited only costs one deposit a
    /// manual fix, whereas the reverse order would double-credit on re-poll.
    async fn credit_once(
        &self,
        key: EventKey,
        user: UserId,
        amount: Decimal,
        event: &TransferEvent,
    ) -> bool {
        let mut record = TxRecord::deposit(key.clone(), user, self.currency, amount);
        record.tx_hash = event.primary_hash().map(str::to_string);
        match self.records.insert(record) {
            Ok(()) => {}
            Err(SlotpayError::EventAlreadyProcessed(_)) => return false,
            Err(e) => {
                warn!(error = %e, %key, "deposit record insert failed");
                return false;
            }
        }
        self.ledger.credit(user, self.currency, amount);
        info!(%user, currency = %self.currency, %amount, %key, "deposit credited");

        // Best-effort: a notification failure must not undo the credit.
        self.notifier
            .send(
                user,
                &UserEvent::DepositCredited {
                    currency: self.currency,
                    amount,
                },
            )
            .await;
        true
    }
}

fn truncate(text: &str, max: usize) -> &str {
    &text[..text.len().min(max)]
}
