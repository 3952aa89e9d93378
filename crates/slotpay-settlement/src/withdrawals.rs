//! Withdrawal settlement.
//!
//! Drains queued withdrawal requests in FIFO order, a bounded batch per
//! tick. The user's balance was already debited (amount + fee) at request
//! time, so the settler's job is to make the chain state match the ledger —
//! or reverse the debit when it provably cannot.
//!
//! Per request: submit through the custodial wallet (one deploy-and-retry
//! if the on-chain account is uninitialized), locate the resulting
//! transaction hash by polling the account event feed (the chain returns no
//! synchronous hash), then query finality with bounded retries.
//!
//! Outcome rules:
//! - send failed or finality explicitly reports failure → `Failed`, debit
//!   reversed, user notified;
//! - finality confirmed, **or unknown after retries** → `Completed`. Once
//!   the wallet has broadcast the transfer, reversing the debit without
//!   proof of failure risks a service-side double-spend, so unknown is
//!   deliberately treated as sent. A false `Completed` is possible if the
//!   chain rejects the transfer after the retry window.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use slotpay_chain::{ChainClient, EventFeed, NotificationSink, TonAddress};
use slotpay_ledger::BalanceLedger;
use slotpay_types::{
    constants, Currency, Result, SubmitOutcome, TransferAction, TransferRequest, TxFinality,
    TxRecord, TxStatus, UserEvent,
};
use tracing::{debug, error, info, warn};

use crate::records::TxRecordStore;

/// Events fetched per hash-lookup poll.
const HASH_LOOKUP_EVENTS: usize = 30;

/// Retry counts and delays for the post-send polling phases.
#[derive(Debug, Clone, Copy)]
pub struct RetryPacing {
    pub hash_attempts: u32,
    pub hash_delay: Duration,
    pub finality_attempts: u32,
    pub finality_delay: Duration,
    /// Wait after a wallet deploy before the single retry.
    pub deploy_delay: Duration,
}

impl RetryPacing {
    /// Zero delays, for tests.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            hash_attempts: constants::TX_HASH_POLL_ATTEMPTS,
            hash_delay: Duration::ZERO,
            finality_attempts: constants::FINALITY_POLL_ATTEMPTS,
            finality_delay: Duration::ZERO,
            deploy_delay: Duration::ZERO,
        }
    }
}

impl Default for RetryPacing {
    fn default() -> Self {
        Self {
            hash_attempts: constants::TX_HASH_POLL_ATTEMPTS,
            hash_delay: Duration::from_secs(constants::TX_HASH_POLL_DELAY_SECS),
            finality_attempts: constants::FINALITY_POLL_ATTEMPTS,
            finality_delay: Duration::from_secs(constants::FINALITY_POLL_DELAY_SECS),
            deploy_delay: Duration::from_secs(15),
        }
    }
}

/// One settler instance per withdrawable asset.
pub struct WithdrawalSettler {
    records: Arc<TxRecordStore>,
    ledger: Arc<BalanceLedger>,
    client: Arc<dyn ChainClient>,
    feed: Arc<dyn EventFeed>,
    notifier: Arc<dyn NotificationSink>,
    currency: Currency,
    /// Custodial hot-wallet address, polled to locate outbound transfers.
    custodial_wallet: String,
    batch_size: usize,
    pacing: RetryPacing,
}

impl WithdrawalSettler {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        records: Arc<TxRecordStore>,
        ledger: Arc<BalanceLedger>,
        client: Arc<dyn ChainClient>,
        feed: Arc<dyn EventFeed>,
        notifier: Arc<dyn NotificationSink>,
        currency: Currency,
        custodial_wallet: impl Into<String>,
        batch_size: usize,
        pacing: RetryPacing,
    ) -> Self {
        Self {
            records,
            ledger,
            client,
            feed,
            notifier,
            currency,
            custodial_wallet: custodial_wallet.into(),
            batch_size,
            pacing,
        }
    }

    /// One settle tick. Returns the number of withdrawals completed.
    pub async fn settle_pending(&self) -> usize {
        let batch = self
            .records
            .pending_withdrawals(self.currency, self.batch_size);
        let mut completed = 0;
        for record in batch {
            match self.settle_one(&record).await {
                Ok(true) => completed += 1,
                Ok(false) => {}
                Err(e) => {
                    // Leave the record pending; next tick retries it.
                    warn!(key = %record.key, error = %e, "withdrawal deferred to next tick");
                }
            }
        }
        completed
    }

    /// Settle one request. `Ok(true)` = completed, `Ok(false)` = failed and
    /// refunded, `Err` = deferred.
    async fn settle_one(&self, record: &TxRecord) -> Result<bool> {
        let Some(destination) = record.destination.clone() else {
            // Defect: a withdrawal record without a destination.
            error!(key = %record.key, "withdrawal record missing destination");
            self.fail_and_refund(record, "invalid destination address").await;
            return Ok(false);
        };

        // Defensive re-validation; funds were debited at request time.
        let balance = self.ledger.balance(record.user, self.currency);
        if balance.available < Decimal::ZERO {
            error!(key = %record.key, user = %record.user,
                   "negative balance at settle time, failing withdrawal");
            self.fail_and_refund(record, "account state inconsistent").await;
            return Ok(false);
        }

        let request = TransferRequest {
            currency: self.currency,
            destination: destination.clone(),
            amount: record.amount,
            memo: record.memo.clone(),
        };

        let outcome = match self.submit_with_deploy(&request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                // The submission never reached the wallet; safe to refund.
                warn!(key = %record.key, error = %e, "withdrawal send failed, refunding");
                self.fail_and_refund(record, "transfer could not be sent").await;
                return Ok(false);
            }
        };
        let token_wallet = match outcome {
            SubmitOutcome::Accepted { token_wallet } => token_wallet,
            SubmitOutcome::Rejected { reason } => {
                warn!(key = %record.key, reason = %reason, "wallet rejected withdrawal, refunding");
                self.fail_and_refund(record, "the wallet rejected the transfer").await;
                return Ok(false);
            }
            SubmitOutcome::WalletUninitialized => {
                // Deploy already retried once inside submit_with_deploy.
                warn!(key = %record.key, "wallet still uninitialized after deploy, refunding");
                self.fail_and_refund(record, "custodial wallet unavailable").await;
                return Ok(false);
            }
        };

        // The transfer left the custodial wallet. From here on, only an
        // explicit on-chain failure may reverse the debit.
        let tx_hash = self
            .locate_tx_hash(&destination, record, token_wallet.as_deref())
            .await;

        let finality = match &tx_hash {
            Some(hash) => self.poll_finality(hash).await,
            None => TxFinality::Unknown,
        };

        if finality == TxFinality::Rejected {
            warn!(key = %record.key, hash = ?tx_hash, "withdrawal failed on-chain, refunding");
            self.records
                .resolve(&record.key, TxStatus::Failed, tx_hash)?;
            self.ledger
                .reverse_withdrawal(record.user, self.currency, record.gross());
            self.notifier
                .send(
                    record.user,
                    &UserEvent::WithdrawalFailed {
                        currency: self.currency,
                        amount: record.gross(),
                        destination,
                        reason: "the transaction failed on-chain".into(),
                    },
                )
                .await;
            return Ok(false);
        }

        if finality == TxFinality::Unknown {
            warn!(key = %record.key, "finality unknown after retries, assuming sent");
        }
        let resolved = self
            .records
            .resolve(&record.key, TxStatus::Completed, tx_hash)?;
        info!(key = %record.key, user = %record.user, amount = %record.amount,
              currency = %self.currency, hash = ?resolved.tx_hash, "withdrawal completed");
        self.notifier
            .send(
                record.user,
                &UserEvent::WithdrawalCompleted {
                    currency: self.currency,
                    amount: record.gross(),
                    destination,
                    tx_hash: resolved.tx_hash,
                },
            )
            .await;
        Ok(true)
    }

    /// Submit; on an uninitialized custodial account, deploy and retry once.
    async fn submit_with_deploy(&self, request: &TransferRequest) -> Result<SubmitOutcome> {
        match self.client.submit_transfer(request).await? {
            SubmitOutcome::WalletUninitialized => {
                info!("custodial wallet uninitialized, deploying");
                self.client.deploy_wallet().await?;
                tokio::time::sleep(self.pacing.deploy_delay).await;
                self.client.submit_transfer(request).await
            }
            outcome => Ok(outcome),
        }
    }

    /// Poll the custodial accounts' feeds for an outbound transfer matching
    /// (destination, amount). Bounded attempts with a fixed delay.
    async fn locate_tx_hash(
        &self,
        destination: &str,
        record: &TxRecord,
        token_wallet: Option<&str>,
    ) -> Option<String> {
        let amount_raw = self.currency.amount_to_chain_units(record.amount);
        let mut accounts = vec![self.custodial_wallet.as_str()];
        accounts.extend(token_wallet);

        for attempt in 0..self.pacing.hash_attempts {
            tokio::time::sleep(self.pacing.hash_delay).await;
            for account in &accounts {
                let events = match self.feed.recent_events(account, HASH_LOOKUP_EVENTS).await {
                    Ok(events) => events,
                    Err(e) => {
                        debug!(attempt, error = %e, "hash lookup fetch failed");
                        continue;
                    }
                };
                if let Some(hash) = find_matching_transfer(&events, destination, amount_raw) {
                    return Some(hash);
                }
            }
        }
        info!(key = %record.key, "transaction hash not found after bounded lookup");
        None
    }

    /// Query finality with bounded retries; the first definite answer wins.
    async fn poll_finality(&self, hash: &str) -> TxFinality {
        for attempt in 0..self.pacing.finality_attempts {
            let status = self.client.transaction_status(hash).await;
            if status != TxFinality::Unknown {
                return status;
            }
            debug!(attempt, hash = %&hash[..hash.len().min(16)], "finality still unknown");
            tokio::time::sleep(self.pacing.finality_delay).await;
        }
        TxFinality::Unknown
    }

    /// Mark the record failed, reverse the debit, notify the user.
    async fn fail_and_refund(&self, record: &TxRecord, reason: &str) {
        if let Err(e) = self.records.resolve(&record.key, TxStatus::Failed, None) {
            error!(key = %record.key, error = %e, "failed to mark withdrawal failed");
            return; // do not refund if the record could not be resolved
        }
        self.ledger
            .reverse_withdrawal(record.user, self.currency, record.gross());
        self.notifier
            .send(
                record.user,
                &UserEvent::WithdrawalFailed {
                    currency: self.currency,
                    amount: record.gross(),
                    destination: record.destination.clone().unwrap_or_default(),
                    reason: format!("{reason}; the funds were returned to your balance"),
                },
            )
            .await;
    }
}

/// Find an outbound transfer to `destination` of exactly `amount_raw` and
/// return its chain hash.
fn find_matching_transfer(
    events: &[slotpay_types::TransferEvent],
    destination: &str,
    amount_raw: u64,
) -> Option<String> {
    for event in events {
        for action in &event.actions {
            let (recipient, raw) = match action {
                TransferAction::NativeTransfer {
                    amount_raw,
                    recipient,
                    ..
                }
                | TransferAction::TokenTransfer {
                    amount_raw,
                    recipient,
                    ..
                } => (recipient, *amount_raw),
                TransferAction::Unsupported { .. } => continue,
            };
            if raw == amount_raw && TonAddress::same_account(recipient, destination) {
                return event.primary_hash().map(str::to_string);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotpay_types::TransferEvent;

    fn destination() -> TonAddress {
        TonAddress {
            workchain: 0,
            hash: [3; 32],
        }
    }

    fn event(recipient: &str, amount_raw: u64, hash: &str) -> TransferEvent {
        TransferEvent {
            event_id: Some(format!("ev_{hash}")),
            base_transactions: vec![hash.to_string()],
            actions: vec![TransferAction::NativeTransfer {
                amount_raw,
                sender: "0:aa".into(),
                recipient: recipient.to_string(),
            }],
        }
    }

    #[test]
    fn matching_transfer_found_across_encodings() {
        let dest = destination();
        // Feed reports the raw form; the request stored the friendly form.
        let events = vec![
            event("0:9999", 5, "other"),
            event(&dest.to_string(), 5_000_000_000, "txwanted"),
        ];
        let hash = find_matching_transfer(&events, &dest.to_friendly(), 5_000_000_000);
        assert_eq!(hash.as_deref(), Some("txwanted"));
    }

    #[test]
    fn amount_mismatch_is_not_a_match() {
        let dest = destination();
        let events = vec![event(&dest.to_string(), 1_000, "tx1")];
        assert_eq!(find_matching_transfer(&events, &dest.to_friendly(), 999), None);
    }
}
