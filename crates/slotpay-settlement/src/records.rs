//! The external transaction record store.
//!
//! One record per chain event (deposit) or withdrawal request, keyed by
//! [`EventKey`]. Inserting a key twice fails with
//! [`SlotpayError::EventAlreadyProcessed`] — that single check is what makes
//! deposit crediting idempotent across re-polls and restarts. Records are
//! never deleted; they double as the audit trail, so unlike a bounded
//! idempotency cache this store grows with transaction volume.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use slotpay_types::{Currency, EventKey, Result, SlotpayError, TxRecord, TxStatus};

struct Inner {
    records: HashMap<EventKey, TxRecord>,
    /// Insertion order, used for FIFO withdrawal settling.
    order: Vec<EventKey>,
}

/// Append-only store of [`TxRecord`]s with unique-key insertion.
pub struct TxRecordStore {
    inner: Mutex<Inner>,
}

impl TxRecordStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                records: HashMap::new(),
                order: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether an event key was already recorded.
    #[must_use]
    pub fn contains(&self, key: &EventKey) -> bool {
        self.lock().records.contains_key(key)
    }

    /// Insert a new record.
    ///
    /// # Errors
    /// Returns [`SlotpayError::EventAlreadyProcessed`] if the key exists;
    /// the store is unchanged.
    pub fn insert(&self, record: TxRecord) -> Result<()> {
        let mut inner = self.lock();
        if inner.records.contains_key(&record.key) {
            return Err(SlotpayError::EventAlreadyProcessed(record.key));
        }
        inner.order.push(record.key.clone());
        inner.records.insert(record.key.clone(), record);
        Ok(())
    }

    /// Snapshot of one record.
    #[must_use]
    pub fn get(&self, key: &EventKey) -> Option<TxRecord> {
        self.lock().records.get(key).cloned()
    }

    /// Pending withdrawals of one currency in FIFO order, at most `limit`.
    #[must_use]
    pub fn pending_withdrawals(&self, currency: Currency, limit: usize) -> Vec<TxRecord> {
        let inner = self.lock();
        inner
            .order
            .iter()
            .filter_map(|key| inner.records.get(key))
            .filter(|record| record.is_pending_withdrawal() && record.currency == currency)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Resolve a record to its terminal status, stamping `resolved_at` and
    /// the transaction hash if one was found.
    ///
    /// # Errors
    /// Returns [`SlotpayError::Internal`] if the key is unknown — resolving
    /// a record that was never inserted is a settler bug.
    pub fn resolve(
        &self,
        key: &EventKey,
        status: TxStatus,
        tx_hash: Option<String>,
    ) -> Result<TxRecord> {
        let mut inner = self.lock();
        let record = inner
            .records
            .get_mut(key)
            .ok_or_else(|| SlotpayError::Internal(format!("resolve of unknown record {key}")))?;
        record.status = status;
        record.resolved_at = Some(Utc::now());
        if tx_hash.is_some() {
            record.tx_hash = tx_hash;
        }
        Ok(record.clone())
    }

    /// Number of records stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }
}

impl Default for TxRecordStore {
    fn default() -> Self {
        Self::new()
    }
}
