//! The linked-wallet registry.
//!
//! Maps users to their connected external wallets for sender-attributed
//! deposits and as the default withdrawal destination. Matching is by
//! canonical account ([`TonAddress`]), never by encoded text.

use std::sync::{Mutex, MutexGuard, PoisonError};

use slotpay_chain::TonAddress;
use slotpay_types::{LinkedWallet, Result, UserId};
use tracing::debug;

/// All linked wallets, with at most one active wallet per user.
pub struct WalletRegistry {
    wallets: Mutex<Vec<LinkedWallet>>,
}

impl WalletRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            wallets: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LinkedWallet>> {
        self.wallets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Link a wallet to a user, making it their active wallet and
    /// deactivating any previous one.
    ///
    /// # Errors
    /// Returns [`slotpay_types::SlotpayError::InvalidDestination`] when the
    /// address does not parse in any supported encoding.
    pub fn link(&self, user: UserId, address: &str) -> Result<LinkedWallet> {
        TonAddress::parse(address)?;
        let mut wallets = self.lock();
        for wallet in wallets.iter_mut().filter(|w| w.user == user) {
            wallet.active = false;
        }
        let wallet = LinkedWallet::new(user, address.trim());
        wallets.push(wallet.clone());
        debug!(%user, "wallet linked");
        Ok(wallet)
    }

    /// Deactivate all of a user's wallets.
    pub fn unlink(&self, user: UserId) {
        let mut wallets = self.lock();
        for wallet in wallets.iter_mut().filter(|w| w.user == user) {
            wallet.active = false;
        }
    }

    /// The user's active wallet, if any.
    #[must_use]
    pub fn active_wallet(&self, user: UserId) -> Option<LinkedWallet> {
        self.lock()
            .iter()
            .find(|wallet| wallet.user == user && wallet.active)
            .cloned()
    }

    /// Attribute a transfer's sender address to a user.
    ///
    /// Returns `None` when no active wallet matches, or when wallets of
    /// *different* users match (ambiguity is treated as no-match and the
    /// deposit is left for manual reconciliation).
    #[must_use]
    pub fn find_user_by_sender(&self, sender: &str) -> Option<UserId> {
        let Ok(sender_address) = TonAddress::parse(sender) else {
            return None;
        };
        let wallets = self.lock();
        let mut matched: Option<UserId> = None;
        for wallet in wallets.iter().filter(|w| w.active) {
            let Ok(address) = TonAddress::parse(&wallet.address) else {
                continue;
            };
            if address == sender_address {
                match matched {
                    None => matched = Some(wallet.user),
                    Some(user) if user == wallet.user => {}
                    Some(_) => return None,
                }
            }
        }
        matched
    }
}

impl Default for WalletRegistry {
    fn default() -> Self {
        Self::new()
    }
}
