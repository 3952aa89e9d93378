//! Configuration for the SlotPay engine.
//!
//! Every component receives its section by reference at construction time —
//! there is no process-global settings object. Defaults carry the documented
//! production values; the node binary overrides them from the environment.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{constants, Currency};

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub chain: ChainApiConfig,
    pub deposits: DepositConfig,
    pub withdrawals: WithdrawalConfig,
    pub verifier: VerifierConfig,
    pub notify: NotifyConfig,
}

/// Chain indexer and custodial-wallet endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainApiConfig {
    /// Chain indexer base URL.
    pub tonapi_base: String,
    /// Bearer token for the indexer, if any.
    pub api_key: Option<String>,
    /// Base URL of the custodial wallet-signer service. Withdrawals are
    /// disabled when absent.
    pub signer_base: Option<String>,
    /// Block-explorer base for user-facing transaction links.
    pub explorer_base: String,
}

impl Default for ChainApiConfig {
    fn default() -> Self {
        Self {
            tonapi_base: constants::DEFAULT_TONAPI_BASE.to_string(),
            api_key: None,
            signer_base: None,
            explorer_base: constants::DEFAULT_EXPLORER_BASE.to_string(),
        }
    }
}

/// Deposit reconciliation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositConfig {
    /// Custodial deposit address for token (memo-attributed) deposits.
    /// Token scanning is disabled when absent.
    pub token_wallet: Option<String>,
    /// Custodial deposit address for native (sender-attributed) deposits.
    /// Native scanning is disabled when absent.
    pub native_wallet: Option<String>,
    /// Events fetched per scan.
    pub scan_limit: usize,
    /// Scan interval in seconds.
    pub interval_secs: u64,
}

impl Default for DepositConfig {
    fn default() -> Self {
        Self {
            token_wallet: None,
            native_wallet: None,
            scan_limit: constants::DEFAULT_DEPOSIT_SCAN_LIMIT,
            interval_secs: constants::DEFAULT_DEPOSIT_INTERVAL_SECS,
        }
    }
}

/// Fee and minimum for one withdrawal currency.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WithdrawalPolicy {
    /// Flat fee burned per withdrawal (gross = amount + fee).
    pub fee: Decimal,
    /// Minimum net amount a user may withdraw.
    pub minimum: Decimal,
}

/// Withdrawal settlement settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalConfig {
    pub ton: WithdrawalPolicy,
    pub usdt: WithdrawalPolicy,
    /// Custodial hot-wallet address, polled to locate outbound transfers.
    /// Falls back to the deposit wallet when unset.
    pub hot_wallet: Option<String>,
    /// Requests processed per settler tick (bounds external-API load).
    pub batch_size: usize,
    /// Settle interval in seconds.
    pub interval_secs: u64,
}

impl WithdrawalConfig {
    /// Policy for a chain-withdrawable currency. Stars never leave the
    /// platform, so they have no policy.
    #[must_use]
    pub fn policy(&self, currency: Currency) -> Option<WithdrawalPolicy> {
        match currency {
            Currency::Ton => Some(self.ton),
            Currency::Usdt => Some(self.usdt),
            Currency::Stars => None,
        }
    }
}

impl Default for WithdrawalConfig {
    fn default() -> Self {
        Self {
            ton: WithdrawalPolicy {
                fee: Decimal::new(15, 2),    // 0.15 TON
                minimum: Decimal::new(1, 1), // 0.1 TON
            },
            usdt: WithdrawalPolicy {
                fee: Decimal::new(3, 1), // 0.3 USDT
                minimum: Decimal::ONE,   // 1 USDT
            },
            hot_wallet: None,
            batch_size: constants::DEFAULT_WITHDRAWAL_BATCH_SIZE,
            interval_secs: constants::DEFAULT_WITHDRAWAL_INTERVAL_SECS,
        }
    }
}

/// Delivery verification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Private chat the verifier forwards posts into to read them.
    /// Verification is disabled when absent.
    pub verification_chat: Option<i64>,
    /// Verification interval in seconds.
    pub interval_secs: u64,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            verification_chat: None,
            interval_secs: constants::DEFAULT_VERIFY_INTERVAL_SECS,
        }
    }
}

/// Notification sink settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Bot token for the platform push API. Notifications are dropped
    /// (logged only) when absent.
    pub bot_token: Option<String>,
}
