//! # slotpay-settlement
//!
//! **Settlement Plane**: everything that reconciles the internal ledger
//! against the outside world.
//!
//! ## Architecture
//!
//! 1. **TxRecordStore**: the external transaction log; its unique event keys
//!    are the idempotency guard for deposit crediting
//! 2. **DepositScanner**: polls the account event feed and credits each
//!    incoming transfer exactly once (memo- or sender-attributed)
//! 3. **WithdrawalSettler**: drains queued withdrawals FIFO — submit,
//!    locate hash, check finality, complete or refund
//! 4. **DeliveryVerifier**: re-fetches published ad posts after their paid
//!    duration and confirms non-tampering
//! 5. **EscrowApi**: the typed surface the route layer calls
//! 6. **Scheduler**: non-overlapping periodic ticks driving 2–4
//!
//! ## Money Safety
//!
//! Background jobs touch balances only through the ledger primitives; every
//! external event is keyed and processed at most once; per-item failures are
//! logged and never abort a batch.

pub mod api;
pub mod deposits;
pub mod records;
pub mod scheduler;
pub mod verifier;
pub mod wallets;
pub mod withdrawals;

pub use api::EscrowApi;
pub use deposits::DepositScanner;
pub use records::TxRecordStore;
pub use scheduler::Scheduler;
pub use verifier::DeliveryVerifier;
pub use wallets::WalletRegistry;
pub use withdrawals::{RetryPacing, WithdrawalSettler};
