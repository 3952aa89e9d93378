//! # slotpay-ledger
//!
//! **Escrow Plane**: the balance ledger and the order escrow state machine.
//!
//! ## Architecture
//!
//! The Escrow Plane is the only place balance rows are mutated:
//! 1. **BalanceLedger**: per-(user, currency) available/frozen rows with
//!    atomic mutation primitives under per-row exclusive locks
//! 2. **OrderEscrow**: the order lifecycle, driving freeze/release/refund
//! 3. **ConservationTracker**: Σ(available + frozen) = deposits − withdrawals
//!    auditor, embedded in the ledger
//!
//! ## Money Flow
//!
//! ```text
//! create order  → BalanceLedger.freeze()               (available → frozen)
//! seller approve → publish → BalanceLedger.release()   (buyer frozen → seller available)
//! cancel/decline → BalanceLedger.refund()              (frozen → available)
//! chain deposit  → BalanceLedger.credit()              (external → available)
//! withdraw req   → BalanceLedger.debit_for_withdrawal() (available → external)
//! ```
//!
//! No other component may mutate a balance row. Every primitive either fully
//! applies or leaves the row untouched, and none of them performs I/O while
//! holding a row lock.

pub mod balances;
pub mod conservation;
pub mod escrow;

pub use balances::BalanceLedger;
pub use conservation::ConservationTracker;
pub use escrow::{NewOrder, OrderEscrow};
