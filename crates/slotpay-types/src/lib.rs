//! # slotpay-types
//!
//! Shared types, errors, and configuration for the **SlotPay** escrow and
//! settlement engine.
//!
//! This crate is the leaf dependency of the workspace — every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`UserId`], [`OrderId`], [`ChannelId`], [`FormatId`], [`PostToken`], [`EventKey`]
//! - **Currency model**: [`Currency`] and chain-unit conversion
//! - **Balance model**: [`Balance`]
//! - **Order model**: [`Order`], [`OrderStatus`], [`PostContent`], [`PublishedPost`]
//! - **External transaction records**: [`TxRecord`], [`TxDirection`], [`TxStatus`]
//! - **Linked wallets**: [`LinkedWallet`]
//! - **Chain boundary models**: [`TransferEvent`], [`TransferAction`], [`TransferRequest`], [`SubmitOutcome`], [`TxFinality`], [`UserEvent`]
//! - **Configuration**: [`EngineConfig`] and per-component sections
//! - **Errors**: [`SlotpayError`] with `SP_ERR_` prefix codes
//! - **Constants**: system-wide limits and defaults

pub mod balance;
pub mod config;
pub mod constants;
pub mod currency;
pub mod error;
pub mod event;
pub mod ids;
pub mod order;
pub mod record;
pub mod wallet;

// Re-export all primary types at crate root for ergonomic imports:
//   use slotpay_types::{Order, Currency, Balance, TxRecord, ...};

pub use balance::*;
pub use config::*;
pub use currency::*;
pub use error::*;
pub use event::*;
pub use ids::*;
pub use order::*;
pub use record::*;
pub use wallet::*;

// Constants are accessed via `slotpay_types::constants::FOO`
// (not re-exported to avoid name collisions).
