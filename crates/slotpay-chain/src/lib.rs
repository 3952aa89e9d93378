//! # slotpay-chain
//!
//! **Chain Plane**: every external collaborator the settlement engine talks
//! to, as object-safe async traits plus their production implementations.
//!
//! ## Collaborators
//!
//! 1. **EventFeed** — read-only poll of an account's recent chain activity
//!    ([`TonApiFeed`]). May return duplicates across polls; callers must
//!    deduplicate via event keys.
//! 2. **ChainClient** — outbound transfers through the custodial
//!    wallet-signer service and finality checks through the indexer
//!    ([`HttpWalletClient`]).
//! 3. **NotificationSink** — best-effort, fire-and-forget user push
//!    ([`TelegramNotifier`], [`NullNotifier`]).
//! 4. **ContentSource** / **ContentPublisher** — read back and publish
//!    channel posts through the bot API side-channel ([`BotApiContent`]).
//!
//! Address handling is canonical: [`TonAddress`] compares accounts by
//! workchain + hash, never by encoded text.
//!
//! Every network call carries a bounded timeout; none of these types holds
//! ledger locks.

pub mod address;
pub mod client;
pub mod content;
pub mod feed;
pub mod notify;
mod tonapi;

pub use address::TonAddress;
pub use client::{ChainClient, HttpWalletClient};
pub use content::{BotApiContent, ContentPublisher, ContentSource};
pub use feed::{EventFeed, TonApiFeed};
pub use notify::{NotificationSink, NullNotifier, TelegramNotifier};
