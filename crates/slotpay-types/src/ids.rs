//! Identifiers used throughout SlotPay.
//!
//! Platform-assigned identities (users, channels) are numeric, matching the
//! messaging platform's account ids. Internal entities use UUIDv7 for
//! time-ordered lexicographic sorting. [`EventKey`] is the idempotency key
//! derived from external chain events.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// UserId
// ---------------------------------------------------------------------------

/// Numeric account id of a marketplace user on the messaging platform.
///
/// This is also the value carried in deposit memos, so it must round-trip
/// through a plain decimal string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl UserId {
    /// Parse a deposit memo into a user id. Only plain base-10 digits are
    /// accepted; anything else is an unattributed transfer.
    #[must_use]
    pub fn from_memo(memo: &str) -> Option<Self> {
        let trimmed = memo.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        trimmed.parse::<i64>().ok().map(Self)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ChannelId
// ---------------------------------------------------------------------------

/// Platform id of a channel listed on the marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ChannelId(pub i64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// OrderId
// ---------------------------------------------------------------------------

/// Globally unique order identifier. Uses UUIDv7 for time-ordered sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct OrderId(pub Uuid);

impl OrderId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// FormatId
// ---------------------------------------------------------------------------

/// Identifier of an ad format (placement + paid display duration) offered by
/// a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct FormatId(pub Uuid);

impl FormatId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for FormatId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FormatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "format:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// PostToken
// ---------------------------------------------------------------------------

/// Opaque capability token identifying an order in external deep-links.
///
/// Deep-links carry this token instead of the order id so order volume
/// cannot be enumerated from the outside.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PostToken(pub String);

impl PostToken {
    /// Mint a fresh token (hex, [`crate::constants::POST_TOKEN_LEN`] chars).
    #[must_use]
    pub fn generate() -> Self {
        let hex = Uuid::new_v4().simple().to_string();
        Self(hex[..crate::constants::POST_TOKEN_LEN].to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PostToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// EventKey
// ---------------------------------------------------------------------------

/// Globally unique key for one external chain event.
///
/// This is the sole idempotency guard against re-processing the same event
/// on re-poll: the record store rejects a second insert of the same key.
/// Keys are prefixed per asset because upstream event ids can collide across
/// accounts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct EventKey(pub String);

impl EventKey {
    /// Key from a native event/transaction id the chain indexer reported.
    #[must_use]
    pub fn from_native(prefix: &str, native_id: &str) -> Self {
        Self(format!("{prefix}{native_id}"))
    }

    /// Synthetic fallback key for feeds whose native ids are absent or
    /// unstable: a digest of (sender, raw amount).
    #[must_use]
    pub fn synthetic(prefix: &str, sender: &str, amount_raw: u64) -> Self {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(sender.trim().to_ascii_lowercase().as_bytes());
        hasher.update(amount_raw.to_le_bytes());
        let digest = hasher.finalize();
        Self(format!("{prefix}{}", hex::encode(&digest[..16])))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
