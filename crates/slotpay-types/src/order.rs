//! Order types for the escrow state machine.
//!
//! An order is one ad purchase: buyer funds are frozen at creation and stay
//! frozen until the seller publishes the post (release to seller) or the
//! order is cancelled (refund to buyer).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{ChannelId, Currency, FormatId, OrderId, PostToken, UserId};

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Buyer is composing the ad post. Funds already frozen.
    WritingPost,
    /// Content submitted; waiting for the seller to approve and publish.
    PendingSeller,
    /// Published and paid out to the seller. Terminal.
    Done,
    /// Cancelled or declined; buyer refunded. Terminal.
    Cancelled,
}

impl OrderStatus {
    /// Terminal states admit no further transitions.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Cancelled)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WritingPost => write!(f, "writing_post"),
            Self::PendingSeller => write!(f, "pending_seller"),
            Self::Done => write!(f, "done"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// An inline link button attached to the ad post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostButton {
    pub label: String,
    pub url: String,
}

/// The ad post content collected from the buyer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostContent {
    /// Post body as HTML (platform-flavored subset).
    pub text_html: String,
    /// Platform file reference of the attached media, if any.
    pub media_id: Option<String>,
    /// Optional inline button appended below the post.
    pub button: Option<PostButton>,
}

impl PostContent {
    #[must_use]
    pub fn text_only(text_html: impl Into<String>) -> Self {
        Self {
            text_html: text_html.into(),
            media_id: None,
            button: None,
        }
    }

    #[must_use]
    pub fn has_media(&self) -> bool {
        self.media_id.is_some()
    }

    /// The full post body as published: the buyer's HTML plus the mandatory
    /// ad hashtag. Both the publisher and the delivery verifier build from
    /// this so the comparison is against what actually went out.
    #[must_use]
    pub fn full_text(&self) -> String {
        format!(
            "{}\n\n{}",
            self.text_html.trim(),
            crate::constants::AD_HASHTAG
        )
    }
}

/// Reference to one message inside a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageLocation {
    /// Platform chat id of the channel the post went to.
    pub chat_id: i64,
    /// Message id within that channel.
    pub message_id: i64,
}

impl std::fmt::Display for MessageLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.chat_id, self.message_id)
    }
}

/// Where and when the ad post was published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedPost {
    pub location: MessageLocation,
    /// Public link to the post, when the channel has a public handle.
    pub link: Option<String>,
}

/// One ad purchase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub buyer: UserId,
    pub seller: UserId,
    pub channel: ChannelId,
    pub format: FormatId,
    /// Escrowed currency. Exactly one (currency, amount) pair per order.
    pub currency: Currency,
    /// Escrowed amount, frozen on the buyer's balance while active.
    pub amount: Decimal,
    pub status: OrderStatus,
    /// Ad content; absent until the buyer first submits it.
    pub content: Option<PostContent>,
    /// Opaque capability token used in external deep-links.
    pub post_token: PostToken,
    /// Paid display duration the post must survive untouched.
    pub duration_hours: u32,
    pub created_at: DateTime<Utc>,
    /// Set when the seller approves and the post is published.
    pub done_at: Option<DateTime<Utc>>,
    pub published: Option<PublishedPost>,
    /// Set by the delivery verifier once the post survived its duration.
    pub verified_at: Option<DateTime<Utc>>,
    /// Set when verification found the post deleted or edited. Flagged
    /// orders are left unverified for manual follow-up and not re-checked.
    pub flagged_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Whether this order is in a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether the delivery verifier should still look at this order.
    #[must_use]
    pub fn awaits_verification(&self) -> bool {
        self.status == OrderStatus::Done
            && self.published.is_some()
            && self.done_at.is_some()
            && self.verified_at.is_none()
            && self.flagged_at.is_none()
    }
}
