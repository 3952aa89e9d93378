//! The user notification sink.
//!
//! Notifications are best-effort and fire-and-forget: a delivery failure is
//! logged and swallowed. A failed notification must never roll back the
//! ledger effect it reports.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use slotpay_types::{NotifyConfig, UserEvent, UserId};
use tracing::{debug, warn};

/// Best-effort push of an event to a user.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, user: UserId, event: &UserEvent);
}

/// Sink that drops everything (tests, notifications disabled).
pub struct NullNotifier;

#[async_trait]
impl NotificationSink for NullNotifier {
    async fn send(&self, user: UserId, event: &UserEvent) {
        debug!(%user, kind = event.kind(), "notification dropped (sink disabled)");
    }
}

/// [`NotificationSink`] backed by the platform bot API.
///
/// Messages are HTML-formatted; completed withdrawals carry an inline
/// block-explorer button.
pub struct TelegramNotifier {
    http: reqwest::Client,
    bot_token: String,
    explorer_base: String,
}

impl TelegramNotifier {
    #[must_use]
    pub fn new(config: &NotifyConfig, explorer_base: impl Into<String>) -> Option<Self> {
        let bot_token = config.bot_token.as_deref()?.trim().to_string();
        if bot_token.is_empty() {
            return None;
        }
        let explorer_base: String = explorer_base.into();
        Some(Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            bot_token,
            explorer_base: explorer_base.trim_end_matches('/').to_string(),
        })
    }

    /// Render an event to HTML plus an optional explorer link.
    fn render(&self, event: &UserEvent) -> (String, Option<String>) {
        match event {
            UserEvent::DepositCredited { currency, amount } => (
                format!(
                    "<b>+{} {currency} credited to your balance.</b>",
                    currency.format_amount(*amount)
                ),
                None,
            ),
            UserEvent::WithdrawalCompleted {
                currency,
                amount,
                destination,
                tx_hash,
            } => {
                let track_url = tx_hash
                    .as_deref()
                    .filter(|hash| hash.len() >= 10)
                    .map(|hash| {
                        format!(
                            "{}/tx/{}",
                            self.explorer_base,
                            crate::tonapi::encode_path_segment(hash)
                        )
                    });
                let text = format!(
                    "<b>Withdrawal of -{} {currency} completed</b>\n\n\
                     <b>Destination:</b>\n<pre>{}</pre>\n\
                     <b>Transaction:</b>\n<pre>{}</pre>",
                    currency.format_amount(*amount),
                    truncate(destination, 64),
                    tx_hash.as_deref().unwrap_or("—"),
                );
                (text, track_url)
            }
            UserEvent::WithdrawalFailed {
                currency,
                amount,
                destination,
                reason,
            } => (
                format!(
                    "<b>⚠️ Withdrawal of -{} {currency} cancelled</b>\n\n\
                     <b>Reason:</b> {reason}\n\
                     <b>Destination:</b> <pre>{}</pre>\n\n\
                     The funds were returned to your balance.",
                    currency.format_amount(*amount),
                    truncate(destination, 48),
                ),
                None,
            ),
            UserEvent::PostTampered { order, kind } => {
                let what = match kind {
                    slotpay_types::TamperKind::Deleted => "deleted",
                    slotpay_types::TamperKind::Edited => "edited",
                };
                (
                    format!(
                        "<b>⚠️ Ad post was {what}</b>\n\n\
                         The published post was {what} before its paid duration \
                         elapsed.\n<blockquote>Deal {order} is not confirmed.</blockquote>"
                    ),
                    None,
                )
            }
        }
    }
}

#[async_trait]
impl NotificationSink for TelegramNotifier {
    async fn send(&self, user: UserId, event: &UserEvent) {
        let (text, track_url) = self.render(event);
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        let mut payload = json!({
            "chat_id": user.0,
            "text": text,
            "parse_mode": "HTML",
        });
        if let Some(track) = track_url {
            payload["reply_markup"] = json!({
                "inline_keyboard": [[{"text": "Track", "url": track}]]
            });
        }

        match self.http.post(&url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(%user, kind = event.kind(), "notification sent");
            }
            Ok(response) => {
                warn!(%user, kind = event.kind(), status = %response.status(),
                      "notification API returned error");
            }
            Err(e) => {
                warn!(%user, kind = event.kind(), error = %e, "notification send failed");
            }
        }
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() > max {
        format!("{}...", &text[..max])
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use slotpay_types::Currency;

    fn notifier() -> TelegramNotifier {
        TelegramNotifier::new(
            &NotifyConfig {
                bot_token: Some("123:abc".into()),
            },
            "https://tonscan.org",
        )
        .unwrap()
    }

    #[test]
    fn disabled_without_token() {
        assert!(TelegramNotifier::new(&NotifyConfig::default(), "x").is_none());
        assert!(TelegramNotifier::new(
            &NotifyConfig {
                bot_token: Some("  ".into())
            },
            "x"
        )
        .is_none());
    }

    #[test]
    fn deposit_render_trims_amount() {
        let (text, track) = notifier().render(&UserEvent::DepositCredited {
            currency: Currency::Usdt,
            amount: Decimal::new(10_500_000, 6),
        });
        assert!(text.contains("+10.5 USDT"));
        assert!(track.is_none());
    }

    #[test]
    fn completed_withdrawal_links_explorer() {
        let (text, track) = notifier().render(&UserEvent::WithdrawalCompleted {
            currency: Currency::Ton,
            amount: Decimal::new(515, 2),
            destination: "EQdestination".into(),
            tx_hash: Some("hash/with+special".into()),
        });
        assert!(text.contains("5.15 TON"));
        let track = track.unwrap();
        assert!(track.starts_with("https://tonscan.org/tx/"));
        assert!(!track.contains('+'), "hash must be percent-encoded");
    }

    #[test]
    fn short_hash_gets_no_link() {
        let (_, track) = notifier().render(&UserEvent::WithdrawalCompleted {
            currency: Currency::Ton,
            amount: Decimal::ONE,
            destination: "EQdest".into(),
            tx_hash: Some("short".into()),
        });
        assert!(track.is_none());
    }

    #[test]
    fn failure_render_mentions_refund() {
        let (text, _) = notifier().render(&UserEvent::WithdrawalFailed {
            currency: Currency::Usdt,
            amount: Decimal::new(103, 1),
            destination: "EQdestination".into(),
            reason: "transaction failed on-chain".into(),
        });
        assert!(text.contains("10.3 USDT"));
        assert!(text.contains("returned to your balance"));
    }
}
