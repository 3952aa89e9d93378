//! Channel post side-channel: publishing and reading back ad posts.
//!
//! Reading a channel's history directly needs elevated access the service
//! does not have. Instead the verifier forwards the post into a private
//! verification chat, reads the forwarded copy's text, and deletes the
//! forward. A post that cannot be forwarded no longer exists in the channel.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use slotpay_types::{
    ChannelId, MessageLocation, PostContent, PublishedPost, Result, SlotpayError,
};
use tracing::{debug, warn};

/// Read back the live content of a published message.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// `Ok(None)` means the message no longer exists at the location.
    /// A transport failure is an error, so the caller can retry next tick
    /// instead of concluding tampering.
    async fn fetch_message(&self, location: MessageLocation) -> Result<Option<String>>;
}

/// Publish an ad post into a channel.
#[async_trait]
pub trait ContentPublisher: Send + Sync {
    async fn publish(&self, channel: ChannelId, content: &PostContent) -> Result<PublishedPost>;
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ForwardedMessage {
    message_id: i64,
    text: Option<String>,
    caption: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
    chat: SentChat,
}

#[derive(Debug, Deserialize)]
struct SentChat {
    username: Option<String>,
}

/// [`ContentSource`] + [`ContentPublisher`] over the platform bot API.
pub struct BotApiContent {
    http: reqwest::Client,
    bot_token: String,
    /// Private chat forwards land in during verification.
    verification_chat: Option<i64>,
}

impl BotApiContent {
    #[must_use]
    pub fn new(bot_token: impl Into<String>, verification_chat: Option<i64>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            bot_token: bot_token.into(),
            verification_chat,
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{method}", self.bot_token)
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        payload: &serde_json::Value,
    ) -> Result<ApiResponse<T>> {
        let response = self
            .http
            .post(self.method_url(method))
            .json(payload)
            .send()
            .await
            .map_err(|e| SlotpayError::ContentUnavailable {
                reason: format!("{method}: {e}"),
            })?;
        response
            .json()
            .await
            .map_err(|e| SlotpayError::ContentUnavailable {
                reason: format!("{method} decode: {e}"),
            })
    }
}

#[async_trait]
impl ContentSource for BotApiContent {
    async fn fetch_message(&self, location: MessageLocation) -> Result<Option<String>> {
        let verification_chat =
            self.verification_chat
                .ok_or_else(|| SlotpayError::ContentUnavailable {
                    reason: "verification chat not configured".into(),
                })?;

        let forwarded: ApiResponse<ForwardedMessage> = self
            .call(
                "forwardMessage",
                &json!({
                    "chat_id": verification_chat,
                    "from_chat_id": location.chat_id,
                    "message_id": location.message_id,
                }),
            )
            .await?;

        let Some(message) = forwarded.result.filter(|_| forwarded.ok) else {
            // The platform refuses to forward deleted messages — this is the
            // "post is gone" signal, not a transport fault.
            debug!(%location, reason = forwarded.description.as_deref().unwrap_or("unknown"),
                   "forward failed, message likely deleted");
            return Ok(None);
        };

        let text = message.text.or(message.caption).unwrap_or_default();

        // Clean up the forwarded copy; a leftover forward is harmless.
        let cleanup: Result<ApiResponse<bool>> = self
            .call(
                "deleteMessage",
                &json!({
                    "chat_id": verification_chat,
                    "message_id": message.message_id,
                }),
            )
            .await;
        if let Err(e) = cleanup {
            warn!(error = %e, "failed to delete verification forward");
        }

        Ok(Some(text))
    }
}

#[async_trait]
impl ContentPublisher for BotApiContent {
    async fn publish(&self, channel: ChannelId, content: &PostContent) -> Result<PublishedPost> {
        let text = content.full_text();
        let mut payload = if let Some(media_id) = &content.media_id {
            json!({
                "chat_id": channel.0,
                "photo": media_id,
                "caption": text,
                "parse_mode": "HTML",
            })
        } else {
            json!({
                "chat_id": channel.0,
                "text": text,
                "parse_mode": "HTML",
            })
        };
        if let Some(button) = &content.button {
            payload["reply_markup"] = json!({
                "inline_keyboard": [[{"text": button.label, "url": button.url}]]
            });
        }
        let method = if content.has_media() {
            "sendPhoto"
        } else {
            "sendMessage"
        };

        let sent: ApiResponse<SentMessage> = self
            .call(method, &payload)
            .await
            .map_err(|e| SlotpayError::PublishFailed {
                reason: e.to_string(),
            })?;
        let Some(message) = sent.result.filter(|_| sent.ok) else {
            return Err(SlotpayError::PublishFailed {
                reason: sent
                    .description
                    .unwrap_or_else(|| "platform rejected the post".into()),
            });
        };

        let link = message
            .chat
            .username
            .map(|username| format!("https://t.me/{username}/{}", message.message_id));
        Ok(PublishedPost {
            location: MessageLocation {
                chat_id: channel.0,
                message_id: message.message_id,
            },
            link,
        })
    }
}
