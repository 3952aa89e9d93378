//! Serde models for the TonAPI indexer responses.
//!
//! The indexer's JSON is loosely shaped: amounts arrive as numbers or
//! strings, account references as objects or bare strings, and action
//! payloads nested under a type-named key. Everything is validated here at
//! the boundary; whatever fails validation becomes
//! [`TransferAction::Unsupported`] so one malformed entry can never poison
//! a batch.

use serde::Deserialize;
use slotpay_types::{TransferAction, TransferEvent};

#[derive(Debug, Deserialize)]
pub(crate) struct EventsResponse {
    #[serde(default)]
    pub events: Vec<RawEvent>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawEvent {
    pub event_id: Option<String>,
    #[serde(default)]
    pub base_transactions: Vec<String>,
    #[serde(default)]
    pub actions: Vec<RawAction>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawAction {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(rename = "TonTransfer", default, deserialize_with = "lenient")]
    pub ton_transfer: Option<RawNativeTransfer>,
    #[serde(rename = "JettonTransfer", default, deserialize_with = "lenient")]
    pub jetton_transfer: Option<RawTokenTransfer>,
}

/// Deserialize a payload if it has the expected shape, `None` otherwise.
/// A malformed action must degrade to `Unsupported`, never fail the whole
/// feed page.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).ok())
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawNativeTransfer {
    pub amount: Option<RawAmount>,
    pub sender: Option<RawAccount>,
    pub recipient: Option<RawAccount>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawTokenTransfer {
    pub amount: Option<RawAmount>,
    pub sender: Option<RawAccount>,
    pub recipient: Option<RawAccount>,
    pub comment: Option<String>,
}

/// Amounts come back as JSON numbers or decimal strings depending on the
/// action type.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawAmount {
    Number(u64),
    Text(String),
}

impl RawAmount {
    fn to_u64(&self) -> Option<u64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Text(text) => text.trim().parse().ok(),
        }
    }
}

/// Account references: `{"address": "0:..."}` or a bare string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawAccount {
    Object { address: Option<String> },
    Text(String),
}

impl RawAccount {
    fn address(&self) -> Option<&str> {
        let address = match self {
            Self::Object { address } => address.as_deref()?,
            Self::Text(text) => text,
        };
        let trimmed = address.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }
}

impl RawEvent {
    pub(crate) fn into_transfer_event(self) -> TransferEvent {
        TransferEvent {
            event_id: self.event_id,
            base_transactions: self.base_transactions,
            actions: self
                .actions
                .into_iter()
                .map(RawAction::into_transfer_action)
                .collect(),
        }
    }
}

impl RawAction {
    fn into_transfer_action(self) -> TransferAction {
        match self.kind.as_str() {
            "TonTransfer" | "ton_transfer" => {
                let Some(data) = self.ton_transfer else {
                    return unsupported("ton_transfer_without_payload");
                };
                let (Some(amount_raw), Some(sender), Some(recipient)) = (
                    data.amount.as_ref().and_then(RawAmount::to_u64),
                    data.sender.as_ref().and_then(RawAccount::address),
                    data.recipient.as_ref().and_then(RawAccount::address),
                ) else {
                    return unsupported("malformed_ton_transfer");
                };
                if amount_raw == 0 {
                    return unsupported("zero_ton_transfer");
                }
                TransferAction::NativeTransfer {
                    amount_raw,
                    sender: sender.to_string(),
                    recipient: recipient.to_string(),
                }
            }
            "JettonTransfer" | "jetton_transfer" => {
                let Some(data) = self.jetton_transfer else {
                    return unsupported("jetton_transfer_without_payload");
                };
                let (Some(amount_raw), Some(sender), Some(recipient)) = (
                    data.amount.as_ref().and_then(RawAmount::to_u64),
                    data.sender.as_ref().and_then(RawAccount::address),
                    data.recipient.as_ref().and_then(RawAccount::address),
                ) else {
                    return unsupported("malformed_jetton_transfer");
                };
                if amount_raw == 0 {
                    return unsupported("zero_jetton_transfer");
                }
                let comment = data
                    .comment
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty());
                TransferAction::TokenTransfer {
                    amount_raw,
                    sender: sender.to_string(),
                    recipient: recipient.to_string(),
                    comment,
                }
            }
            other => unsupported(other),
        }
    }
}

fn unsupported(kind: &str) -> TransferAction {
    TransferAction::Unsupported {
        kind: kind.to_string(),
    }
}

/// Finality body of `/v2/blockchain/transactions/{hash}`.
#[derive(Debug, Deserialize)]
pub(crate) struct TransactionResponse {
    #[serde(default)]
    pub success: bool,
}

/// Percent-encode a transaction hash for use as a path segment. Hashes may
/// be base64 and contain `/` or `+`.
pub(crate) fn encode_path_segment(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}
