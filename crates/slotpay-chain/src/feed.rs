//! The account event feed — read-only poll of recent chain activity.

use std::time::Duration;

use async_trait::async_trait;
use slotpay_types::{ChainApiConfig, Result, SlotpayError, TransferEvent};
use tracing::debug;

use crate::tonapi::EventsResponse;

/// Read-only poll of an account's recent transfer activity.
///
/// The feed is append-only but eventually consistent and may return the
/// same event across polls; callers must deduplicate via
/// [`slotpay_types::EventKey`].
#[async_trait]
pub trait EventFeed: Send + Sync {
    /// Fetch the most recent `limit` events for `account`, newest first.
    async fn recent_events(&self, account: &str, limit: usize) -> Result<Vec<TransferEvent>>;
}

/// [`EventFeed`] backed by the public TonAPI indexer.
pub struct TonApiFeed {
    http: reqwest::Client,
    base: String,
    api_key: Option<String>,
}

impl TonApiFeed {
    #[must_use]
    pub fn new(config: &ChainApiConfig) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            base: config.tonapi_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }
}

#[async_trait]
impl EventFeed for TonApiFeed {
    async fn recent_events(&self, account: &str, limit: usize) -> Result<Vec<TransferEvent>> {
        let url = format!("{}/v2/accounts/{account}/events", self.base);
        let mut request = self.http.get(&url).query(&[("limit", limit)]);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| SlotpayError::ChainApi {
            reason: format!("event feed fetch: {e}"),
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(SlotpayError::ChainApi {
                reason: format!("event feed returned HTTP {status}"),
            });
        }

        let body: EventsResponse = response.json().await.map_err(|e| SlotpayError::ChainApi {
            reason: format!("event feed decode: {e}"),
        })?;
        let events: Vec<TransferEvent> = body
            .events
            .into_iter()
            .map(crate::tonapi::RawEvent::into_transfer_event)
            .collect();
        debug!(account = %&account[..account.len().min(24)], count = events.len(),
               "fetched account events");
        Ok(events)
    }
}
