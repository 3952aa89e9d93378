//! Outbound transfers and finality checks.
//!
//! Key custody stays outside this process: transfers are submitted to the
//! custodial wallet-signer service over HTTP, which holds the hot wallet's
//! key, resolves token sub-accounts, and reports an uninitialized on-chain
//! account distinctly so the settler can run the deploy step and retry.
//! Finality is read back from the public indexer.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use slotpay_types::{ChainApiConfig, Result, SlotpayError, SubmitOutcome, TransferRequest, TxFinality};
use tracing::{debug, warn};

use crate::tonapi::{encode_path_segment, TransactionResponse};

/// The custodial wallet plus the chain's read side.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Submit an outbound transfer from the custodial wallet.
    async fn submit_transfer(&self, request: &TransferRequest) -> Result<SubmitOutcome>;

    /// Deploy the custodial account on-chain. Called once when a submission
    /// reports [`SubmitOutcome::WalletUninitialized`].
    async fn deploy_wallet(&self) -> Result<()>;

    /// Finality of a submitted transaction. Transport or indexer failures
    /// degrade to [`TxFinality::Unknown`] — never an error, since the caller
    /// resolves unknowns by bounded retry.
    async fn transaction_status(&self, hash: &str) -> TxFinality;
}

#[derive(Debug, Deserialize)]
struct SignerResponse {
    status: String,
    #[serde(default)]
    token_wallet: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

/// [`ChainClient`] backed by the wallet-signer sidecar and TonAPI.
pub struct HttpWalletClient {
    http: reqwest::Client,
    signer_base: String,
    tonapi_base: String,
    api_key: Option<String>,
}

impl HttpWalletClient {
    /// # Errors
    /// Returns [`SlotpayError::Configuration`] when no signer endpoint is
    /// configured — withdrawals cannot run without one.
    pub fn new(config: &ChainApiConfig) -> Result<Self> {
        let signer_base = config
            .signer_base
            .as_deref()
            .ok_or_else(|| {
                SlotpayError::Configuration("wallet signer endpoint not configured".into())
            })?
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(20))
                .build()
                .unwrap_or_default(),
            signer_base,
            tonapi_base: config.tonapi_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl ChainClient for HttpWalletClient {
    async fn submit_transfer(&self, request: &TransferRequest) -> Result<SubmitOutcome> {
        let url = format!("{}/v1/transfers", self.signer_base);
        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| SlotpayError::ChainApi {
                reason: format!("signer submit: {e}"),
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(SlotpayError::ChainApi {
                reason: format!("signer returned HTTP {status}"),
            });
        }
        let body: SignerResponse =
            response.json().await.map_err(|e| SlotpayError::ChainApi {
                reason: format!("signer decode: {e}"),
            })?;
        match body.status.as_str() {
            "accepted" => Ok(SubmitOutcome::Accepted {
                token_wallet: body.token_wallet,
            }),
            "wallet_uninitialized" => Ok(SubmitOutcome::WalletUninitialized),
            "rejected" => Ok(SubmitOutcome::Rejected {
                reason: body.reason.unwrap_or_else(|| "unspecified".into()),
            }),
            other => Err(SlotpayError::ChainApi {
                reason: format!("signer reported unknown status: {other}"),
            }),
        }
    }

    async fn deploy_wallet(&self) -> Result<()> {
        let url = format!("{}/v1/deploy", self.signer_base);
        let response = self
            .http
            .post(&url)
            .send()
            .await
            .map_err(|e| SlotpayError::ChainApi {
                reason: format!("signer deploy: {e}"),
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(SlotpayError::ChainApi {
                reason: format!("signer deploy returned HTTP {status}"),
            });
        }
        debug!("custodial wallet deploy submitted");
        Ok(())
    }

    async fn transaction_status(&self, hash: &str) -> TxFinality {
        let url = format!(
            "{}/v2/blockchain/transactions/{}",
            self.tonapi_base,
            encode_path_segment(hash)
        );
        let mut request = self
            .http
            .get(&url)
            .timeout(Duration::from_secs(15));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = match request.send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                debug!(hash = %&hash[..hash.len().min(16)], status = %response.status(),
                       "finality check HTTP error");
                return TxFinality::Unknown;
            }
            Err(e) => {
                debug!(hash = %&hash[..hash.len().min(16)], error = %e, "finality check failed");
                return TxFinality::Unknown;
            }
        };
        match response.json::<TransactionResponse>().await {
            Ok(body) if body.success => TxFinality::Confirmed,
            Ok(_) => TxFinality::Rejected,
            Err(e) => {
                warn!(error = %e, "finality response decode failed");
                TxFinality::Unknown
            }
        }
    }
}
