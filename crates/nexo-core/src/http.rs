//! HTTP clients for the wallet and the explorer
//!
//! Timeouts are not set here; the orchestrator bounds every call.

use async_trait::async_trait;
use nexo_chain::Transaction;
use serde_json::Value;
use tracing::debug;

use crate::config::Network;
use crate::error::ServiceError;
use crate::services::{CreateTransactionRequest, CreateTransactionResponse, Explorer, Wallet};

/// Wallet reached over its local JSON HTTP interface
pub struct HttpWallet {
    base_url: String,
    client: reqwest::Client,
}

impl HttpWallet {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    async fn post(&self, method: &str, body: Value) -> Result<Value, ServiceError> {
        let url = format!("{}/{}", self.base_url, method);
        debug!(%url, "wallet request");

        let resp = self.client.post(&url).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl Wallet for HttpWallet {
    async fn identity_key(&self) -> Result<String, ServiceError> {
        let json = self
            .post("getPublicKey", serde_json::json!({ "identityKey": true }))
            .await?;
        non_empty_str(&json, "publicKey")
    }

    async fn create_transaction(
        &self,
        request: &CreateTransactionRequest,
    ) -> Result<CreateTransactionResponse, ServiceError> {
        let body = serde_json::to_value(request)
            .map_err(|e| ServiceError::InvalidResponse(format!("unserializable request: {e}")))?;
        let json = self.post("createAction", body).await?;
        Ok(CreateTransactionResponse {
            txid: non_empty_str(&json, "txid")?,
        })
    }
}

/// WhatsOnChain-compatible explorer API
pub struct WhatsOnChainExplorer {
    base_url: String,
    network: Network,
    client: reqwest::Client,
}

impl WhatsOnChainExplorer {
    pub fn new(base_url: impl Into<String>, network: Network) -> Self {
        Self::with_client(base_url, network, reqwest::Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, network: Network, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            network,
            client,
        }
    }

    pub fn transaction_url(&self, txid: &str) -> String {
        format!("{}/v1/bsv/{}/tx/{}", self.base_url, self.network.as_str(), txid)
    }
}

#[async_trait]
impl Explorer for WhatsOnChainExplorer {
    async fn fetch_transaction(&self, txid: &str) -> Result<Transaction, ServiceError> {
        let url = self.transaction_url(txid);
        debug!(%url, "explorer request");

        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ServiceError::TransactionNotFound(txid.to_string()));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let value: Value = resp.json().await?;
        serde_json::from_value(value).map_err(|e| ServiceError::InvalidResponse(e.to_string()))
    }
}

fn non_empty_str(json: &Value, field: &str) -> Result<String, ServiceError> {
    json.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ServiceError::InvalidResponse(format!("response has no `{field}`")))
}
