//! External collaborators
//!
//! The wallet funds and broadcasts transactions; the explorer returns them
//! later. Both are out-of-process services reached through these traits.

use async_trait::async_trait;
use nexo_chain::Transaction;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// One output of a wallet-created transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOutput {
    /// Hex-encoded locking script
    pub locking_script: String,
    pub satoshis: u64,
    pub output_description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOptions {
    pub randomize_outputs: bool,
}

/// Request to create, fund and broadcast a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTransactionRequest {
    pub description: String,
    pub outputs: Vec<ActionOutput>,
    pub options: ActionOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTransactionResponse {
    pub txid: String,
}

/// Wallet / funding service
#[async_trait]
pub trait Wallet: Send + Sync {
    /// The wallet's identity public key, hex
    async fn identity_key(&self) -> Result<String, ServiceError>;

    /// Create and broadcast; returns once the wallet has a transaction id.
    async fn create_transaction(
        &self,
        request: &CreateTransactionRequest,
    ) -> Result<CreateTransactionResponse, ServiceError>;
}

/// Block explorer query service
#[async_trait]
pub trait Explorer: Send + Sync {
    async fn fetch_transaction(&self, txid: &str) -> Result<Transaction, ServiceError>;
}
