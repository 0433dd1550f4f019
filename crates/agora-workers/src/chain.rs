//! Blockchain gateway contract
//!
//! The core talks to the chain through this trait; the production
//! implementation is a thin JSON-RPC client for the wallet gateway, which
//! holds the HD master secret in its secrets backend and performs all
//! derivation and signing there. Key material never enters this process.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use agora_types::{AgoraError, AgoraResult};

/// A detected USDC transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsdcTransfer {
    pub to_address: String,
    /// Amount in USDC, six fractional digits.
    pub amount_usdc: Decimal,
    pub block_number: Option<i64>,
    pub confirmations: i32,
}

/// Mined-state of a transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxStatus {
    pub mined: bool,
    pub confirmations: i32,
    pub block_number: Option<i64>,
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Derive the receive address for a derivation index.
    async fn derive_address(&self, index: i64) -> AgoraResult<String>;

    /// Look up a transaction and decode it as a USDC transfer, if it is one.
    async fn fetch_usdc_transfer(&self, tx_hash: &str) -> AgoraResult<Option<UsdcTransfer>>;

    /// Current status of a transaction; None when the chain has never seen it.
    async fn tx_status(&self, tx_hash: &str) -> AgoraResult<Option<TxStatus>>;

    /// Broadcast a signed USDC transfer of `amount_usdc` to `to_address`.
    /// Returns the transaction hash.
    async fn send_usdc(&self, to_address: &str, amount_usdc: Decimal) -> AgoraResult<String>;
}

/// JSON-RPC client for the wallet gateway.
pub struct JsonRpcChainClient {
    endpoint: String,
    http: reqwest::Client,
}

impl JsonRpcChainClient {
    pub fn new(endpoint: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("reqwest client");
        Self { endpoint, http }
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> AgoraResult<T> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let resp = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| AgoraError::Dependency(format!("chain rpc: {}", e)))?;

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| AgoraError::Dependency(format!("chain rpc body: {}", e)))?;

        if let Some(error) = body.get("error") {
            return Err(AgoraError::Dependency(format!("chain rpc error: {}", error)));
        }
        let result = body
            .get("result")
            .cloned()
            .ok_or_else(|| AgoraError::Dependency("chain rpc: missing result".into()))?;
        serde_json::from_value(result)
            .map_err(|e| AgoraError::Dependency(format!("chain rpc decode: {}", e)))
    }
}

#[async_trait]
impl ChainClient for JsonRpcChainClient {
    async fn derive_address(&self, index: i64) -> AgoraResult<String> {
        self.call("wallet_deriveAddress", json!({ "index": index })).await
    }

    async fn fetch_usdc_transfer(&self, tx_hash: &str) -> AgoraResult<Option<UsdcTransfer>> {
        self.call("wallet_getUsdcTransfer", json!({ "tx_hash": tx_hash })).await
    }

    async fn tx_status(&self, tx_hash: &str) -> AgoraResult<Option<TxStatus>> {
        self.call("wallet_getTxStatus", json!({ "tx_hash": tx_hash })).await
    }

    async fn send_usdc(&self, to_address: &str, amount_usdc: Decimal) -> AgoraResult<String> {
        self.call(
            "wallet_sendUsdc",
            json!({ "to": to_address, "amount_usdc": amount_usdc.to_string() }),
        )
        .await
    }
}
