use crate::utils::{
    decode_response_type_or_raw,
    limiter::{Limiter, RateLimitConfig},
};
use alloy_primitives::{Address, Bytes, B256, U64};
use anyhow::Context as _;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use tracing::trace;

#[derive(Deserialize, Debug, Clone, Default)]
pub struct EvmRpcConfig {
    /// Overrides the chain registry endpoint.
    #[serde(default)]
    pub rpc_url: Option<String>,
    #[serde(default)]
    pub limit: RateLimitConfig,
}

/// Minimal JSON-RPC client for the reads and receipt lookups the app needs.
/// Transactions themselves are always submitted by the user's wallet.
pub struct EvmRpcClient {
    client: reqwest::Client,
    url: String,
    limiter: Limiter,
}

#[derive(Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

/// Error code geth-style nodes attach to reverted calls.
pub const EXECUTION_REVERTED_CODE: i64 = 3;

#[derive(thiserror::Error, Deserialize, Debug, Clone, PartialEq, Eq)]
#[error("json-rpc error {code}: {message}")]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    /// Revert payload, when the node returns one.
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcError {
    /// Some nodes report reverts as a generic `-32000` server error.
    pub fn is_revert(&self) -> bool {
        self.code == EXECUTION_REVERTED_CODE
            || (self.code == -32000 && self.message.starts_with("execution reverted"))
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    #[serde(default)]
    pub block_number: Option<U64>,
    #[serde(default)]
    pub status: Option<U64>,
}

impl TransactionReceipt {
    /// Post-byzantium receipts carry `status = 1` on success.
    pub fn succeeded(&self) -> bool {
        self.status == Some(U64::from(1))
    }
}

impl EvmRpcClient {
    pub fn new(url: impl Into<String>, limit: &RateLimitConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            limiter: limit.limiter(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> anyhow::Result<Option<T>> {
        self.limiter.until_ready().await;
        let id = uuid::Uuid::new_v4().to_string();
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        trace!("evm rpc request {method}: {params}", params = request["params"]);
        let response: JsonRpcResponse<T> = decode_response_type_or_raw(
            self.client
                .post(&self.url)
                .json(&request)
                .send()
                .await
                .with_context(|| format!("send {method}"))?,
        )
        .await?;
        if let Some(err) = response.error {
            return Err(anyhow::Error::new(err).context(format!("{method} failed")));
        }
        Ok(response.result)
    }

    pub async fn call(&self, to: Address, data: Bytes) -> anyhow::Result<Bytes> {
        self.request::<Bytes>("eth_call", json!([{ "to": to, "data": data }, "latest"]))
            .await?
            .ok_or_else(|| anyhow::anyhow!("eth_call returned empty result"))
    }

    pub async fn transaction_receipt(
        &self,
        hash: B256,
    ) -> anyhow::Result<Option<TransactionReceipt>> {
        self.request("eth_getTransactionReceipt", json!([hash]))
            .await
    }

    pub async fn chain_id(&self) -> anyhow::Result<u64> {
        let id = self
            .request::<U64>("eth_chainId", json!([]))
            .await?
            .ok_or_else(|| anyhow::anyhow!("eth_chainId returned empty result"))?;
        Ok(id.to::<u64>())
    }
}
