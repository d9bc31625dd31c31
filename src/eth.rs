//! JSON-RPC provider for the handful of `eth_*` methods the wallet layer needs.
//!
//! Responses are decoded into small local types rather than the full alloy
//! RPC models: only the fields the transfer flow reads are deserialized.

use alloy::rpc::client::{ClientBuilder, ReqwestClient};
use alloy::rpc::types::request::TransactionRequest;
use alloy::transports::http::Http;
use alloy::transports::TransportError;
use alloy_primitives::{Address, Bytes, TxHash, U256, U64};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

#[derive(Debug, Error)]
pub enum EthError {
    #[error("rpc transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("failed to build http client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("malformed rpc response: {0}")]
    MalformedResponse(String),

    #[error("chain ID mismatch: expected {expected}, got {actual}")]
    ChainIdMismatch { expected: u64, actual: u64 },
}

/// Subset of a transaction receipt as returned by `eth_getTransactionReceipt`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcReceipt {
    pub transaction_hash: TxHash,
    pub block_number: Option<U64>,
    /// `0x1` on success, `0x0` on revert. Absent on pre-Byzantium chains.
    pub status: Option<U64>,
}

impl RpcReceipt {
    /// Whether execution succeeded. Receipts without a status field are treated as failed.
    pub fn succeeded(&self) -> bool {
        self.status.map(|s| s == U64::from(1)).unwrap_or(false)
    }
}

/// Subset of a block header, enough for fee estimation
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcBlockHeader {
    pub base_fee_per_gas: Option<U256>,
}

/// An HTTP JSON-RPC endpoint bound to one chain
#[derive(Clone)]
pub struct Provider {
    pub chain_id: u64,
    url: Url,
    client: ReqwestClient,
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("chain_id", &self.chain_id)
            .field("url", &self.url.as_str())
            .finish()
    }
}

impl Provider {
    /// `request_timeout` bounds every single RPC call
    pub fn new(url: Url, chain_id: u64, request_timeout: Duration) -> Result<Self, EthError> {
        let http = reqwest::Client::builder().timeout(request_timeout).build()?;
        let client = ClientBuilder::default().transport(Http::with_client(http, url.clone()), false);
        Ok(Self {
            chain_id,
            url,
            client,
        })
    }

    /// Check that the endpoint serves the chain this provider was configured for
    pub async fn verify_chain_id(&self) -> Result<(), EthError> {
        let actual: U64 = self.client.request_noparams("eth_chainId").await?;
        let actual = actual.to::<u64>();
        if actual != self.chain_id {
            return Err(EthError::ChainIdMismatch {
                expected: self.chain_id,
                actual,
            });
        }
        Ok(())
    }

    pub async fn get_balance(&self, address: Address) -> Result<U256, EthError> {
        let balance: U256 = self
            .client
            .request("eth_getBalance", (address, "latest"))
            .await?;
        debug!(%address, %balance, "eth_getBalance");
        Ok(balance)
    }

    /// Next nonce for `address`, counting transactions still in the pool
    pub async fn get_transaction_count(&self, address: Address) -> Result<u64, EthError> {
        let count: U64 = self
            .client
            .request("eth_getTransactionCount", (address, "pending"))
            .await?;
        Ok(count.to::<u64>())
    }

    pub async fn call(&self, tx: TransactionRequest) -> Result<Bytes, EthError> {
        let result: Bytes = self.client.request("eth_call", (tx, "latest")).await?;
        Ok(result)
    }

    pub async fn estimate_gas(&self, tx: TransactionRequest) -> Result<u64, EthError> {
        let gas: U64 = self.client.request("eth_estimateGas", (tx,)).await?;
        Ok(gas.to::<u64>())
    }

    pub async fn get_gas_price(&self) -> Result<U256, EthError> {
        let price: U256 = self.client.request_noparams("eth_gasPrice").await?;
        Ok(price)
    }

    pub async fn get_latest_block(&self) -> Result<RpcBlockHeader, EthError> {
        let block: Option<RpcBlockHeader> = self
            .client
            .request("eth_getBlockByNumber", ("latest", false))
            .await?;
        block.ok_or_else(|| EthError::MalformedResponse("no latest block".to_string()))
    }

    pub async fn get_block_number(&self) -> Result<u64, EthError> {
        let number: U64 = self.client.request_noparams("eth_blockNumber").await?;
        Ok(number.to::<u64>())
    }

    pub async fn send_raw_transaction(&self, raw: Bytes) -> Result<TxHash, EthError> {
        let hash: TxHash = self
            .client
            .request("eth_sendRawTransaction", (raw,))
            .await?;
        Ok(hash)
    }

    pub async fn get_transaction_receipt(
        &self,
        hash: TxHash,
    ) -> Result<Option<RpcReceipt>, EthError> {
        let receipt: Option<RpcReceipt> = self
            .client
            .request("eth_getTransactionReceipt", (hash,))
            .await?;
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::spawn_rpc_node;
    use serde_json::{json, Value};

    #[test]
    fn receipt_status_flag() {
        let ok: RpcReceipt = serde_json::from_value(serde_json::json!({
            "transactionHash": "0x88df016429689c079f3b2f6ad39fa052532c56795b733da78a91ebe6a713944b",
            "blockNumber": "0xb",
            "status": "0x1",
            "gasUsed": "0x5208"
        }))
        .unwrap();
        assert!(ok.succeeded());
        assert_eq!(ok.block_number, Some(U64::from(11)));

        let reverted: RpcReceipt = serde_json::from_value(serde_json::json!({
            "transactionHash": "0x88df016429689c079f3b2f6ad39fa052532c56795b733da78a91ebe6a713944b",
            "blockNumber": "0xb",
            "status": "0x0",
            "gasUsed": "0x5208"
        }))
        .unwrap();
        assert!(!reverted.succeeded());
    }

    #[tokio::test]
    async fn decodes_node_answers() {
        let url = spawn_rpc_node(|method, params| match method {
            "eth_chainId" => Some(json!("0x7a69")),
            "eth_getBalance" => {
                assert_eq!(params[1], "latest");
                Some(json!("0xde0b6b3a7640000"))
            }
            "eth_getTransactionCount" => {
                assert_eq!(params[1], "pending");
                Some(json!("0x7"))
            }
            "eth_getBlockByNumber" => Some(json!({ "number": "0x10", "baseFeePerGas": "0x3b9aca00" })),
            "eth_getTransactionReceipt" => Some(Value::Null),
            _ => None,
        })
        .await;
        let provider = Provider::new(url, 31337, Duration::from_secs(5)).unwrap();

        provider.verify_chain_id().await.unwrap();
        assert_eq!(
            provider.get_balance(Address::ZERO).await.unwrap(),
            U256::from(1_000_000_000_000_000_000u128)
        );
        assert_eq!(provider.get_transaction_count(Address::ZERO).await.unwrap(), 7);
        assert_eq!(
            provider.get_latest_block().await.unwrap().base_fee_per_gas,
            Some(U256::from(1_000_000_000u64))
        );
        assert!(provider
            .get_transaction_receipt(TxHash::ZERO)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn wrong_chain_is_rejected() {
        let url = spawn_rpc_node(|_, _| Some(json!("0x1"))).await;
        let provider = Provider::new(url, 8453, Duration::from_secs(5)).unwrap();

        assert!(matches!(
            provider.verify_chain_id().await,
            Err(EthError::ChainIdMismatch {
                expected: 8453,
                actual: 1
            })
        ));
    }

    #[tokio::test]
    async fn stalled_calls_time_out() {
        let url = spawn_rpc_node(|_, _| None).await;
        let provider = Provider::new(url, 1, Duration::from_millis(200)).unwrap();

        assert!(matches!(
            provider.get_block_number().await,
            Err(EthError::Transport(_))
        ));
    }
}
