//! JSON-RPC access to the chain
//!
//! Only the handful of `eth_*` calls the hedge loop needs, spoken as raw
//! JSON-RPC 2.0 over reqwest.

use crate::error::ChainError;
use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Header fields of the latest block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub number: u64,
    /// Absent on chains without a fee market
    pub base_fee_per_gas: Option<u128>,
}

/// Transaction fields sent to `eth_estimateGas`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub from: Address,
    pub to: Address,
    pub value: Option<U256>,
    pub data: Option<Bytes>,
}

/// Raw chain calls consumed by the chain client
#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn balance(&self, address: Address) -> Result<U256, ChainError>;

    /// Pending-inclusive nonce for the next transaction
    async fn transaction_count(&self, address: Address) -> Result<u64, ChainError>;

    async fn latest_block(&self) -> Result<BlockHeader, ChainError>;

    async fn block_transaction_count(&self, block: u64) -> Result<u64, ChainError>;

    /// `maxPriorityFeePerGas` of one transaction in a block, if it has one
    async fn transaction_priority_fee(
        &self,
        block: u64,
        index: u64,
    ) -> Result<Option<u128>, ChainError>;

    /// Node's suggested priority fee
    async fn max_priority_fee(&self) -> Result<u128, ChainError>;

    async fn gas_price(&self) -> Result<u128, ChainError>;

    async fn estimate_gas(&self, call: &CallRequest) -> Result<u64, ChainError>;

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256, ChainError>;

    /// `None` while pending, otherwise whether the receipt reports success
    async fn receipt_status(&self, tx_hash: B256) -> Result<Option<bool>, ChainError>;
}

/// JSON-RPC client over HTTP
pub struct HttpRpc {
    client: reqwest::Client,
    endpoint: String,
    next_id: AtomicU64,
}

impl HttpRpc {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, ChainError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| ChainError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            next_id: AtomicU64::new(1),
        })
    }

    async fn call(&self, method: &'static str, params: Value) -> Result<Value, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id
        });

        debug!("[RPC] {} id={}", method, id);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ChainError::from_network_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChainError::Transport(format!("HTTP {}: {}", status, body)));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| ChainError::Malformed {
                method,
                reason: e.to_string(),
            })?;

        parse_rpc_response(method, json)
    }
}

/// Split a JSON-RPC envelope into its result or error object
pub(crate) fn parse_rpc_response(method: &'static str, json: Value) -> Result<Value, ChainError> {
    if let Some(error) = json.get("error").filter(|e| !e.is_null()) {
        return Err(ChainError::Rpc {
            code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        });
    }

    json.get("result").cloned().ok_or(ChainError::Malformed {
        method,
        reason: "missing result".to_string(),
    })
}

fn hex_str<'a>(method: &'static str, value: &'a Value) -> Result<&'a str, ChainError> {
    let s = value.as_str().ok_or_else(|| ChainError::Malformed {
        method,
        reason: format!("expected hex string, got {}", value),
    })?;
    Ok(s.strip_prefix("0x").unwrap_or(s))
}

pub(crate) fn parse_quantity_u256(method: &'static str, value: &Value) -> Result<U256, ChainError> {
    let digits = hex_str(method, value)?;
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 16).map_err(|e| ChainError::Malformed {
        method,
        reason: e.to_string(),
    })
}

pub(crate) fn parse_quantity_u128(method: &'static str, value: &Value) -> Result<u128, ChainError> {
    let digits = hex_str(method, value)?;
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16).map_err(|e| ChainError::Malformed {
        method,
        reason: e.to_string(),
    })
}

pub(crate) fn parse_quantity_u64(method: &'static str, value: &Value) -> Result<u64, ChainError> {
    let digits = hex_str(method, value)?;
    if digits.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(digits, 16).map_err(|e| ChainError::Malformed {
        method,
        reason: e.to_string(),
    })
}

fn quantity<T: std::fmt::LowerHex>(value: T) -> String {
    format!("0x{:x}", value)
}

#[async_trait]
impl ChainRpc for HttpRpc {
    async fn balance(&self, address: Address) -> Result<U256, ChainError> {
        const METHOD: &str = "eth_getBalance";
        let result = self
            .call(METHOD, json!([format!("{:?}", address), "latest"]))
            .await?;
        parse_quantity_u256(METHOD, &result)
    }

    async fn transaction_count(&self, address: Address) -> Result<u64, ChainError> {
        const METHOD: &str = "eth_getTransactionCount";
        let result = self
            .call(METHOD, json!([format!("{:?}", address), "pending"]))
            .await?;
        parse_quantity_u64(METHOD, &result)
    }

    async fn latest_block(&self) -> Result<BlockHeader, ChainError> {
        const METHOD: &str = "eth_getBlockByNumber";
        let block = self.call(METHOD, json!(["latest", false])).await?;
        if block.is_null() {
            return Err(ChainError::Malformed {
                method: METHOD,
                reason: "latest block is null".to_string(),
            });
        }

        let number = parse_quantity_u64(METHOD, &block["number"])?;
        let base_fee_per_gas = match block.get("baseFeePerGas") {
            Some(v) if !v.is_null() => Some(parse_quantity_u128(METHOD, v)?),
            _ => None,
        };

        Ok(BlockHeader {
            number,
            base_fee_per_gas,
        })
    }

    async fn block_transaction_count(&self, block: u64) -> Result<u64, ChainError> {
        const METHOD: &str = "eth_getBlockTransactionCountByNumber";
        let result = self.call(METHOD, json!([quantity(block)])).await?;
        parse_quantity_u64(METHOD, &result)
    }

    async fn transaction_priority_fee(
        &self,
        block: u64,
        index: u64,
    ) -> Result<Option<u128>, ChainError> {
        const METHOD: &str = "eth_getTransactionByBlockNumberAndIndex";
        let tx = self
            .call(METHOD, json!([quantity(block), quantity(index)]))
            .await?;
        match tx.get("maxPriorityFeePerGas") {
            Some(v) if !v.is_null() => Ok(Some(parse_quantity_u128(METHOD, v)?)),
            _ => Ok(None),
        }
    }

    async fn max_priority_fee(&self) -> Result<u128, ChainError> {
        const METHOD: &str = "eth_maxPriorityFeePerGas";
        let result = self.call(METHOD, json!([])).await?;
        parse_quantity_u128(METHOD, &result)
    }

    async fn gas_price(&self) -> Result<u128, ChainError> {
        const METHOD: &str = "eth_gasPrice";
        let result = self.call(METHOD, json!([])).await?;
        parse_quantity_u128(METHOD, &result)
    }

    async fn estimate_gas(&self, call: &CallRequest) -> Result<u64, ChainError> {
        const METHOD: &str = "eth_estimateGas";
        let mut tx = json!({
            "from": format!("{:?}", call.from),
            "to": format!("{:?}", call.to),
        });
        if let Some(value) = call.value {
            tx["value"] = json!(quantity(value));
        }
        if let Some(data) = &call.data {
            tx["data"] = json!(format!("0x{}", hex::encode(data)));
        }

        let result = self.call(METHOD, json!([tx])).await?;
        parse_quantity_u64(METHOD, &result)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256, ChainError> {
        const METHOD: &str = "eth_sendRawTransaction";
        let result = self
            .call(METHOD, json!([format!("0x{}", hex::encode(raw))]))
            .await?;
        let hash = result.as_str().ok_or_else(|| ChainError::Malformed {
            method: METHOD,
            reason: format!("expected transaction hash, got {}", result),
        })?;
        B256::from_str(hash).map_err(|e| ChainError::Malformed {
            method: METHOD,
            reason: e.to_string(),
        })
    }

    async fn receipt_status(&self, tx_hash: B256) -> Result<Option<bool>, ChainError> {
        const METHOD: &str = "eth_getTransactionReceipt";
        let receipt = self.call(METHOD, json!([format!("{:?}", tx_hash)])).await?;
        parse_receipt_status(&receipt)
    }
}

/// `None` for a pending (null) receipt, else whether `status` is `0x1`
pub(crate) fn parse_receipt_status(receipt: &Value) -> Result<Option<bool>, ChainError> {
    const METHOD: &str = "eth_getTransactionReceipt";
    if receipt.is_null() {
        return Ok(None);
    }
    match receipt.get("status") {
        Some(status) if !status.is_null() => Ok(Some(parse_quantity_u64(METHOD, status)? == 1)),
        // Pre-Byzantium receipts carry no status; treat as unconfirmed
        _ => Ok(Some(false)),
    }
}
