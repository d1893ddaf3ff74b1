//! JSON-RPC client for a deployed TradeDocuments contract.
//!
//! Writes go through `eth_sendTransaction` with an explicit nonce, so the
//! node's unlocked signer does the signing while the watcher keeps control
//! of nonce ordering. Reads are `eth_call`s pinned to a block tag.

use super::abi;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use shared_types::{
    Address, ChainError, Cid, DocType, DocumentRecord, EmissionRecord, ProductId, ReadAt,
    TradeDocumentsContract, TxHash, TxReceipt,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// JSON-RPC request structure.
#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a, T: Serialize> {
    jsonrpc: &'static str,
    method: &'a str,
    params: T,
    id: u64,
}

/// JSON-RPC response structure. `result` stays untyped so that a `null`
/// result can decode into an `Option`.
#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: String,
    block_number: Option<String>,
    status: Option<String>,
}

#[derive(Clone, Debug)]
pub struct JsonRpcConfig {
    pub rpc_url: String,
    pub contract_address: Address,
    /// Account the node signs with.
    pub signer: Address,
    /// When set, `verify_interface` also checks `eth_chainId`.
    pub chain_id: Option<u64>,
    pub request_timeout: Duration,
    pub gas_limit: Option<u64>,
}

impl JsonRpcConfig {
    pub fn new(rpc_url: impl Into<String>, contract_address: Address, signer: Address) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            contract_address,
            signer,
            chain_id: None,
            request_timeout: Duration::from_secs(15),
            gas_limit: None,
        }
    }
}

pub struct JsonRpcContract {
    http_client: reqwest::Client,
    config: JsonRpcConfig,
    request_id: AtomicU64,
}

impl JsonRpcContract {
    pub fn new(config: JsonRpcConfig) -> Self {
        // reqwest::Client::new() is infallible; fall back to it if the builder fails.
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http_client,
            config,
            request_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &JsonRpcConfig {
        &self.config
    }

    async fn call<P: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> Result<R, ChainError> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id,
        };

        let response = self
            .http_client
            .post(&self.config.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let message = format!("{method}: HTTP {status}");
            return Err(if status.is_server_error() || status.as_u16() == 429 {
                ChainError::Transient(message)
            } else {
                ChainError::Unavailable(message)
            });
        }

        let rpc_response: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| ChainError::Decode(format!("{method}: {e}")))?;

        if let Some(error) = rpc_response.error {
            debug!(method, code = error.code, message = %error.message, "RPC error");
            return Err(classify_rpc_error(&error));
        }

        serde_json::from_value(rpc_response.result.unwrap_or(Value::Null))
            .map_err(|e| ChainError::Decode(format!("{method}: {e}")))
    }

    async fn call_contract(&self, data: Vec<u8>, at: ReadAt) -> Result<Vec<u8>, ChainError> {
        let result: String = self
            .call(
                "eth_call",
                json!([
                    {
                        "to": self.config.contract_address.to_string(),
                        "data": format!("0x{}", hex::encode(data)),
                    },
                    block_tag(at),
                ]),
            )
            .await?;
        parse_hex_bytes(&result)
    }

    async fn send_transaction(&self, data: Vec<u8>, nonce: u64) -> Result<TxHash, ChainError> {
        let mut tx = json!({
            "from": self.config.signer.to_string(),
            "to": self.config.contract_address.to_string(),
            "data": format!("0x{}", hex::encode(data)),
            "nonce": format!("0x{nonce:x}"),
        });
        if let Some(gas) = self.config.gas_limit {
            tx["gas"] = json!(format!("0x{gas:x}"));
        }

        let result: String = self.call("eth_sendTransaction", json!([tx])).await?;
        result
            .parse()
            .map_err(|_| ChainError::Decode(format!("invalid transaction hash {result}")))
    }

    async fn transaction_count(&self, tag: &str) -> Result<u64, ChainError> {
        let result: String = self
            .call(
                "eth_getTransactionCount",
                json!([self.config.signer.to_string(), tag]),
            )
            .await?;
        parse_hex_u64(&result)
    }
}

#[async_trait]
impl TradeDocumentsContract for JsonRpcContract {
    async fn verify_interface(&self) -> Result<(), ChainError> {
        if let Some(expected) = self.config.chain_id {
            let result: String = self.call("eth_chainId", json!([])).await?;
            let actual = parse_hex_u64(&result)?;
            if actual != expected {
                return Err(ChainError::InterfaceMismatch(format!(
                    "connected to chain {actual}, expected {expected}"
                )));
            }
        }

        let result: String = self
            .call(
                "eth_getCode",
                json!([self.config.contract_address.to_string(), "latest"]),
            )
            .await?;
        let code = parse_hex_bytes(&result)?;
        if code.is_empty() {
            return Err(ChainError::InterfaceMismatch(format!(
                "no contract code at {}",
                self.config.contract_address
            )));
        }

        // The dispatcher compares the calldata selector against PUSH4 immediates.
        let missing: Vec<&str> = abi::INTERFACE
            .iter()
            .filter(|signature| {
                let mut needle = vec![0x63];
                needle.extend_from_slice(&abi::selector(signature));
                !code.windows(needle.len()).any(|window| window == needle.as_slice())
            })
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(ChainError::InterfaceMismatch(format!(
                "contract at {} lacks {}",
                self.config.contract_address,
                missing.join(", ")
            )));
        }

        info!(
            contract = %self.config.contract_address,
            signer = %self.config.signer,
            "Contract interface verified"
        );
        Ok(())
    }

    fn signer(&self) -> Address {
        self.config.signer
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        let result: String = self.call("eth_blockNumber", json!([])).await?;
        parse_hex_u64(&result)
    }

    async fn pending_nonce(&self) -> Result<u64, ChainError> {
        self.transaction_count("pending").await
    }

    async fn latest_nonce(&self) -> Result<u64, ChainError> {
        self.transaction_count("latest").await
    }

    async fn store_document(
        &self,
        product: ProductId,
        doc_type: DocType,
        cid: &Cid,
        nonce: u64,
    ) -> Result<TxHash, ChainError> {
        self.send_transaction(
            abi::encode_store_document(product, doc_type, cid.as_str()),
            nonce,
        )
        .await
    }

    async fn set_carbon_emission(
        &self,
        product: ProductId,
        total_emissions: u64,
        unit: &str,
        nonce: u64,
    ) -> Result<TxHash, ChainError> {
        self.send_transaction(
            abi::encode_set_carbon_emission(product, total_emissions, unit),
            nonce,
        )
        .await
    }

    async fn transaction_receipt(&self, tx_hash: &TxHash) -> Result<Option<TxReceipt>, ChainError> {
        let raw: Option<RawReceipt> = self
            .call("eth_getTransactionReceipt", json!([tx_hash.to_string()]))
            .await?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        let Some(block) = raw.block_number else {
            return Ok(None);
        };

        Ok(Some(TxReceipt {
            tx_hash: raw
                .transaction_hash
                .parse()
                .map_err(|_| ChainError::Decode("invalid receipt hash".into()))?,
            block_number: parse_hex_u64(&block)?,
            // Pre-Byzantium receipts have no status; treat them as success.
            success: raw.status.as_deref().map_or(true, |s| s != "0x0"),
            revert_reason: None,
        }))
    }

    async fn get_document(
        &self,
        product: ProductId,
        doc_type: DocType,
        at: ReadAt,
    ) -> Result<DocumentRecord, ChainError> {
        let data = self
            .call_contract(abi::encode_get_document(product, doc_type), at)
            .await?;
        if data.is_empty() {
            return Err(ChainError::NotFound("Document not found".into()));
        }
        let record = abi::decode_document(&data)?;
        if record.cid.is_empty() {
            return Err(ChainError::NotFound("Document not found".into()));
        }
        Ok(record)
    }

    async fn get_carbon_emission(
        &self,
        product: ProductId,
        at: ReadAt,
    ) -> Result<EmissionRecord, ChainError> {
        let data = self
            .call_contract(abi::encode_get_carbon_emission(product), at)
            .await?;
        if data.is_empty() {
            return Err(ChainError::NotFound("Carbon emission data not set".into()));
        }
        let record = abi::decode_emission(&data)?;
        if record.timestamp == 0 {
            return Err(ChainError::NotFound("Carbon emission data not set".into()));
        }
        Ok(record)
    }

    async fn is_product_complete(&self, product: ProductId, at: ReadAt) -> Result<bool, ChainError> {
        let data = self
            .call_contract(abi::encode_is_product_complete(product), at)
            .await?;
        abi::decode_bool(&data)
    }
}

// =============================================================================
// ERROR CLASSIFICATION
// =============================================================================

fn transport_error(error: reqwest::Error) -> ChainError {
    if error.is_connect() {
        ChainError::Unavailable(error.to_string())
    } else {
        ChainError::Transient(error.to_string())
    }
}

/// Maps a node error onto the taxonomy. Revert payloads carried in `data`
/// take precedence over the message text.
pub fn classify_rpc_error(error: &JsonRpcError) -> ChainError {
    let message = error.message.as_str();
    let lower = message.to_ascii_lowercase();
    let payload_reason = error
        .data
        .as_ref()
        .and_then(Value::as_str)
        .and_then(|data| parse_hex_bytes(data).ok())
        .and_then(|bytes| abi::decode_revert_reason(&bytes));
    let reason = payload_reason.clone().or_else(|| revert_reason_from_message(message));

    if let Some(reason) = &reason {
        let lower_reason = reason.to_ascii_lowercase();
        if lower_reason.contains("not found") || lower_reason.contains("not set") {
            return ChainError::NotFound(reason.clone());
        }
    }
    if lower.contains("insufficient funds") {
        return ChainError::InsufficientFunds(message.to_string());
    }
    if ["nonce too low", "nonce too high", "already known", "replacement transaction underpriced"]
        .iter()
        .any(|needle| lower.contains(needle))
    {
        return ChainError::NonceConflict(message.to_string());
    }
    if let Some(reason) = reason {
        return ChainError::Reverted(reason);
    }
    if error.code == 3 || lower.contains("revert") {
        return ChainError::Reverted(message.to_string());
    }
    ChainError::Transient(format!("RPC error {}: {message}", error.code))
}

fn revert_reason_from_message(message: &str) -> Option<String> {
    if let Some(start) = message.find("reverted with reason string '") {
        let rest = &message[start + "reverted with reason string '".len()..];
        return rest.split('\'').next().map(str::to_string);
    }
    message
        .find("execution reverted: ")
        .map(|start| message[start + "execution reverted: ".len()..].trim().to_string())
        .filter(|reason| !reason.is_empty())
}

fn block_tag(at: ReadAt) -> String {
    match at {
        ReadAt::Latest => "latest".to_string(),
        ReadAt::Block(number) => format!("0x{number:x}"),
    }
}

fn parse_hex_u64(value: &str) -> Result<u64, ChainError> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    u64::from_str_radix(digits, 16)
        .map_err(|e| ChainError::Decode(format!("invalid hex quantity {value}: {e}")))
}

fn parse_hex_bytes(value: &str) -> Result<Vec<u8>, ChainError> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(digits).map_err(|e| ChainError::Decode(format!("invalid hex data: {e}")))
}
