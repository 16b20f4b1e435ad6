use crate::chain::{
    FunctionCall, InvokeTransaction, L1Chain, L1Receipt, L2Chain, MessageFromL1, MessageToL1,
};
use crate::error::{BridgeError, Result};
use crate::types::{
    felt_hex, felt_to_u256, parse_felt, parse_u256, ExecutionStatus, FinalityStatus,
    L2TransactionStatus,
};
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_provider::{Provider, ProviderBuilder, RootProvider};
use alloy_rpc_client::RpcClient;
use alloy_rpc_types::{TransactionInput, TransactionRequest};
use alloy_signer_local::PrivateKeySigner;
use alloy_transport_http::Http;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use starknet_crypto::Felt;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Starknet RPC error code for an unknown transaction hash.
const TXN_HASH_NOT_FOUND: i64 = 29;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Ethereum JSON-RPC client.
#[derive(Clone)]
pub struct L1RpcClient {
    pub url: Url,
    client: RpcClient,
    provider: RootProvider,
}

impl L1RpcClient {
    pub fn new(url: &str) -> Result<Self> {
        let url: Url = url
            .parse()
            .map_err(|err| BridgeError::config(format!("invalid L1 rpc url {url}: {err}")))?;
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(BridgeError::rpc)?;
        let client = RpcClient::new(Http::with_client(http, url.clone()), false);
        let provider = RootProvider::new(client.clone());
        Ok(Self {
            url,
            client,
            provider,
        })
    }
}

#[async_trait]
impl L1Chain for L1RpcClient {
    async fn balance(&self, owner: Address) -> Result<U256> {
        self.provider
            .get_balance(owner)
            .await
            .map_err(BridgeError::rpc)
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        let request = TransactionRequest {
            to: Some(to.into()),
            input: TransactionInput::new(data),
            ..Default::default()
        };
        self.provider.call(request).await.map_err(BridgeError::rpc)
    }

    async fn pending_nonce(&self, owner: Address) -> Result<u64> {
        self.provider
            .get_transaction_count(owner)
            .pending()
            .await
            .map_err(BridgeError::rpc)
    }

    async fn send_transaction(
        &self,
        signer: &PrivateKeySigner,
        request: TransactionRequest,
    ) -> Result<B256> {
        let chain_id = self
            .provider
            .get_chain_id()
            .await
            .map_err(BridgeError::rpc)?;
        let provider = ProviderBuilder::new()
            .wallet(signer.clone())
            .with_chain_id(chain_id)
            .connect_client(self.client.clone());
        debug!(url = %self.url, chain_id, "sending L1 transaction");
        let pending = provider
            .send_transaction(request)
            .await
            .map_err(BridgeError::rpc)?;
        Ok(*pending.tx_hash())
    }

    async fn receipt(&self, tx_hash: B256) -> Result<Option<L1Receipt>> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(BridgeError::rpc)?;
        Ok(receipt.map(|receipt| L1Receipt {
            tx_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            success: receipt.status(),
        }))
    }
}

/// Starknet JSON-RPC client speaking the v0.7 method set.
#[derive(Clone)]
pub struct L2RpcClient {
    pub url: Url,
    http: Client,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)?;
        if let Some(data) = &self.data {
            write!(f, ": {data}")?;
        }
        Ok(())
    }
}

impl L2RpcClient {
    pub fn new(url: &str) -> Result<Self> {
        let url: Url = url
            .parse()
            .map_err(|err| BridgeError::config(format!("invalid L2 rpc url {url}: {err}")))?;
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(BridgeError::rpc)?;
        Ok(Self { url, http })
    }

    /// Send one request. Transport failures are the outer error; a JSON-RPC
    /// error object from the node is returned as the inner one.
    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<std::result::Result<T, JsonRpcError>> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        debug!(method, "starknet rpc request");
        let response = self
            .http
            .post(self.url.clone())
            .json(&payload)
            .send()
            .await
            .map_err(|err| BridgeError::Rpc(format!("{method}: request failed: {err}")))?;
        let status = response.status();
        let value: Value = response
            .json()
            .await
            .map_err(|err| BridgeError::Rpc(format!("{method}: decode failed: {err}")))?;
        decode_response(method, status.is_success(), value)
    }

    async fn raw_rpc<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        self.request(method, params)
            .await?
            .map_err(|err| BridgeError::Rpc(format!("{method}: {err}")))
    }
}

fn decode_response<T: DeserializeOwned>(
    method: &str,
    http_ok: bool,
    mut value: Value,
) -> Result<std::result::Result<T, JsonRpcError>> {
    if let Some(error) = value.get_mut("error").map(Value::take) {
        let error: JsonRpcError = serde_json::from_value(error)
            .map_err(|err| BridgeError::Rpc(format!("{method}: malformed error: {err}")))?;
        return Ok(Err(error));
    }
    if !http_ok {
        return Err(BridgeError::Rpc(format!("{method}: http error: {value}")));
    }
    let result = value
        .get_mut("result")
        .map(Value::take)
        .ok_or_else(|| BridgeError::Rpc(format!("{method}: missing result")))?;
    serde_json::from_value(result)
        .map(Ok)
        .map_err(|err| BridgeError::Rpc(format!("{method}: unexpected result: {err}")))
}

#[derive(Debug, Deserialize)]
struct RawStatus {
    finality_status: String,
    #[serde(default)]
    execution_status: Option<String>,
    #[serde(default)]
    failure_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    from_address: String,
    to_address: String,
    #[serde(default)]
    payload: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawReceipt {
    #[serde(default)]
    messages_sent: Vec<RawMessage>,
}

#[derive(Debug, Deserialize)]
struct AddInvokeResult {
    transaction_hash: String,
}

#[derive(Debug, Deserialize)]
struct MessageFeeEstimate {
    overall_fee: String,
}

fn rpc_felt(value: &str) -> Result<Felt> {
    parse_felt(value).map_err(|_| BridgeError::Rpc(format!("node returned invalid felt {value}")))
}

fn felts_hex(values: &[Felt]) -> Vec<String> {
    values.iter().map(felt_hex).collect()
}

fn status_from_response(
    response: std::result::Result<RawStatus, JsonRpcError>,
) -> Result<L2TransactionStatus> {
    let raw = match response {
        Ok(raw) => raw,
        Err(err) if err.code == TXN_HASH_NOT_FOUND => {
            return Ok(L2TransactionStatus::new(FinalityStatus::NotFound))
        }
        Err(err) => return Err(BridgeError::Rpc(format!("starknet_getTransactionStatus: {err}"))),
    };
    Ok(L2TransactionStatus {
        finality_status: raw.finality_status.parse()?,
        execution_status: raw
            .execution_status
            .as_deref()
            .map(str::parse::<ExecutionStatus>)
            .transpose()?,
        failure_reason: raw.failure_reason,
    })
}

fn message_from_raw(raw: RawMessage) -> Result<MessageToL1> {
    Ok(MessageToL1 {
        from_address: rpc_felt(&raw.from_address)?,
        to_address: rpc_felt(&raw.to_address)?,
        payload: raw
            .payload
            .iter()
            .map(|item| rpc_felt(item))
            .collect::<Result<_>>()?,
    })
}

#[async_trait]
impl L2Chain for L2RpcClient {
    async fn chain_id(&self) -> Result<Felt> {
        let id: String = self.raw_rpc("starknet_chainId", json!([])).await?;
        rpc_felt(&id)
    }

    async fn call(&self, call: &FunctionCall) -> Result<Vec<Felt>> {
        let params = json!({
            "request": {
                "contract_address": felt_hex(&call.contract_address),
                "entry_point_selector": felt_hex(&call.entry_point_selector),
                "calldata": felts_hex(&call.calldata),
            },
            "block_id": "latest",
        });
        let result: Vec<String> = self.raw_rpc("starknet_call", params).await?;
        result.iter().map(|item| rpc_felt(item)).collect()
    }

    async fn nonce(&self, account: Felt) -> Result<Felt> {
        let params = json!({
            "block_id": "pending",
            "contract_address": felt_hex(&account),
        });
        let nonce: String = self.raw_rpc("starknet_getNonce", params).await?;
        rpc_felt(&nonce)
    }

    async fn add_invoke_transaction(&self, tx: &InvokeTransaction) -> Result<Felt> {
        let params = json!({
            "invoke_transaction": {
                "type": "INVOKE",
                "version": "0x1",
                "sender_address": felt_hex(&tx.sender_address),
                "calldata": felts_hex(&tx.calldata),
                "max_fee": felt_hex(&tx.max_fee),
                "signature": felts_hex(&tx.signature),
                "nonce": felt_hex(&tx.nonce),
            }
        });
        let result: AddInvokeResult = self
            .raw_rpc("starknet_addInvokeTransaction", params)
            .await?;
        rpc_felt(&result.transaction_hash)
    }

    async fn transaction_status(&self, tx_hash: Felt) -> Result<L2TransactionStatus> {
        let params = json!({ "transaction_hash": felt_hex(&tx_hash) });
        let response = self
            .request::<RawStatus>("starknet_getTransactionStatus", params)
            .await?;
        status_from_response(response)
    }

    async fn messages_sent(&self, tx_hash: Felt) -> Result<Vec<MessageToL1>> {
        let params = json!({ "transaction_hash": felt_hex(&tx_hash) });
        let receipt: RawReceipt = self
            .raw_rpc("starknet_getTransactionReceipt", params)
            .await?;
        receipt.messages_sent.into_iter().map(message_from_raw).collect()
    }

    async fn estimate_message_fee(&self, message: &MessageFromL1) -> Result<U256> {
        let params = json!({
            "message": {
                "from_address": format!("{:#x}", message.from_address),
                "to_address": felt_hex(&message.to_address),
                "entry_point_selector": felt_hex(&message.entry_point_selector),
                "payload": felts_hex(&message.payload),
            },
            "block_id": "latest",
        });
        let estimate: MessageFeeEstimate = self
            .raw_rpc("starknet_estimateMessageFee", params)
            .await?;
        let fee = rpc_felt(&estimate.overall_fee)
            .map(|fee| felt_to_u256(&fee))
            .or_else(|_| parse_u256(&estimate.overall_fee))?;
        Ok(fee)
    }
}
