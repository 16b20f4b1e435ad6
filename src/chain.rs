//! The chain operations the bridge flows depend on.
//!
//! Flows only talk to these traits; `rpc` provides the JSON-RPC backed
//! implementations and tests provide scripted ones.

use crate::error::Result;
use crate::types::L2TransactionStatus;
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_rpc_types::TransactionRequest;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use starknet_crypto::Felt;

/// Read-only contract call on Starknet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionCall {
    pub contract_address: Felt,
    pub entry_point_selector: Felt,
    pub calldata: Vec<Felt>,
}

/// A signed v1 invoke transaction ready for `starknet_addInvokeTransaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeTransaction {
    pub sender_address: Felt,
    pub calldata: Vec<Felt>,
    pub max_fee: Felt,
    pub signature: Vec<Felt>,
    pub nonce: Felt,
}

/// A message sent from L2 to L1, as listed in the L2 receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageToL1 {
    pub from_address: Felt,
    pub to_address: Felt,
    pub payload: Vec<Felt>,
}

/// A message sent from L1 to L2, used to estimate the deposit fee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageFromL1 {
    pub from_address: Address,
    pub to_address: Felt,
    pub entry_point_selector: Felt,
    pub payload: Vec<Felt>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct L1Receipt {
    pub tx_hash: B256,
    pub block_number: Option<u64>,
    pub success: bool,
}

#[async_trait]
pub trait L1Chain: Send + Sync {
    async fn balance(&self, owner: Address) -> Result<U256>;

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes>;

    /// Nonce for the next transaction, counting pending ones.
    async fn pending_nonce(&self, owner: Address) -> Result<u64>;

    /// Sign `request` with `signer` and broadcast it. The request carries its
    /// nonce; the remaining fields are filled by the implementation.
    async fn send_transaction(
        &self,
        signer: &PrivateKeySigner,
        request: TransactionRequest,
    ) -> Result<B256>;

    async fn receipt(&self, tx_hash: B256) -> Result<Option<L1Receipt>>;
}

#[async_trait]
pub trait L2Chain: Send + Sync {
    async fn chain_id(&self) -> Result<Felt>;

    async fn call(&self, call: &FunctionCall) -> Result<Vec<Felt>>;

    async fn nonce(&self, account: Felt) -> Result<Felt>;

    async fn add_invoke_transaction(&self, tx: &InvokeTransaction) -> Result<Felt>;

    async fn transaction_status(&self, tx_hash: Felt) -> Result<L2TransactionStatus>;

    async fn messages_sent(&self, tx_hash: Felt) -> Result<Vec<MessageToL1>>;

    /// Fee in wei to attach to an L1->L2 message.
    async fn estimate_message_fee(&self, message: &MessageFromL1) -> Result<U256>;
}
