//! Scripted `L1Chain` / `L2Chain` implementations for unit tests.

use crate::abi::{approveCall, balanceOfCall, depositCall, l2ToL1MessagesCall, withdrawCall};
use crate::chain::{
    FunctionCall, InvokeTransaction, L1Chain, L1Receipt, L2Chain, MessageFromL1, MessageToL1,
};
use crate::error::{BridgeError, Result};
use crate::signer::{invoke_v1_hash, load_l1_identity, load_l2_identity, Credentials};
use crate::types::{felt_hex, short_string, u256_split, ExecutionStatus, FinalityStatus, L2TransactionStatus};
use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_rpc_types::TransactionRequest;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{SolCall, SolValue};
use async_trait::async_trait;
use starknet_crypto::{get_public_key, Felt};
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

pub const L1_KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

/// Test identities: a well-known L1 key and a Cairo 0 account at `0xabc`.
pub fn credentials() -> Credentials {
    let l2_key = Felt::from_hex_unchecked("0x1234567890abcdef");
    Credentials {
        l1: load_l1_identity(L1_KEY).unwrap(),
        l2: load_l2_identity(
            &felt_hex(&get_public_key(&l2_key)),
            &felt_hex(&l2_key),
            "0xabc",
            0,
        )
        .unwrap(),
    }
}

/// Pops scripted values in order and keeps returning the last one.
struct Script<T: Clone> {
    queue: VecDeque<T>,
    last: Option<T>,
}

impl<T: Clone> Default for Script<T> {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            last: None,
        }
    }
}

impl<T: Clone> Script<T> {
    fn set(&mut self, values: Vec<T>) {
        self.queue = values.into();
        self.last = None;
    }

    fn next(&mut self) -> Option<T> {
        if let Some(value) = self.queue.pop_front() {
            self.last = Some(value);
        }
        self.last.clone()
    }
}

#[derive(Default)]
struct L1State {
    balance: U256,
    token_balance: U256,
    message_counts: Script<U256>,
    nonce: u64,
    sent: Vec<TransactionRequest>,
    reverting: HashSet<Address>,
    fail_sends: bool,
}

#[derive(Default)]
pub struct MockL1 {
    state: Mutex<L1State>,
}

impl MockL1 {
    pub fn with_balance(self, balance: U256) -> Self {
        self.state.lock().unwrap().balance = balance;
        self
    }

    pub fn with_token_balance(self, balance: U256) -> Self {
        self.state.lock().unwrap().token_balance = balance;
        self
    }

    /// Successive answers of `l2ToL1Messages`.
    pub fn with_message_counts(self, counts: Vec<u64>) -> Self {
        let counts = counts.into_iter().map(U256::from).collect();
        self.state.lock().unwrap().message_counts.set(counts);
        self
    }

    /// Transactions sent to `to` get a failed receipt.
    pub fn reverting(self, to: Address) -> Self {
        self.state.lock().unwrap().reverting.insert(to);
        self
    }

    pub fn failing_sends(self) -> Self {
        self.state.lock().unwrap().fail_sends = true;
        self
    }

    pub fn sent(&self) -> Vec<TransactionRequest> {
        self.state.lock().unwrap().sent.clone()
    }

    fn tx_hash(index: usize) -> B256 {
        keccak256(index.to_be_bytes())
    }
}

#[async_trait]
impl L1Chain for MockL1 {
    async fn balance(&self, _owner: Address) -> Result<U256> {
        Ok(self.state.lock().unwrap().balance)
    }

    async fn call(&self, _to: Address, data: Bytes) -> Result<Bytes> {
        let mut state = self.state.lock().unwrap();
        let selector: [u8; 4] = data
            .get(..4)
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or_else(|| BridgeError::Rpc("short calldata".to_string()))?;
        let value = if selector == balanceOfCall::SELECTOR {
            state.token_balance
        } else if selector == l2ToL1MessagesCall::SELECTOR {
            state.message_counts.next().unwrap_or_default()
        } else {
            return Err(BridgeError::Rpc("execution reverted".to_string()));
        };
        Ok(Bytes::from((value,).abi_encode()))
    }

    async fn pending_nonce(&self, _owner: Address) -> Result<u64> {
        Ok(self.state.lock().unwrap().nonce)
    }

    async fn send_transaction(
        &self,
        _signer: &PrivateKeySigner,
        request: TransactionRequest,
    ) -> Result<B256> {
        let mut state = self.state.lock().unwrap();
        if state.fail_sends {
            return Err(BridgeError::Rpc("insufficient funds for gas".to_string()));
        }
        state.sent.push(request);
        state.nonce += 1;
        Ok(Self::tx_hash(state.sent.len() - 1))
    }

    async fn receipt(&self, tx_hash: B256) -> Result<Option<L1Receipt>> {
        let state = self.state.lock().unwrap();
        let found = state
            .sent
            .iter()
            .enumerate()
            .find(|(index, _)| Self::tx_hash(*index) == tx_hash);
        Ok(found.map(|(index, request)| {
            let to = request.to.and_then(|kind| kind.to().copied());
            L1Receipt {
                tx_hash,
                block_number: Some(100 + index as u64),
                success: !to.is_some_and(|to| state.reverting.contains(&to)),
            }
        }))
    }
}

/// Which L1 bridge entry point a recorded request calls.
pub fn l1_entry_point(request: &TransactionRequest) -> &'static str {
    let data = request.input.input().cloned().unwrap_or_default();
    match data.get(..4) {
        Some(selector) if selector == &depositCall::SELECTOR => "deposit",
        Some(selector) if selector == &withdrawCall::SELECTOR => "withdraw",
        Some(selector) if selector == &approveCall::SELECTOR => "approve",
        _ => "unknown",
    }
}

struct L2State {
    nonce: Felt,
    balances: Script<U256>,
    statuses: Script<L2TransactionStatus>,
    messages: Vec<MessageToL1>,
    message_fee: U256,
    calls: Vec<FunctionCall>,
    submitted: Vec<InvokeTransaction>,
    fee_requests: Vec<MessageFromL1>,
    fail_submissions: bool,
}

impl Default for L2State {
    fn default() -> Self {
        Self {
            nonce: Felt::ZERO,
            balances: Script::default(),
            statuses: Script::default(),
            messages: Vec::new(),
            message_fee: U256::from(1_000u64),
            calls: Vec::new(),
            submitted: Vec::new(),
            fee_requests: Vec::new(),
            fail_submissions: false,
        }
    }
}

#[derive(Default)]
pub struct MockL2 {
    state: Mutex<L2State>,
}

impl MockL2 {
    pub fn chain_id_value(&self) -> Felt {
        short_string("SN_SEPOLIA")
    }

    pub fn with_nonce(self, nonce: Felt) -> Self {
        self.state.lock().unwrap().nonce = nonce;
        self
    }

    pub fn with_l2_balance(self, balance: U256) -> Self {
        self.with_l2_balances(vec![balance])
    }

    /// Successive answers of `balanceOf`.
    pub fn with_l2_balances(self, balances: Vec<U256>) -> Self {
        self.state.lock().unwrap().balances.set(balances);
        self
    }

    /// Successive answers of `starknet_getTransactionStatus`.
    pub fn with_statuses(self, statuses: Vec<L2TransactionStatus>) -> Self {
        self.state.lock().unwrap().statuses.set(statuses);
        self
    }

    pub fn with_messages(self, messages: Vec<MessageToL1>) -> Self {
        self.state.lock().unwrap().messages = messages;
        self
    }

    pub fn with_message_fee(self, fee: U256) -> Self {
        self.state.lock().unwrap().message_fee = fee;
        self
    }

    pub fn failing_submissions(self) -> Self {
        self.state.lock().unwrap().fail_submissions = true;
        self
    }

    pub fn calls(&self) -> Vec<FunctionCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn submitted(&self) -> Vec<InvokeTransaction> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub fn fee_requests(&self) -> Vec<MessageFromL1> {
        self.state.lock().unwrap().fee_requests.clone()
    }
}

pub fn accepted() -> L2TransactionStatus {
    L2TransactionStatus {
        finality_status: FinalityStatus::AcceptedOnL2,
        execution_status: Some(ExecutionStatus::Succeeded),
        failure_reason: None,
    }
}

pub fn received() -> L2TransactionStatus {
    L2TransactionStatus::new(FinalityStatus::Received)
}

#[async_trait]
impl L2Chain for MockL2 {
    async fn chain_id(&self) -> Result<Felt> {
        Ok(self.chain_id_value())
    }

    async fn call(&self, call: &FunctionCall) -> Result<Vec<Felt>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call.clone());
        let (low, high) = u256_split(state.balances.next().unwrap_or_default());
        Ok(vec![low, high])
    }

    async fn nonce(&self, _account: Felt) -> Result<Felt> {
        Ok(self.state.lock().unwrap().nonce)
    }

    async fn add_invoke_transaction(&self, tx: &InvokeTransaction) -> Result<Felt> {
        let mut state = self.state.lock().unwrap();
        if state.fail_submissions {
            return Err(BridgeError::Rpc("invalid transaction nonce".to_string()));
        }
        state.submitted.push(tx.clone());
        Ok(invoke_v1_hash(
            tx.sender_address,
            &tx.calldata,
            tx.max_fee,
            short_string("SN_SEPOLIA"),
            tx.nonce,
        ))
    }

    async fn transaction_status(&self, _tx_hash: Felt) -> Result<L2TransactionStatus> {
        let mut state = self.state.lock().unwrap();
        Ok(state.statuses.next().unwrap_or_else(accepted))
    }

    async fn messages_sent(&self, _tx_hash: Felt) -> Result<Vec<MessageToL1>> {
        Ok(self.state.lock().unwrap().messages.clone())
    }

    async fn estimate_message_fee(&self, message: &MessageFromL1) -> Result<U256> {
        let mut state = self.state.lock().unwrap();
        state.fee_requests.push(message.clone());
        Ok(state.message_fee)
    }
}
