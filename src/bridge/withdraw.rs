use super::{FlowError, FlowSettings};
use crate::abi::{
    decode_l2_u256, decode_u256, encode_l2_to_l1_messages_call, encode_withdraw_call, initiate_withdraw_calldata,
    l2_to_l1_message_hash, selector, INITIATE_WITHDRAW,
};
use crate::balance::{l1_balance, l2_balance};
use crate::chain::{FunctionCall, L1Chain, L2Chain, MessageToL1};
use crate::error::{BridgeError, ChainSide, Result};
use crate::registry::TokenDescriptor;
use crate::signer::{L1Identity, L2Identity};
use crate::types::{
    address_to_felt, felt_hex, parse_b256, parse_felt, OperationStatus, PendingOperation,
    TokenAmount,
};
use alloy_primitives::{Address, B256, U256};
use alloy_rpc_types::{TransactionInput, TransactionRequest};
use serde::Serialize;
use starknet_crypto::Felt;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WithdrawState {
    Idle,
    BalanceVerified,
    L2WithdrawSubmitted,
    L2WithdrawFinalized,
    L1MessageConsumable,
    L1ClaimSubmitted,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct WithdrawRequest {
    pub token: TokenDescriptor,
    pub amount: U256,
    pub l1_recipient: Address,
    /// Stop once the message is consumable instead of claiming it.
    pub skip_claim: bool,
}

/// What has been submitted so far; enough to resume or claim by hand.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawCheckpoint {
    pub token: String,
    pub amount: String,
    pub l1_recipient: String,
    pub l2_tx_hash: Option<String>,
    pub message_hash: Option<String>,
    pub l1_tx_hash: Option<String>,
}

pub type WithdrawError = FlowError<WithdrawState, WithdrawCheckpoint>;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawOutcome {
    pub state: WithdrawState,
    pub checkpoint: WithdrawCheckpoint,
    pub l1_balance: Option<TokenAmount>,
    pub l2_balance: Option<TokenAmount>,
    pub l2_withdraw: PendingOperation,
    pub l1_claim: Option<PendingOperation>,
}

/// An L2->L1 message that StarknetCore reports as consumable. Only the
/// consumability check constructs one, and the claim requires it. The claim
/// amount is the one carried in the message payload.
#[derive(Debug)]
pub struct ConsumableMessage {
    message: MessageToL1,
    hash: B256,
    amount: U256,
}

impl ConsumableMessage {
    pub fn hash(&self) -> B256 {
        self.hash
    }

    pub fn amount(&self) -> U256 {
        self.amount
    }

    pub fn message(&self) -> &MessageToL1 {
        &self.message
    }
}

pub struct WithdrawFlow<'a> {
    l1: &'a dyn L1Chain,
    l2: &'a dyn L2Chain,
    l1_identity: &'a L1Identity,
    l2_identity: &'a L2Identity,
    core_contract: Address,
    settings: FlowSettings,
    state: WithdrawState,
    checkpoint: WithdrawCheckpoint,
}

impl<'a> WithdrawFlow<'a> {
    pub fn new(
        l1: &'a dyn L1Chain,
        l2: &'a dyn L2Chain,
        l1_identity: &'a L1Identity,
        l2_identity: &'a L2Identity,
        core_contract: Address,
        settings: FlowSettings,
    ) -> Self {
        Self {
            l1,
            l2,
            l1_identity,
            l2_identity,
            core_contract,
            settings,
            state: WithdrawState::Idle,
            checkpoint: WithdrawCheckpoint::default(),
        }
    }

    /// Run the whole withdrawal from the balance check.
    pub async fn run(
        mut self,
        request: &WithdrawRequest,
    ) -> std::result::Result<WithdrawOutcome, WithdrawError> {
        self.start(request);

        let balances = self.verify_balances(request).await;
        let (l1_balance, l2_balance) = self.check("balance check", balances)?;
        self.transition(WithdrawState::BalanceVerified);

        let submitted = self.submit(request).await;
        let operation = self.check("L2 withdraw submission", submitted)?;
        self.checkpoint.l2_tx_hash = Some(operation.tx.hash.clone());
        self.transition(WithdrawState::L2WithdrawSubmitted);

        let mut outcome = self.finish(request, operation).await?;
        outcome.l1_balance = Some(l1_balance);
        outcome.l2_balance = Some(l2_balance);
        Ok(outcome)
    }

    /// Continue a withdrawal whose L2 transaction was already submitted.
    pub async fn resume(
        mut self,
        request: &WithdrawRequest,
        l2_tx_hash: Felt,
    ) -> std::result::Result<WithdrawOutcome, WithdrawError> {
        self.start(request);
        let operation = PendingOperation::submitted(ChainSide::L2, felt_hex(&l2_tx_hash));
        self.checkpoint.l2_tx_hash = Some(operation.tx.hash.clone());
        info!(tx_hash = %operation.tx.hash, "resuming withdrawal");
        self.transition(WithdrawState::L2WithdrawSubmitted);
        self.finish(request, operation).await
    }

    fn start(&mut self, request: &WithdrawRequest) {
        self.checkpoint = WithdrawCheckpoint {
            token: request.token.symbol.clone(),
            amount: request.amount.to_string(),
            l1_recipient: format!("{:#x}", request.l1_recipient),
            ..WithdrawCheckpoint::default()
        };
    }

    async fn finish(
        mut self,
        request: &WithdrawRequest,
        mut operation: PendingOperation,
    ) -> std::result::Result<WithdrawOutcome, WithdrawError> {
        let finality = self.await_finality(&mut operation).await;
        let tx_hash = self.check("L2 finality", finality)?;
        self.transition(WithdrawState::L2WithdrawFinalized);

        let consumable = self.await_consumable(request, tx_hash).await;
        let consumable = self.check("message consumability", consumable)?;
        self.transition(WithdrawState::L1MessageConsumable);

        if request.skip_claim {
            info!(message_hash = %consumable.hash(), "claim skipped");
            return Ok(self.outcome(operation, None));
        }

        let claim = self.claim(request, &consumable).await;
        let claim = self.check("L1 claim submission", claim)?;
        self.checkpoint.l1_tx_hash = Some(claim.tx.hash.clone());
        self.transition(WithdrawState::L1ClaimSubmitted);

        let mut claim = claim;
        let included = self.await_claim(&mut claim).await;
        self.check("L1 claim inclusion", included)?;
        self.transition(WithdrawState::Completed);
        Ok(self.outcome(operation, Some(claim)))
    }

    async fn verify_balances(&self, request: &WithdrawRequest) -> Result<(TokenAmount, TokenAmount)> {
        let l1 = l1_balance(self.l1, self.l1_identity.address()).await?;
        let l2 = l2_balance(self.l2, &request.token, self.l2_identity.address()).await?;
        info!(l1_balance = %l1, l2_balance = %l2, token = %request.token.symbol, "balances");

        if !l1.is_positive() {
            return Err(BridgeError::InsufficientFunds {
                side: ChainSide::L1,
                symbol: "ETH".to_string(),
                balance: l1.to_string(),
            });
        }
        if !l2.is_positive() || l2.raw < request.amount {
            return Err(BridgeError::InsufficientFunds {
                side: ChainSide::L2,
                symbol: request.token.symbol.clone(),
                balance: l2.to_string(),
            });
        }
        Ok((l1, l2))
    }

    async fn submit(&self, request: &WithdrawRequest) -> Result<PendingOperation> {
        let call = FunctionCall {
            contract_address: request.token.l2_bridge,
            entry_point_selector: selector(INITIATE_WITHDRAW),
            calldata: initiate_withdraw_calldata(request.l1_recipient, request.amount)?,
        };
        self.l2_identity
            .invoke(self.l2, &[call], self.settings.l2_max_fee)
            .await
    }

    async fn await_finality(&self, operation: &mut PendingOperation) -> Result<Felt> {
        let tx_hash = parse_felt(&operation.tx.hash)?;
        operation.advance(OperationStatus::Pending);
        let status = self
            .settings
            .poller
            .await_l2_transaction(self.l2, tx_hash)
            .await?;
        if status.is_rejected() {
            operation.advance(OperationStatus::Rejected);
            return Err(BridgeError::Rejected {
                side: ChainSide::L2,
                tx_hash: operation.tx.hash.clone(),
                reason: status
                    .failure_reason
                    .unwrap_or_else(|| format!("{:?}", status.finality_status)),
            });
        }
        operation.advance(OperationStatus::Finalized);
        Ok(tx_hash)
    }

    async fn await_consumable(
        &mut self,
        request: &WithdrawRequest,
        tx_hash: Felt,
    ) -> Result<ConsumableMessage> {
        let messages = self.l2.messages_sent(tx_hash).await?;
        let (message, amount) = find_withdrawal_message(messages, request).ok_or_else(|| {
            BridgeError::Rejected {
                side: ChainSide::L2,
                tx_hash: felt_hex(&tx_hash),
                reason: format!(
                    "receipt has no withdrawal of {} to {:#x} for the L1 bridge",
                    request.amount, request.l1_recipient
                ),
            }
        })?;
        let hash = l2_to_l1_message_hash(&message);
        self.checkpoint.message_hash = Some(format!("{hash:#x}"));
        info!(message_hash = %hash, "waiting for message to become consumable on L1");

        let label = format!("L2->L1 message {hash:#x}");
        let l1 = self.l1;
        let core = self.core_contract;
        self.settings
            .message_poller()
            .await_status(
                &label,
                move || async move {
                    let data = l1.call(core, encode_l2_to_l1_messages_call(hash)).await?;
                    decode_u256(data)
                },
                |count| *count > U256::ZERO,
            )
            .await?;
        Ok(ConsumableMessage {
            message,
            hash,
            amount,
        })
    }

    async fn claim(
        &self,
        request: &WithdrawRequest,
        consumable: &ConsumableMessage,
    ) -> Result<PendingOperation> {
        info!(
            message_hash = %consumable.hash(),
            l2_sender = %felt_hex(&consumable.message().from_address),
            bridge = %request.token.l1_bridge,
            amount = %consumable.amount(),
            "claiming on L1"
        );
        let tx = TransactionRequest {
            to: Some(request.token.l1_bridge.into()),
            input: TransactionInput::new(encode_withdraw_call(
                consumable.amount(),
                request.l1_recipient,
            )),
            ..Default::default()
        };
        self.l1_identity.send(self.l1, tx).await
    }

    async fn await_claim(&self, claim: &mut PendingOperation) -> Result<()> {
        let tx_hash = parse_b256(&claim.tx.hash)?;
        claim.advance(OperationStatus::Pending);
        let receipt = self
            .settings
            .poller
            .await_l1_receipt(self.l1, tx_hash)
            .await?;
        if !receipt.success {
            claim.advance(OperationStatus::Rejected);
            return Err(BridgeError::ClaimRejected {
                tx_hash: claim.tx.hash.clone(),
            });
        }
        claim.advance(OperationStatus::Finalized);
        info!(tx_hash = %claim.tx.hash, block = ?receipt.block_number, "claim included");
        Ok(())
    }

    fn transition(&mut self, next: WithdrawState) {
        info!(flow = "withdraw", from = ?self.state, to = ?next, "state transition");
        self.state = next;
    }

    fn check<T>(&mut self, step: &'static str, result: Result<T>) -> std::result::Result<T, WithdrawError> {
        result.map_err(|source| {
            let reached = self.state;
            tracing::error!(flow = "withdraw", step, reached = ?reached, error = %source, "flow failed");
            self.state = WithdrawState::Failed;
            FlowError {
                reached,
                step,
                source,
                checkpoint: self.checkpoint.clone(),
            }
        })
    }

    fn outcome(self, l2_withdraw: PendingOperation, l1_claim: Option<PendingOperation>) -> WithdrawOutcome {
        WithdrawOutcome {
            state: self.state,
            checkpoint: self.checkpoint,
            l1_balance: None,
            l2_balance: None,
            l2_withdraw,
            l1_claim,
        }
    }
}

/// The bridge's message to its L1 counterpart carrying exactly the requested
/// amount, addressed to `l1_recipient`. Returns the message with its amount.
fn find_withdrawal_message(
    messages: Vec<MessageToL1>,
    request: &WithdrawRequest,
) -> Option<(MessageToL1, U256)> {
    let l1_bridge = address_to_felt(request.token.l1_bridge);
    let recipient = address_to_felt(request.l1_recipient);
    messages.into_iter().find_map(|message| {
        let amount = message_amount(&message)?;
        let matches = message.from_address == request.token.l2_bridge
            && message.to_address == l1_bridge
            && message.payload.get(1) == Some(&recipient)
            && amount == request.amount;
        matches.then_some((message, amount))
    })
}

/// Withdrawal payload is `[kind, l1_recipient, amount_low, amount_high]`.
fn message_amount(message: &MessageToL1) -> Option<U256> {
    decode_l2_u256(message.payload.get(2..4)?).ok()
}
