use super::{FlowError, FlowSettings};
use crate::abi::{encode_approve_call, encode_deposit_call, selector, HANDLE_DEPOSIT};
use crate::balance::{l1_balance, l1_token_balance, l2_balance};
use crate::chain::{L1Chain, L2Chain, MessageFromL1};
use crate::error::{BridgeError, ChainSide, Result};
use crate::registry::TokenDescriptor;
use crate::signer::L1Identity;
use crate::types::{
    felt_hex, parse_b256, u256_split, OperationStatus, PendingOperation, TokenAmount,
};
use alloy_primitives::U256;
use alloy_rpc_types::{TransactionInput, TransactionRequest};
use serde::Serialize;
use starknet_crypto::Felt;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DepositState {
    Idle,
    BalanceVerified,
    L1DepositSubmitted,
    L1DepositIncluded,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct DepositRequest {
    pub token: TokenDescriptor,
    pub amount: U256,
    pub l2_recipient: Felt,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositCheckpoint {
    pub token: String,
    pub amount: String,
    pub l2_recipient: String,
    pub message_fee: Option<String>,
    pub approve_tx_hash: Option<String>,
    pub l1_tx_hash: Option<String>,
}

pub type DepositError = FlowError<DepositState, DepositCheckpoint>;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositOutcome {
    pub state: DepositState,
    pub checkpoint: DepositCheckpoint,
    pub l1_balance: TokenAmount,
    pub l2_balance_before: TokenAmount,
    pub l2_balance_after: TokenAmount,
    pub l1_deposit: PendingOperation,
}

struct Balances {
    l1: TokenAmount,
    l2_start: TokenAmount,
}

pub struct DepositFlow<'a> {
    l1: &'a dyn L1Chain,
    l2: &'a dyn L2Chain,
    l1_identity: &'a L1Identity,
    settings: FlowSettings,
    state: DepositState,
    checkpoint: DepositCheckpoint,
}

impl<'a> DepositFlow<'a> {
    pub fn new(
        l1: &'a dyn L1Chain,
        l2: &'a dyn L2Chain,
        l1_identity: &'a L1Identity,
        settings: FlowSettings,
    ) -> Self {
        Self {
            l1,
            l2,
            l1_identity,
            settings,
            state: DepositState::Idle,
            checkpoint: DepositCheckpoint::default(),
        }
    }

    pub async fn run(
        mut self,
        request: &DepositRequest,
    ) -> std::result::Result<DepositOutcome, DepositError> {
        self.checkpoint = DepositCheckpoint {
            token: request.token.symbol.clone(),
            amount: request.amount.to_string(),
            l2_recipient: felt_hex(&request.l2_recipient),
            ..DepositCheckpoint::default()
        };

        let balances = self.verify_balances(request).await;
        let balances = self.check("balance check", balances)?;
        self.transition(DepositState::BalanceVerified);

        let fee = self.message_fee(request).await;
        let fee = self.check("message fee", fee)?;
        self.checkpoint.message_fee = Some(fee.to_string());

        if !request.token.is_native() {
            let approved = self.approve(request).await;
            self.check("approve", approved)?;
        }

        let submitted = self.submit(request, fee).await;
        let mut operation = self.check("L1 deposit submission", submitted)?;
        self.checkpoint.l1_tx_hash = Some(operation.tx.hash.clone());
        self.transition(DepositState::L1DepositSubmitted);

        let included = self.await_inclusion(&mut operation).await;
        self.check("L1 deposit inclusion", included)?;
        self.transition(DepositState::L1DepositIncluded);

        let credited = self.await_credit(request, &balances.l2_start).await;
        let l2_balance_after = self.check("L2 credit", credited)?;
        self.transition(DepositState::Completed);

        Ok(DepositOutcome {
            state: self.state,
            checkpoint: self.checkpoint,
            l1_balance: balances.l1,
            l2_balance_before: balances.l2_start,
            l2_balance_after,
            l1_deposit: operation,
        })
    }

    async fn verify_balances(&self, request: &DepositRequest) -> Result<Balances> {
        let owner = self.l1_identity.address();
        let native = l1_balance(self.l1, owner).await?;
        if !native.is_positive() {
            return Err(BridgeError::InsufficientFunds {
                side: ChainSide::L1,
                symbol: "ETH".to_string(),
                balance: native.to_string(),
            });
        }

        let token = l1_token_balance(self.l1, &request.token, owner).await?;
        if !token.is_positive() || token.raw < request.amount {
            return Err(BridgeError::InsufficientFunds {
                side: ChainSide::L1,
                symbol: request.token.symbol.clone(),
                balance: token.to_string(),
            });
        }

        let l2_start = l2_balance(self.l2, &request.token, request.l2_recipient).await?;
        info!(l1_balance = %token, l2_balance = %l2_start, token = %request.token.symbol, "balances");
        Ok(Balances { l1: token, l2_start })
    }

    async fn message_fee(&self, request: &DepositRequest) -> Result<U256> {
        if let Some(fee) = self.settings.deposit_message_fee {
            return Ok(fee);
        }
        let (low, high) = u256_split(request.amount);
        let message = MessageFromL1 {
            from_address: request.token.l1_bridge,
            to_address: request.token.l2_bridge,
            entry_point_selector: selector(HANDLE_DEPOSIT),
            payload: vec![request.l2_recipient, low, high],
        };
        let fee = self.l2.estimate_message_fee(&message).await?;
        info!(fee = %fee, "estimated L1->L2 message fee");
        Ok(fee)
    }

    async fn approve(&mut self, request: &DepositRequest) -> Result<()> {
        let tx = TransactionRequest {
            to: Some(request.token.l1_token.into()),
            input: TransactionInput::new(encode_approve_call(
                request.token.l1_bridge,
                request.amount,
            )),
            ..Default::default()
        };
        let approval = self.l1_identity.send(self.l1, tx).await?;
        self.checkpoint.approve_tx_hash = Some(approval.tx.hash.clone());

        let tx_hash = parse_b256(&approval.tx.hash)?;
        let receipt = self
            .settings
            .poller
            .await_l1_receipt(self.l1, tx_hash)
            .await?;
        if !receipt.success {
            return Err(BridgeError::Rejected {
                side: ChainSide::L1,
                tx_hash: approval.tx.hash,
                reason: "approve reverted".to_string(),
            });
        }
        Ok(())
    }

    async fn submit(&self, request: &DepositRequest, fee: U256) -> Result<PendingOperation> {
        let value = if request.token.is_native() {
            request
                .amount
                .checked_add(fee)
                .ok_or_else(|| BridgeError::config("deposit value overflows uint256"))?
        } else {
            fee
        };
        let tx = TransactionRequest {
            to: Some(request.token.l1_bridge.into()),
            input: TransactionInput::new(encode_deposit_call(
                request.amount,
                &request.l2_recipient,
            )),
            value: Some(value),
            ..Default::default()
        };
        self.l1_identity.send(self.l1, tx).await
    }

    async fn await_inclusion(&self, operation: &mut PendingOperation) -> Result<()> {
        let tx_hash = parse_b256(&operation.tx.hash)?;
        operation.advance(OperationStatus::Pending);
        let receipt = self
            .settings
            .poller
            .await_l1_receipt(self.l1, tx_hash)
            .await?;
        if !receipt.success {
            operation.advance(OperationStatus::Rejected);
            return Err(BridgeError::Rejected {
                side: ChainSide::L1,
                tx_hash: operation.tx.hash.clone(),
                reason: "deposit reverted".to_string(),
            });
        }
        operation.advance(OperationStatus::Finalized);
        info!(tx_hash = %operation.tx.hash, block = ?receipt.block_number, "deposit included");
        Ok(())
    }

    async fn await_credit(
        &self,
        request: &DepositRequest,
        start: &TokenAmount,
    ) -> Result<TokenAmount> {
        let target = start.raw.saturating_add(request.amount);
        let l2 = self.l2;
        let token = &request.token;
        let recipient = request.l2_recipient;
        let label = format!("L2 credit of {} {}", request.amount, token.symbol);
        self.settings
            .message_poller()
            .await_status(
                &label,
                move || l2_balance(l2, token, recipient),
                |balance| balance.raw >= target,
            )
            .await
    }

    fn transition(&mut self, next: DepositState) {
        info!(flow = "deposit", from = ?self.state, to = ?next, "state transition");
        self.state = next;
    }

    fn check<T>(
        &mut self,
        step: &'static str,
        result: Result<T>,
    ) -> std::result::Result<T, DepositError> {
        result.map_err(|source| {
            let reached = self.state;
            tracing::error!(flow = "deposit", step, reached = ?reached, error = %source, "flow failed");
            self.state = DepositState::Failed;
            FlowError {
                reached,
                step,
                source,
                checkpoint: self.checkpoint.clone(),
            }
        })
    }
}
