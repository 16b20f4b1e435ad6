use crate::abi::{decode_l2_u256, decode_u256, encode_balance_of_call, selector, BALANCE_OF};
use crate::chain::{FunctionCall, L1Chain, L2Chain};
use crate::error::Result;
use crate::registry::TokenDescriptor;
use crate::types::{TokenAmount, ETH_DECIMALS};
use alloy_primitives::Address;
use starknet_crypto::Felt;

/// Native ETH held by `owner` on L1.
pub async fn l1_balance(chain: &dyn L1Chain, owner: Address) -> Result<TokenAmount> {
    let raw = chain.balance(owner).await?;
    Ok(TokenAmount::new(raw, ETH_DECIMALS))
}

/// Balance of `token` on L1. Native ETH falls back to the account balance.
pub async fn l1_token_balance(
    chain: &dyn L1Chain,
    token: &TokenDescriptor,
    owner: Address,
) -> Result<TokenAmount> {
    if token.is_native() {
        return l1_balance(chain, owner).await;
    }
    let data = chain
        .call(token.l1_token, encode_balance_of_call(owner))
        .await?;
    Ok(TokenAmount::new(decode_u256(data)?, token.decimals))
}

/// Balance of `token` held by `account` on L2, via the token's `balanceOf`.
pub async fn l2_balance(
    chain: &dyn L2Chain,
    token: &TokenDescriptor,
    account: Felt,
) -> Result<TokenAmount> {
    let call = FunctionCall {
        contract_address: token.l2_token,
        entry_point_selector: selector(BALANCE_OF),
        calldata: vec![account],
    };
    let result = chain.call(&call).await?;
    Ok(TokenAmount::new(decode_l2_u256(&result)?, token.decimals))
}
