use crate::chain::MessageToL1;
use crate::error::{BridgeError, Result};
use crate::types::{felt_to_u256, u256_to_felt};
use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::{SolCall, SolValue};
use starknet_crypto::Felt;

alloy_sol_types::sol! {
    // StarkGate legacy bridge (StarknetEthBridge / StarknetERC20Bridge)
    function deposit(uint256 amount, uint256 l2Recipient) payable;
    function withdraw(uint256 amount, address recipient);

    // StarknetCore messaging
    function l2ToL1Messages(bytes32 msgHash) view returns (uint256);

    function balanceOf(address account) view returns (uint256);
    function approve(address spender, uint256 value) returns (bool);
}

pub const INITIATE_WITHDRAW: &str = "initiate_withdraw";
pub const HANDLE_DEPOSIT: &str = "handle_deposit";
pub const BALANCE_OF: &str = "balanceOf";

/// Starknet entry point selector: keccak256 of the name truncated to 250 bits.
pub fn selector(name: &str) -> Felt {
    let mut hash = keccak256(name.as_bytes()).0;
    hash[0] &= 0x03;
    Felt::from_bytes_be(&hash)
}

/// L2 calldata for `initiate_withdraw`: `[l1_recipient, amount]`.
pub fn initiate_withdraw_calldata(l1_recipient: Address, amount: U256) -> Result<Vec<Felt>> {
    let amount = u256_to_felt(amount)
        .ok_or_else(|| BridgeError::config(format!("amount {amount} does not fit a felt")))?;
    Ok(vec![crate::types::address_to_felt(l1_recipient), amount])
}

pub fn encode_withdraw_call(amount: U256, recipient: Address) -> Bytes {
    let call = withdrawCall { amount, recipient };
    Bytes::from(call.abi_encode())
}

pub fn encode_deposit_call(amount: U256, l2_recipient: &Felt) -> Bytes {
    let call = depositCall {
        amount,
        l2Recipient: felt_to_u256(l2_recipient),
    };
    Bytes::from(call.abi_encode())
}

pub fn encode_l2_to_l1_messages_call(msg_hash: B256) -> Bytes {
    let call = l2ToL1MessagesCall { msgHash: msg_hash };
    Bytes::from(call.abi_encode())
}

pub fn encode_balance_of_call(account: Address) -> Bytes {
    let call = balanceOfCall { account };
    Bytes::from(call.abi_encode())
}

pub fn encode_approve_call(spender: Address, value: U256) -> Bytes {
    let call = approveCall { spender, value };
    Bytes::from(call.abi_encode())
}

pub fn decode_u256(data: Bytes) -> Result<U256> {
    let value: (U256,) = <(U256,)>::abi_decode(&data)
        .map_err(|err| BridgeError::Rpc(format!("failed to decode uint256: {err}")))?;
    Ok(value.0)
}

/// Hash under which StarknetCore registers an L2->L1 message:
/// `keccak256(from ‖ to ‖ payload.len ‖ payload)`, each a 32-byte word.
pub fn l2_to_l1_message_hash(message: &MessageToL1) -> B256 {
    let mut words = Vec::with_capacity((3 + message.payload.len()) * 32);
    words.extend_from_slice(&message.from_address.to_bytes_be());
    words.extend_from_slice(&message.to_address.to_bytes_be());
    words.extend_from_slice(&U256::from(message.payload.len()).to_be_bytes::<32>());
    for item in &message.payload {
        words.extend_from_slice(&item.to_bytes_be());
    }
    keccak256(words)
}

/// Decode a Starknet u256 return value, `[low, high]` or a single felt.
pub fn decode_l2_u256(values: &[Felt]) -> Result<U256> {
    match values {
        [single] => Ok(felt_to_u256(single)),
        [low, high, ..] => {
            let low = felt_to_u256(low);
            let high = felt_to_u256(high);
            if low > U256::from(u128::MAX) || high > U256::from(u128::MAX) {
                return Err(BridgeError::Rpc("u256 limb out of range".to_string()));
            }
            Ok((high << 128usize) | low)
        }
        [] => Err(BridgeError::Rpc("empty call result".to_string())),
    }
}
