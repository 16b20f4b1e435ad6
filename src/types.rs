use crate::error::{BridgeError, ChainSide, Result};
use alloy_primitives::{Address, B256, U256};
use serde::{Serialize, Serializer};
use starknet_crypto::Felt;
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

/// Starknet field prime, 2^251 + 17 * 2^192 + 1.
pub const FIELD_PRIME: U256 = U256::from_limbs([1, 0, 0, 0x0800_0000_0000_0011]);

pub const ETH_DECIMALS: u8 = 18;

pub fn parse_address(value: &str) -> Result<Address> {
    Address::from_str(value.trim())
        .map_err(|err| BridgeError::InvalidAddress(format!("{value}: {err}")))
}

pub fn parse_b256(value: &str) -> Result<B256> {
    B256::from_str(value.trim())
        .map_err(|err| BridgeError::config(format!("invalid bytes32 {value}: {err}")))
}

pub fn parse_u256(value: &str) -> Result<U256> {
    U256::from_str(value.trim())
        .map_err(|err| BridgeError::config(format!("invalid uint256 {value}: {err}")))
}

/// Parse a hex field element. Values at or above the field prime are rejected
/// instead of being reduced.
pub fn parse_felt(value: &str) -> Result<Felt> {
    let trimmed = value.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() || digits.len() > 64 {
        return Err(BridgeError::InvalidAddress(format!("{value}: not a felt")));
    }
    let raw = U256::from_str_radix(digits, 16)
        .map_err(|err| BridgeError::InvalidAddress(format!("{value}: {err}")))?;
    u256_to_felt(raw).ok_or_else(|| BridgeError::InvalidAddress(format!("{value}: exceeds field prime")))
}

pub fn u256_to_felt(value: U256) -> Option<Felt> {
    if value >= FIELD_PRIME {
        return None;
    }
    Some(Felt::from_bytes_be(&value.to_be_bytes::<32>()))
}

pub fn felt_to_u256(value: &Felt) -> U256 {
    U256::from_be_bytes(value.to_bytes_be())
}

pub fn address_to_felt(address: Address) -> Felt {
    Felt::from_bytes_be_slice(address.as_slice())
}

/// Canonical `0x` hex without leading zeros, as the Starknet RPC expects.
pub fn felt_hex(value: &Felt) -> String {
    format!("{:#x}", felt_to_u256(value))
}

/// Encode an ASCII string of at most 31 bytes as a felt.
pub fn short_string(value: &str) -> Felt {
    Felt::from_bytes_be_slice(value.as_bytes())
}

pub fn serialize_felt<S: Serializer>(value: &Felt, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&felt_hex(value))
}

/// Split a u256 into the `(low, high)` 128-bit halves Cairo uses.
pub fn u256_split(value: U256) -> (Felt, Felt) {
    let mask = U256::from(u128::MAX);
    let low = value & mask;
    let high = value >> 128usize;
    (
        Felt::from_bytes_be(&low.to_be_bytes::<32>()),
        Felt::from_bytes_be(&high.to_be_bytes::<32>()),
    )
}

/// An exact token amount with its decimal precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenAmount {
    pub raw: U256,
    pub decimals: u8,
}

impl TokenAmount {
    pub fn new(raw: U256, decimals: u8) -> Self {
        Self { raw, decimals }
    }

    pub fn is_positive(&self) -> bool {
        self.raw > U256::ZERO
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_units(self.raw, self.decimals as u32))
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// Format a token value with the given decimals, keeping one fractional digit.
pub fn format_units(value: U256, decimals: u32) -> String {
    if decimals == 0 {
        return value.to_string();
    }
    let mut digits = value.to_string();
    if digits.len() <= decimals as usize {
        let zeros = "0".repeat(decimals as usize + 1 - digits.len());
        digits = format!("{zeros}{digits}");
    }
    let split = digits.len() - decimals as usize;
    let mut out = format!("{}.{}", &digits[..split], &digits[split..]);
    while out.ends_with('0') && !out.ends_with(".0") {
        out.pop();
    }
    out
}

/// Parse a human-readable decimal token amount into base units.
///
/// Enforces that fractional digits do not exceed the token decimals.
pub fn parse_units(amount: &str, decimals: u32) -> Result<U256> {
    let trimmed = amount.trim();
    let mut parts = trimmed.split('.');
    let whole_part = parts.next().unwrap_or("0");
    let fraction_part = parts.next();
    if parts.next().is_some() {
        return Err(BridgeError::config(format!("invalid amount {amount}")));
    }

    let whole = if whole_part.is_empty() {
        U256::ZERO
    } else {
        parse_u256(whole_part)?
    };
    let base = pow10(decimals)?;
    let mut value = whole
        .checked_mul(base)
        .ok_or_else(|| BridgeError::config("amount overflow"))?;

    if let Some(fraction_part) = fraction_part {
        if fraction_part.len() > decimals as usize {
            return Err(BridgeError::config(format!(
                "amount has too many decimal places (max {decimals})"
            )));
        }
        if !fraction_part.is_empty() {
            let fraction = parse_u256(fraction_part)?;
            let scale = pow10(decimals - fraction_part.len() as u32)?;
            value += fraction * scale;
        }
    }

    Ok(value)
}

/// Compute 10^exp with overflow protection.
fn pow10(exp: u32) -> Result<U256> {
    let mut value = U256::from(1u64);
    for _ in 0..exp {
        value = value
            .checked_mul(U256::from(10u64))
            .ok_or_else(|| BridgeError::config("amount overflow"))?;
    }
    Ok(value)
}

/// Reference to a submitted transaction on either chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxRef {
    pub side: ChainSide,
    pub hash: String,
}

/// Lifecycle of a submitted operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Submitted,
    Pending,
    Finalized,
    Rejected,
}

impl OperationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finalized | Self::Rejected)
    }
}

/// A transaction that has been handed to a chain and is being tracked.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOperation {
    pub tx: TxRef,
    #[serde(skip)]
    pub submitted_at: SystemTime,
    pub status: OperationStatus,
}

impl PendingOperation {
    pub fn submitted(side: ChainSide, hash: String) -> Self {
        Self {
            tx: TxRef { side, hash },
            submitted_at: SystemTime::now(),
            status: OperationStatus::Submitted,
        }
    }

    /// Move to `next` unless the operation already reached a terminal state.
    pub fn advance(&mut self, next: OperationStatus) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = next;
        true
    }
}

/// Starknet finality status as reported by `starknet_getTransactionStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalityStatus {
    /// The node does not know the hash yet.
    NotFound,
    Received,
    AcceptedOnL2,
    AcceptedOnL1,
    Rejected,
}

impl FromStr for FinalityStatus {
    type Err = BridgeError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "RECEIVED" => Ok(Self::Received),
            "ACCEPTED_ON_L2" => Ok(Self::AcceptedOnL2),
            "ACCEPTED_ON_L1" => Ok(Self::AcceptedOnL1),
            "REJECTED" => Ok(Self::Rejected),
            other => Err(BridgeError::Rpc(format!("unknown finality status {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Succeeded,
    Reverted,
}

impl FromStr for ExecutionStatus {
    type Err = BridgeError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "SUCCEEDED" => Ok(Self::Succeeded),
            "REVERTED" => Ok(Self::Reverted),
            other => Err(BridgeError::Rpc(format!("unknown execution status {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct L2TransactionStatus {
    pub finality_status: FinalityStatus,
    pub execution_status: Option<ExecutionStatus>,
    pub failure_reason: Option<String>,
}

impl L2TransactionStatus {
    pub fn new(finality_status: FinalityStatus) -> Self {
        Self {
            finality_status,
            execution_status: None,
            failure_reason: None,
        }
    }

    pub fn is_rejected(&self) -> bool {
        self.finality_status == FinalityStatus::Rejected
            || self.execution_status == Some(ExecutionStatus::Reverted)
    }

    pub fn is_accepted(&self) -> bool {
        matches!(
            self.finality_status,
            FinalityStatus::AcceptedOnL2 | FinalityStatus::AcceptedOnL1
        ) && !self.is_rejected()
    }

    /// Finality reached one way or the other.
    pub fn is_final(&self) -> bool {
        self.is_accepted() || self.is_rejected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_units_rescales_by_decimals() {
        let one_eth = U256::from(1_000_000_000_000_000_000u128);
        assert_eq!(format_units(one_eth, 18), "1.0");
        assert_eq!(format_units(U256::from(100_000_000_000_000_000u128), 18), "0.1");
        assert_eq!(format_units(U256::from(1_500_000u64), 6), "1.5");
        assert_eq!(format_units(U256::from(1u64), 6), "0.000001");
        assert_eq!(format_units(U256::ZERO, 18), "0.0");
        assert_eq!(format_units(U256::from(42u64), 0), "42");
    }

    #[test]
    fn parse_units_rejects_excess_precision() {
        assert_eq!(
            parse_units("0.0001", 18).unwrap(),
            U256::from(100_000_000_000_000u128)
        );
        assert_eq!(parse_units("2", 6).unwrap(), U256::from(2_000_000u64));
        assert!(parse_units("0.1234567", 6).is_err());
        assert!(parse_units("1.2.3", 6).is_err());
    }

    #[test]
    fn parse_felt_checks_field_bounds() {
        let felt = parse_felt("0x049d36570d4e46f48e99674bd3fcc84644ddd6b96f7c741b1562b82f9e004dc7")
            .unwrap();
        assert_eq!(
            felt_hex(&felt),
            "0x49d36570d4e46f48e99674bd3fcc84644ddd6b96f7c741b1562b82f9e004dc7"
        );
        assert!(parse_felt("0x0800000000000011000000000000000000000000000000000000000000000001").is_err());
        assert!(parse_felt("0xzz").is_err());
        assert!(parse_felt("").is_err());
        assert_eq!(felt_hex(&parse_felt("0x0").unwrap()), "0x0");
    }

    #[test]
    fn u256_split_produces_cairo_halves() {
        let value = (U256::from(7u64) << 128usize) + U256::from(5u64);
        let (low, high) = u256_split(value);
        assert_eq!(low, Felt::from(5u64));
        assert_eq!(high, Felt::from(7u64));
    }

    #[test]
    fn terminal_operations_are_not_reused() {
        let mut op = PendingOperation::submitted(ChainSide::L2, "0x1".to_string());
        assert!(op.advance(OperationStatus::Pending));
        assert!(op.advance(OperationStatus::Rejected));
        assert!(!op.advance(OperationStatus::Finalized));
        assert_eq!(op.status, OperationStatus::Rejected);
    }

    #[test]
    fn reverted_execution_counts_as_rejection() {
        let status = L2TransactionStatus {
            finality_status: FinalityStatus::AcceptedOnL2,
            execution_status: Some(ExecutionStatus::Reverted),
            failure_reason: Some("boom".to_string()),
        };
        assert!(status.is_rejected());
        assert!(!status.is_accepted());
        assert!(status.is_final());
        assert!(!L2TransactionStatus::new(FinalityStatus::Received).is_final());
    }
}
