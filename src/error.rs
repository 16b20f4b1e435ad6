use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub type Result<T, E = BridgeError> = std::result::Result<T, E>;

/// Which side of the bridge an error or operation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainSide {
    L1,
    L2,
}

impl fmt::Display for ChainSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainSide::L1 => f.write_str("L1"),
            ChainSide::L2 => f.write_str("L2"),
        }
    }
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unknown network: {0}")]
    UnknownNetwork(String),

    #[error("unknown token {token} on network {network}")]
    UnknownToken { network: String, token: String },

    #[error("invalid address {0}")]
    InvalidAddress(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("insufficient funds on {side}: {symbol} balance is {balance}")]
    InsufficientFunds {
        side: ChainSide,
        symbol: String,
        balance: String,
    },

    #[error("submission failed on {side}: {reason}")]
    Submission { side: ChainSide, reason: String },

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("timed out after {elapsed:?} waiting for {what}")]
    Timeout { what: String, elapsed: Duration },

    #[error("cancelled while waiting for {0}")]
    Cancelled(String),

    #[error("{side} transaction {tx_hash} rejected: {reason}")]
    Rejected {
        side: ChainSide,
        tx_hash: String,
        reason: String,
    },

    #[error("L1 claim {tx_hash} reverted")]
    ClaimRejected { tx_hash: String },
}

impl BridgeError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn rpc(err: impl fmt::Display) -> Self {
        Self::Rpc(err.to_string())
    }

    pub fn submission(side: ChainSide, err: impl fmt::Display) -> Self {
        Self::Submission {
            side,
            reason: err.to_string(),
        }
    }

    /// Transient errors are worth another read; everything else is final.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Rpc(_))
    }
}
