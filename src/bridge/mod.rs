//! Withdraw (L2 -> L1) and deposit (L1 -> L2) flows.
//!
//! Each flow is a linear state machine with an absorbing `Failed` state. A
//! failure carries the last state reached and a checkpoint of everything
//! already submitted, so a run can be inspected or resumed.

pub mod deposit;
pub mod withdraw;

use crate::error::BridgeError;
use crate::poller::StatusPoller;
use alloy_primitives::U256;
use starknet_crypto::Felt;
use std::fmt;
use std::time::Duration;

pub use deposit::{DepositFlow, DepositOutcome, DepositRequest, DepositState};
pub use withdraw::{WithdrawFlow, WithdrawOutcome, WithdrawRequest, WithdrawState};

/// Timing and fee knobs shared by both flows.
#[derive(Debug, Clone)]
pub struct FlowSettings {
    pub poller: StatusPoller,
    /// Deadline for slow cross-chain waits: L2->L1 message consumability and
    /// the L2 credit of a deposit.
    pub message_timeout: Duration,
    pub l2_max_fee: Felt,
    /// Fixed L1->L2 message fee. Estimated through the L2 node when unset.
    pub deposit_message_fee: Option<U256>,
}

impl FlowSettings {
    pub(crate) fn message_poller(&self) -> StatusPoller {
        let options = self.poller.options().with_timeout(self.message_timeout);
        self.poller.with_options(options)
    }
}

/// A flow that stopped before completing.
#[derive(Debug)]
pub struct FlowError<S, C> {
    /// Last state the flow reached before the failing step.
    pub reached: S,
    pub step: &'static str,
    pub source: BridgeError,
    pub checkpoint: C,
}

impl<S: fmt::Debug, C> fmt::Display for FlowError<S, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed after reaching {:?}: {}",
            self.step, self.reached, self.source
        )
    }
}

impl<S: fmt::Debug, C: fmt::Debug> std::error::Error for FlowError<S, C> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}
