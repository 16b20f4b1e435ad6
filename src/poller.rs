//! Fixed-interval polling with an overall deadline.
//!
//! Every query is preceded by one interval of sleep, so `n` queries take `n`
//! intervals. Sleeps and queries are cut short by the cancellation token and
//! by the deadline, which is reported exactly when it passes.

use crate::chain::{L1Chain, L1Receipt, L2Chain};
use crate::error::{BridgeError, Result};
use crate::types::{felt_hex, L2TransactionStatus};
use alloy_primitives::B256;
use starknet_crypto::Felt;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
pub struct PollOptions {
    pub interval: Duration,
    pub timeout: Duration,
    /// Transient errors tolerated in a row before giving up.
    pub max_consecutive_errors: u32,
}

impl PollOptions {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            max_consecutive_errors: 5,
        }
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }
}

#[derive(Debug, Clone)]
pub struct StatusPoller {
    options: PollOptions,
    cancel: CancellationToken,
}

impl StatusPoller {
    pub fn new(options: PollOptions, cancel: CancellationToken) -> Self {
        Self { options, cancel }
    }

    pub fn options(&self) -> PollOptions {
        self.options
    }

    /// Same cancellation, different timing.
    pub fn with_options(&self, options: PollOptions) -> Self {
        Self {
            options,
            cancel: self.cancel.clone(),
        }
    }

    /// Query until `is_terminal` accepts a value, the deadline passes, the
    /// token is cancelled, or a non-transient error comes back.
    pub async fn await_status<T, F, Fut, P>(
        &self,
        label: &str,
        mut query: F,
        is_terminal: P,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        P: Fn(&T) -> bool,
    {
        let start = Instant::now();
        let deadline = start + self.options.timeout;
        let mut consecutive_errors = 0u32;
        let mut attempts = 0u64;

        loop {
            let wake = Instant::now() + self.options.interval;
            if wake > deadline {
                self.sleep(label, deadline).await?;
                return Err(timeout(label, start));
            }
            self.sleep(label, wake).await?;

            attempts += 1;
            // A query that is ready at the deadline still counts.
            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return Err(BridgeError::Cancelled(label.to_string()));
                }
                outcome = query() => outcome,
                _ = sleep_until(deadline) => {
                    warn!(label, attempts, "query still running at deadline");
                    return Err(timeout(label, start));
                }
            };
            match outcome {
                Ok(value) if is_terminal(&value) => {
                    debug!(label, attempts, "poll reached terminal state");
                    return Ok(value);
                }
                Ok(_) => {
                    consecutive_errors = 0;
                }
                Err(err) if err.is_transient() => {
                    consecutive_errors += 1;
                    warn!(label, attempts, consecutive_errors, %err, "poll query failed");
                    if consecutive_errors > self.options.max_consecutive_errors {
                        return Err(err);
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn sleep(&self, label: &str, until: Instant) -> Result<()> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(BridgeError::Cancelled(label.to_string())),
            _ = sleep_until(until) => Ok(()),
        }
    }

    /// Wait until an L2 transaction is accepted or rejected.
    pub async fn await_l2_transaction(
        &self,
        chain: &dyn L2Chain,
        tx_hash: Felt,
    ) -> Result<L2TransactionStatus> {
        let label = format!("L2 transaction {}", felt_hex(&tx_hash));
        self.await_status(
            &label,
            || chain.transaction_status(tx_hash),
            L2TransactionStatus::is_final,
        )
        .await
    }

    /// Wait until an L1 transaction has a receipt.
    pub async fn await_l1_receipt(&self, chain: &dyn L1Chain, tx_hash: B256) -> Result<L1Receipt> {
        let label = format!("L1 receipt {tx_hash:#x}");
        let receipt = self
            .await_status(&label, || chain.receipt(tx_hash), Option::is_some)
            .await?;
        receipt.ok_or_else(|| BridgeError::Rpc(format!("{label} vanished")))
    }
}

fn timeout(label: &str, start: Instant) -> BridgeError {
    BridgeError::Timeout {
        what: label.to_string(),
        elapsed: start.elapsed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    const INTERVAL: Duration = Duration::from_secs(1);

    fn poller(timeout: Duration) -> StatusPoller {
        StatusPoller::new(PollOptions::new(INTERVAL, timeout), CancellationToken::new())
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_on_third_query_takes_three_intervals() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let start = Instant::now();

        let value = poller(Duration::from_secs(60))
            .await_status(
                "third",
                move || async move { Ok(counter.fetch_add(1, Ordering::SeqCst) + 1) },
                |count| *count == 3,
            )
            .await
            .unwrap();

        let elapsed = start.elapsed();
        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(elapsed >= INTERVAL * 3);
        assert!(elapsed < INTERVAL * 4);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_at_deadline() {
        let start = Instant::now();
        let timeout = Duration::from_millis(3_500);

        let err = poller(timeout)
            .await_status("never", || async { Ok(false) }, |done| *done)
            .await
            .unwrap_err();

        match err {
            BridgeError::Timeout { what, elapsed } => {
                assert_eq!(what, "never");
                assert_eq!(elapsed, timeout);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(start.elapsed(), timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_sleep() {
        let cancel = CancellationToken::new();
        let poller = StatusPoller::new(
            PollOptions::new(Duration::from_secs(30), Duration::from_secs(600)),
            cancel.clone(),
        );
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let err = poller
            .await_status("slow", || async { Ok(()) }, |_| false)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Cancelled(label) if label == "slow"));
        assert!(start.elapsed() < Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_query_times_out_at_deadline() {
        let start = Instant::now();
        let timeout = Duration::from_secs(3);

        let err = poller(timeout)
            .await_status("stuck", std::future::pending::<Result<bool>>, |done| *done)
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::Timeout { ref what, .. } if what == "stuck"));
        assert_eq!(start.elapsed(), timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_hung_query() {
        let cancel = CancellationToken::new();
        let poller = StatusPoller::new(
            PollOptions::new(INTERVAL, Duration::from_secs(600)),
            cancel.clone(),
        );
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let err = poller
            .await_status("stuck", std::future::pending::<Result<bool>>, |done| *done)
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::Cancelled(label) if label == "stuck"));
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried_within_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let value = poller(Duration::from_secs(60))
            .await_status(
                "flaky",
                move || {
                    let counter = counter.clone();
                    async move {
                        match counter.fetch_add(1, Ordering::SeqCst) {
                            0 | 1 => Err(BridgeError::Rpc("connection reset".to_string())),
                            n => Ok(n),
                        }
                    }
                },
                |_| true,
            )
            .await
            .unwrap();
        assert_eq!(value, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn error_budget_exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let mut options = PollOptions::new(INTERVAL, Duration::from_secs(60));
        options.max_consecutive_errors = 2;

        let err = StatusPoller::new(options, CancellationToken::new())
            .await_status(
                "down",
                move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(BridgeError::Rpc("unreachable".to_string()))
                },
                |_| true,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Rpc(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_transient_error_aborts_immediately() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let err = poller(Duration::from_secs(60))
            .await_status(
                "bad",
                move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(BridgeError::config("broken"))
                },
                |_| true,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Configuration(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
