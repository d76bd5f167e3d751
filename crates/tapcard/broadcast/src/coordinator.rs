use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::select_ok;
use nexum_tapcard_engine::{SignedTransaction, WalletState};
use rand::Rng;
use tracing::{debug, info, instrument, warn};

use crate::{Backend, Error, Result};

/// Retry and timing policy of a coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Failed attempts allowed per broadcast
    pub remaining_attempts: u32,
    /// Delay before the second attempt, doubled after each failure
    pub base_delay: Duration,
    /// Upper bound of the delay between attempts
    pub max_delay: Duration,
    /// Time one attempt may take
    pub timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl CoordinatorConfig {
    /// Three attempts, 250 ms base delay, 15 s per attempt
    pub const fn new() -> Self {
        Self {
            remaining_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(4),
            timeout: Duration::from_secs(15),
        }
    }

    /// Set the retry budget
    pub const fn with_remaining_attempts(mut self, attempts: u32) -> Self {
        self.remaining_attempts = attempts;
        self
    }

    /// Set the base delay between attempts
    pub const fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the maximum delay between attempts
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the per-attempt timeout
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Exponential delay before attempt `attempt + 1`, with up to 10% jitter
pub fn backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }
    let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    let delay_ms = base_ms
        .saturating_mul(2u64.saturating_pow(attempt - 1))
        .min(max_ms);

    let jitter_range = delay_ms / 10;
    let jitter = if jitter_range > 0 {
        rand::rng().random_range(0..jitter_range)
    } else {
        0
    };
    Duration::from_millis(delay_ms + jitter)
}

/// Retry state of one broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastAttempt {
    /// Failures still allowed
    pub remaining_attempts: u32,
    /// Index of the endpoint the next attempt goes to
    pub endpoint_idx: usize,
    /// Message of the last failure
    pub last_error: Option<String>,
    /// Attempts made so far
    pub attempts: u32,
}

impl BroadcastAttempt {
    const fn new(remaining_attempts: u32, endpoint_idx: usize) -> Self {
        Self {
            remaining_attempts,
            endpoint_idx,
            last_error: None,
            attempts: 0,
        }
    }
}

/// A transaction the network accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// Transaction id without any `0x` marker
    pub id: String,
    /// Endpoint that accepted it
    pub endpoint: String,
    /// Attempts it took
    pub attempts: u32,
}

/// Transaction id without the `0x` marker some nodes add
pub fn canonical_id(id: &str) -> &str {
    id.strip_prefix("0x")
        .or_else(|| id.strip_prefix("0X"))
        .unwrap_or(id)
}

/// Submits signed transactions, failing over between endpoints of one chain
///
/// Attempts run one after the other, round robin over the endpoints, starting at the endpoint
/// that accepted the previous broadcast. Transport failures and garbled answers consume the
/// budget; a node rejecting the transaction ends the broadcast at once and consumes none.
#[derive(Debug)]
pub struct Coordinator {
    backends: Vec<Arc<dyn Backend>>,
    config: CoordinatorConfig,
    cursor: AtomicUsize,
}

impl Coordinator {
    /// Coordinator over a set of endpoints
    pub const fn new(backends: Vec<Arc<dyn Backend>>, config: CoordinatorConfig) -> Self {
        Self {
            backends,
            config,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Retry and timing policy
    pub const fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Endpoints in attempt order
    pub fn endpoints(&self) -> impl Iterator<Item = &str> {
        self.backends.iter().map(|backend| backend.endpoint())
    }

    /// Split the endpoints into `parts` disjoint child coordinators for [`broadcast_fanout`]
    pub fn partition(&self, parts: usize) -> Vec<Self> {
        let parts = parts.clamp(1, self.backends.len().max(1));
        (0..parts)
            .map(|part| {
                let backends = self
                    .backends
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| i % parts == part)
                    .map(|(_, backend)| Arc::clone(backend))
                    .collect();
                Self::new(backends, self.config)
            })
            .collect()
    }

    /// Submit a transaction without touching wallet state
    #[instrument(skip_all, fields(family = %tx.family, budget = self.config.remaining_attempts))]
    pub async fn submit(&self, tx: &SignedTransaction) -> Result<Receipt> {
        if self.backends.is_empty() {
            return Err(Error::NoEndpoints);
        }
        let count = self.backends.len();
        let mut attempt = BroadcastAttempt::new(
            self.config.remaining_attempts,
            self.cursor.load(Ordering::Relaxed) % count,
        );

        loop {
            if attempt.remaining_attempts == 0 {
                let message = attempt
                    .last_error
                    .unwrap_or_else(|| "retry budget is zero".to_owned());
                warn!(attempts = attempt.attempts, %message, "Broadcast budget exhausted");
                return Err(Error::Exhausted {
                    attempts: attempt.attempts,
                    message,
                });
            }

            let endpoint_idx = attempt.endpoint_idx;
            let backend = &self.backends[endpoint_idx];
            attempt.attempts += 1;
            debug!(endpoint_idx, attempt = attempt.attempts, endpoint = backend.endpoint(), "Submitting");

            let result = match tokio::time::timeout(self.config.timeout, backend.submit(tx)).await
            {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout {
                    endpoint: backend.endpoint().to_owned(),
                    elapsed_ms: u64::try_from(self.config.timeout.as_millis())
                        .unwrap_or(u64::MAX),
                }),
            };

            match result {
                Ok(id) => {
                    self.cursor.store(endpoint_idx, Ordering::Relaxed);
                    let id = canonical_id(&id).to_owned();
                    info!(endpoint_idx, attempt = attempt.attempts, %id, "Transaction accepted");
                    return Ok(Receipt {
                        id,
                        endpoint: backend.endpoint().to_owned(),
                        attempts: attempt.attempts,
                    });
                }
                Err(err) if !err.is_retryable() => {
                    warn!(endpoint_idx, error = %err, "Transaction rejected");
                    return Err(err);
                }
                Err(err) => {
                    attempt.remaining_attempts -= 1;
                    warn!(
                        endpoint_idx,
                        remaining = attempt.remaining_attempts,
                        error = %err,
                        "Broadcast attempt failed, switching endpoint"
                    );
                    attempt.last_error = Some(err.to_string());
                    attempt.endpoint_idx = (endpoint_idx + 1) % count;
                    if attempt.remaining_attempts > 0 {
                        let delay =
                            backoff(attempt.attempts, self.config.base_delay, self.config.max_delay);
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    /// Submit a transaction and record its acceptance in the wallet
    ///
    /// The nonce or sequence of an account chain advances by one, and only once the network
    /// accepted the transaction. Spent outputs and the debited value leave the wallet at the
    /// same point.
    pub async fn broadcast(
        &self,
        tx: &SignedTransaction,
        wallet: &mut WalletState,
    ) -> Result<Receipt> {
        let receipt = self.submit(tx).await?;
        record_acceptance(tx, wallet);
        Ok(receipt)
    }
}

fn record_acceptance(tx: &SignedTransaction, wallet: &mut WalletState) {
    wallet.record_broadcast(&tx.debit);
    debug!(
        nonce = wallet.nonce,
        utxos = wallet.utxos.len(),
        balance = %wallet.balance,
        "Recorded accepted transaction"
    );
}

/// Race child coordinators over disjoint endpoints and keep the first acceptance
///
/// Fails with the error of the last child to fail when none succeeds.
pub async fn broadcast_fanout(
    children: &[Coordinator],
    tx: &SignedTransaction,
    wallet: &mut WalletState,
) -> Result<Receipt> {
    if children.is_empty() {
        return Err(Error::NoEndpoints);
    }
    let (receipt, _) = select_ok(children.iter().map(|child| Box::pin(child.submit(tx)))).await?;
    record_acceptance(tx, wallet);
    Ok(receipt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        let base = Duration::from_millis(100);
        let max = Duration::from_millis(1000);
        assert_eq!(backoff(0, base, max), Duration::ZERO);

        let first = backoff(1, base, max);
        assert!(first >= base && first < Duration::from_millis(110));
        let second = backoff(2, base, max);
        assert!(second >= Duration::from_millis(200) && second < Duration::from_millis(220));
        let capped = backoff(10, base, max);
        assert!(capped >= max && capped < Duration::from_millis(1100));
    }

    #[test]
    fn test_canonical_id() {
        assert_eq!(canonical_id("0xabc"), "abc");
        assert_eq!(canonical_id("0Xabc"), "abc");
        assert_eq!(canonical_id("abc"), "abc");
    }

    #[test]
    fn test_config_builders() {
        let config = CoordinatorConfig::new()
            .with_remaining_attempts(5)
            .with_base_delay(Duration::from_millis(10))
            .with_max_delay(Duration::from_millis(50))
            .with_timeout(Duration::from_secs(1));
        assert_eq!(config.remaining_attempts, 5);
        assert_eq!(config.base_delay, Duration::from_millis(10));
        assert_eq!(config.max_delay, Duration::from_millis(50));
        assert_eq!(config.timeout, Duration::from_secs(1));
        assert_eq!(CoordinatorConfig::default(), CoordinatorConfig::new());
    }
}
