//! Retry with exponential backoff and jitter.
//!
//! Each operation class carries its own (max attempts, base delay, cap)
//! tuple: reads are cheap to retry aggressively, writes are retried
//! cautiously and never after an ambiguous outcome, inference calls sit in
//! between. A rate-limit error with an explicit reset time bypasses the
//! backoff formula and sleeps exactly until the reset.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{DispatchError, Result};
use crate::resilience::OpClass;

/// Retry tuple for one operation class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryParams {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Base delay fed into the backoff formula.
    pub base_delay: Duration,
    /// Upper bound on any single computed delay.
    pub cap_delay: Duration,
}

/// Per-class retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Parameters for read operations.
    pub read: RetryParams,
    /// Parameters for write operations.
    pub write: RetryParams,
    /// Parameters for inference calls.
    pub inference: RetryParams,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            read: RetryParams {
                max_attempts: 5,
                base_delay: Duration::from_millis(500),
                cap_delay: Duration::from_secs(30),
            },
            write: RetryParams {
                max_attempts: 3,
                base_delay: Duration::from_secs(2),
                cap_delay: Duration::from_secs(60),
            },
            inference: RetryParams {
                max_attempts: 4,
                base_delay: Duration::from_secs(1),
                cap_delay: Duration::from_secs(45),
            },
        }
    }
}

impl RetryConfig {
    /// Parameters for the given operation class.
    pub fn params(&self, class: OpClass) -> &RetryParams {
        match class {
            OpClass::Read => &self.read,
            OpClass::Write => &self.write,
            OpClass::Inference => &self.inference,
        }
    }
}

/// Retry executor for collaborator calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a policy from per-class parameters.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Backoff delay for a zero-based attempt index, before jitter.
    ///
    /// `min(base * 2^attempt, cap)`. Kept pure so the delay curve can be
    /// asserted in tests without a clock.
    pub fn backoff_delay(&self, class: OpClass, attempt: u32) -> Duration {
        let params = self.config.params(class);
        let exp = params
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        exp.min(params.cap_delay)
    }

    /// Run `operation` under this policy's rules for `class`.
    ///
    /// The closure is invoked with the zero-based attempt index. Ambiguous
    /// writes and other non-retryable errors are returned immediately;
    /// transient errors are retried until attempts run out, after which a
    /// `RetriesExhausted` error carries the final disposition.
    pub async fn execute<T, F, Fut>(
        &self,
        class: OpClass,
        dependency: &'static str,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let params = self.config.params(class).clone();
        let mut last_error = String::new();

        for attempt in 0..params.max_attempts {
            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(dependency, attempt, "call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => {
                    last_error = err.to_string();
                    if attempt + 1 >= params.max_attempts {
                        break;
                    }
                    let delay = match &err {
                        // Explicit reset time wins over the formula.
                        DispatchError::RateLimited { reset_after, .. } => *reset_after,
                        _ => {
                            // The cap bounds the jittered delay, not just the
                            // exponential term.
                            let base = self.backoff_delay(class, attempt);
                            (base + jitter(params.base_delay)).min(params.cap_delay)
                        }
                    };
                    warn!(
                        dependency,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after failure"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(DispatchError::RetriesExhausted {
            dependency,
            attempts: params.max_attempts,
            last_error,
        })
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

/// Uniform jitter in `[0, base)`.
fn jitter(base: Duration) -> Duration {
    if base.is_zero() {
        return Duration::ZERO;
    }
    let max = base.as_millis() as u64;
    Duration::from_millis(rand::thread_rng().gen_range(0..max.max(1)))
}
