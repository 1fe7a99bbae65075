//! Per-dependency circuit breaker.
//!
//! CLOSED counts consecutive failures; at the threshold it opens and every
//! call is rejected without a network attempt until the cooldown elapses.
//! The first call after the cooldown runs as a single HALF_OPEN trial:
//! success closes the breaker and resets the counter, failure re-opens it
//! and restarts the cooldown.

use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::{DispatchError, Result};

/// Breaker state, observable for operator tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls flow normally; consecutive failures are counted.
    Closed,
    /// Calls are rejected until the cooldown elapses.
    Open,
    /// One trial call is in flight.
    HalfOpen,
}

/// Breaker tuning for one dependency.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,
    /// How long the breaker stays open before permitting a trial.
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(120),
        }
    }
}

impl BreakerConfig {
    /// Sets the consecutive-failure threshold.
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Sets the open-state cooldown.
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// Circuit breaker guarding one external dependency.
///
/// Process-wide: one instance per dependency, shared by all execution slots.
/// Critical sections are short and never held across I/O.
#[derive(Debug)]
pub struct CircuitBreaker {
    dependency: &'static str,
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Create a closed breaker for a dependency.
    pub fn new(dependency: &'static str, config: BreakerConfig) -> Self {
        Self {
            dependency,
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    /// Gate a call before any network attempt.
    ///
    /// Returns `Ok` when the call may proceed (Closed, or the single
    /// HalfOpen trial). Returns `CircuitOpen` with the remaining cooldown
    /// otherwise.
    pub fn preflight(&self) -> Result<()> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let opened_at = inner.opened_at.unwrap_or_else(Instant::now);
                let elapsed = opened_at.elapsed();
                if elapsed >= self.config.cooldown {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    info!(dependency = self.dependency, "circuit half-open, permitting trial call");
                    Ok(())
                } else {
                    Err(DispatchError::CircuitOpen {
                        dependency: self.dependency,
                        retry_after: self.config.cooldown - elapsed,
                    })
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    Err(DispatchError::CircuitOpen {
                        dependency: self.dependency,
                        retry_after: Duration::ZERO,
                    })
                } else {
                    inner.trial_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    /// Record a successful call: closes the breaker and resets the counter.
    pub fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state != CircuitState::Closed {
            info!(dependency = self.dependency, "circuit closed after successful trial");
        }
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.trial_in_flight = false;
    }

    /// Record a failed call.
    ///
    /// In Closed state the failure counter advances and opens the breaker at
    /// the threshold. A failed HalfOpen trial re-opens immediately and
    /// restarts the cooldown.
    pub fn record_failure(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    warn!(
                        dependency = self.dependency,
                        failures = inner.consecutive_failures,
                        "circuit opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.trial_in_flight = false;
                warn!(dependency = self.dependency, "trial call failed, circuit re-opened");
            }
            CircuitState::Open => {}
        }
    }

    /// Release the trial slot when a HalfOpen trial ended without proving
    /// anything about dependency health (rate limit, ambiguous write).
    ///
    /// The breaker stays half-open and the next caller takes the trial.
    /// Without this, a rate-limited trial would leave the slot marked in
    /// flight and every later call would be rejected forever.
    pub fn record_trial_abandoned(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen && inner.trial_in_flight {
            inner.trial_in_flight = false;
            info!(dependency = self.dependency, "trial abandoned, slot released");
        }
    }

    /// Current state, for diagnostics.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Current consecutive-failure count, for diagnostics.
    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Operator action: force the breaker closed and clear counters.
    pub fn reset(&self) {
        self.record_success();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Mutex poisoning only happens if a holder panicked; the state is
        // plain data, so continuing with it is safe.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
