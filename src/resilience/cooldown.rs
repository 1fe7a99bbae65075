//! Per-operation-class cooldown pacing.
//!
//! Tracks the last call time per [`OpClass`] and enforces a minimum
//! inter-call interval. The class is supplied by the resilience facade from
//! its explicit operation table, so a cheap read can never be billed against
//! the write interval.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::resilience::OpClass;

/// Minimum inter-call intervals per operation class.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CooldownConfig {
    /// Minimum interval between read calls.
    pub read_interval: Duration,
    /// Minimum interval between write calls.
    pub write_interval: Duration,
    /// Minimum interval between inference calls.
    pub inference_interval: Duration,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            read_interval: Duration::from_millis(200),
            write_interval: Duration::from_secs(2),
            inference_interval: Duration::from_secs(1),
        }
    }
}

impl CooldownConfig {
    fn interval(&self, class: OpClass) -> Duration {
        match class {
            OpClass::Read => self.read_interval,
            OpClass::Write => self.write_interval,
            OpClass::Inference => self.inference_interval,
        }
    }
}

/// Tracks last-call timestamps and enforces pacing.
#[derive(Debug)]
pub struct CooldownTracker {
    config: CooldownConfig,
    last_call: Mutex<HashMap<OpClass, Instant>>,
}

impl CooldownTracker {
    /// Create a tracker with the given intervals.
    pub fn new(config: CooldownConfig) -> Self {
        Self {
            config,
            last_call: Mutex::new(HashMap::new()),
        }
    }

    /// Remaining wait before a call of `class` may proceed.
    pub fn remaining(&self, class: OpClass) -> Duration {
        let last = self.lock();
        match last.get(&class) {
            Some(at) => self.config.interval(class).saturating_sub(at.elapsed()),
            None => Duration::ZERO,
        }
    }

    /// Record that a call of `class` was just made.
    pub fn record_call(&self, class: OpClass) {
        self.lock().insert(class, Instant::now());
    }

    /// Sleep out any remaining cooldown for `class`, then record the call.
    pub async fn pace(&self, class: OpClass) {
        let remaining = self.remaining(class);
        if !remaining.is_zero() {
            tokio::time::sleep(remaining).await;
        }
        self.record_call(class);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<OpClass, Instant>> {
        self.last_call.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for CooldownTracker {
    fn default() -> Self {
        Self::new(CooldownConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_call_has_no_wait() {
        let tracker = CooldownTracker::default();
        assert_eq!(tracker.remaining(OpClass::Write), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_enforced_per_class() {
        let tracker = CooldownTracker::default();
        tracker.record_call(OpClass::Write);
        assert!(tracker.remaining(OpClass::Write) > Duration::ZERO);
        // A write must not throttle reads.
        assert_eq!(tracker.remaining(OpClass::Read), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remaining_decays_with_time() {
        let tracker = CooldownTracker::new(CooldownConfig {
            write_interval: Duration::from_secs(2),
            ..Default::default()
        });
        tracker.record_call(OpClass::Write);
        tokio::time::advance(Duration::from_secs(1)).await;
        let remaining = tracker.remaining(OpClass::Write);
        assert!(remaining <= Duration::from_secs(1));
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(tracker.remaining(OpClass::Write), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pace_sleeps_then_records() {
        let tracker = CooldownTracker::new(CooldownConfig {
            read_interval: Duration::from_millis(500),
            ..Default::default()
        });
        let started = Instant::now();
        tracker.pace(OpClass::Read).await;
        tracker.pace(OpClass::Read).await;
        assert!(started.elapsed() >= Duration::from_millis(500));
    }
}
