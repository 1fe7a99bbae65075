//! Mid-flight escalation monitoring.
//!
//! The orchestrator calls [`AgentEscalator::check`] at phase checkpoints
//! with live telemetry. The first threshold crossing per run produces an
//! [`EscalationEvent`]; later crossings stay quiet until the run is reset,
//! so a long-running breach cannot storm the audit trail.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::agent::RunTelemetry;
use crate::workitem::DecisionKind;

/// Thresholds that trigger escalation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    /// Escalate when distinct files touched exceeds this.
    pub max_files_touched: u32,
    /// Escalate when distinct components touched exceeds this.
    pub max_components_touched: u32,
    /// Escalate at this many consecutive failures.
    pub min_consecutive_failures: u32,
    /// Escalate when no progress has been reported for this long.
    pub stall_threshold: Duration,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            max_files_touched: 5,
            max_components_touched: 3,
            min_consecutive_failures: 2,
            stall_threshold: Duration::from_secs(30 * 60),
        }
    }
}

/// A threshold crossing observed during an in-flight run.
///
/// Immutable after creation; consumed once by the orchestrator to move the
/// run to an escalated state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationEvent {
    /// Trigger name, e.g. `files_touched>5`.
    pub trigger: String,
    /// The observed value that crossed the threshold.
    pub observed: u64,
    /// The configured threshold.
    pub threshold: u64,
    /// When the crossing was observed.
    pub at: DateTime<Utc>,
}

impl EscalationEvent {
    fn new(trigger: String, observed: u64, threshold: u64) -> Self {
        Self {
            trigger,
            observed,
            threshold,
            at: Utc::now(),
        }
    }
}

/// Watches run telemetry for threshold crossings.
///
/// One escalator per run. Escalation is strictly additive: the effective
/// decision kind only ever moves toward more supervision, which
/// [`escalated_kind`] encodes.
#[derive(Debug, Clone)]
pub struct AgentEscalator {
    config: EscalationConfig,
    fired: bool,
}

impl AgentEscalator {
    /// Create an armed escalator.
    pub fn new(config: EscalationConfig) -> Self {
        Self {
            config,
            fired: false,
        }
    }

    /// Check telemetry against the configured thresholds.
    ///
    /// Returns the event for the first crossing of this run; `None` on
    /// every later call until [`reset`](Self::reset). Checks are purely
    /// computational and never suspend.
    pub fn check(&mut self, telemetry: &RunTelemetry) -> Option<EscalationEvent> {
        if self.fired {
            return None;
        }
        let event = self.first_crossing(telemetry)?;
        self.fired = true;
        info!(
            trigger = %event.trigger,
            observed = event.observed,
            threshold = event.threshold,
            "escalation triggered"
        );
        Some(event)
    }

    /// Re-arm after the run has been reset (e.g. a fresh attempt).
    pub fn reset(&mut self) {
        self.fired = false;
    }

    fn first_crossing(&self, telemetry: &RunTelemetry) -> Option<EscalationEvent> {
        let c = &self.config;
        if telemetry.files_touched > c.max_files_touched {
            return Some(EscalationEvent::new(
                format!("files_touched>{}", c.max_files_touched),
                telemetry.files_touched as u64,
                c.max_files_touched as u64,
            ));
        }
        if telemetry.components_touched > c.max_components_touched {
            return Some(EscalationEvent::new(
                format!("components_touched>{}", c.max_components_touched),
                telemetry.components_touched as u64,
                c.max_components_touched as u64,
            ));
        }
        if telemetry.consecutive_failures >= c.min_consecutive_failures {
            return Some(EscalationEvent::new(
                format!("consecutive_failures>={}", c.min_consecutive_failures),
                telemetry.consecutive_failures as u64,
                c.min_consecutive_failures as u64,
            ));
        }
        let stalled = telemetry.stalled_secs(Utc::now());
        let threshold = c.stall_threshold.as_secs();
        if stalled > threshold {
            return Some(EscalationEvent::new(
                format!("stalled>{}min", threshold / 60),
                stalled,
                threshold,
            ));
        }
        None
    }
}

impl Default for AgentEscalator {
    fn default() -> Self {
        Self::new(EscalationConfig::default())
    }
}

/// The decision kind one escalation step above `current`.
///
/// Orchestrate has no further level; escalating it is a no-op.
pub fn escalated_kind(current: DecisionKind) -> DecisionKind {
    match current {
        DecisionKind::DelegateSimple => DecisionKind::DelegateWithEscalation,
        DecisionKind::DelegateWithEscalation => DecisionKind::Orchestrate,
        DecisionKind::Orchestrate => DecisionKind::Orchestrate,
    }
}
