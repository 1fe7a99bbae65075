//! Abstract execution agent collaborator.
//!
//! The orchestrator never inspects how the agent does its work; it starts a
//! run, polls [`RunTelemetry`] at checkpoints, and stops the run when the
//! lifecycle says so. The escalator consumes the same telemetry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::workitem::{Decision, WorkItem};

/// Opaque handle to one in-flight agent run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunHandle(pub String);

/// Live execution telemetry reported by the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunTelemetry {
    /// Distinct files touched so far.
    pub files_touched: u32,
    /// Distinct subsystems/components touched so far.
    pub components_touched: u32,
    /// Consecutive failures since the last success.
    pub consecutive_failures: u32,
    /// When the run last reported progress.
    pub last_progress_at: DateTime<Utc>,
    /// Whether the run has finished.
    pub finished: bool,
    /// Whether the finished run succeeded. Meaningless until `finished`.
    pub succeeded: bool,
}

impl RunTelemetry {
    /// Telemetry for a run that just started.
    pub fn started_now() -> Self {
        Self {
            files_touched: 0,
            components_touched: 0,
            consecutive_failures: 0,
            last_progress_at: Utc::now(),
            finished: false,
            succeeded: false,
        }
    }

    /// Seconds since the run last reported progress.
    pub fn stalled_secs(&self, now: DateTime<Utc>) -> u64 {
        (now - self.last_progress_at).num_seconds().max(0) as u64
    }
}

/// The execution agent boundary.
#[async_trait]
pub trait ExecutionAgent: Send + Sync {
    /// Start executing a work item under the given decision.
    async fn start(&self, item: &WorkItem, decision: &Decision) -> Result<RunHandle>;

    /// Poll live telemetry for a run.
    async fn poll_telemetry(&self, handle: &RunHandle) -> Result<RunTelemetry>;

    /// Stop a run. Idempotent; stopping a finished run is not an error.
    async fn stop(&self, handle: &RunHandle) -> Result<()>;
}
