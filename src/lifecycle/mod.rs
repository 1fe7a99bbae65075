//! Per-work-item lifecycle state machine.
//!
//! One orchestrator instance drives one work item through
//! `Routing -> Claimed -> Executing -> {ConflictCheck} -> AwaitingReview ->
//! Merging -> Done`, with `Aborted` reachable from every state. All
//! collaborator calls go through the resilience layer, the gateway is
//! consulted exactly once per attempt (plus on escalation), and every
//! transition is annotated on the tracker so operators never need process
//! logs to see why an item stopped.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::agent::{ExecutionAgent, RunHandle};
use crate::conflict::{ConflictComplexityAnalyzer, ConflictStrategy};
use crate::error::{DispatchError, Result};
use crate::escalate::AgentEscalator;
use crate::gateway::CoordinatorGateway;
use crate::lock::LeaseGuard;
use crate::resilience::{Operation, Resilience};
use crate::tracker::{ConflictStatus, NewWorkItem, WorkTracker};
use crate::workitem::{DecisionKind, Phase, WorkItem};

/// Timing and claim parameters for one lifecycle run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Overall wall-clock ceiling for the Executing phase. Distinct from the
    /// escalator's stall threshold: the ceiling aborts, a stall escalates.
    pub execution_ceiling: Duration,
    /// Cadence for polling agent telemetry while executing.
    pub telemetry_poll_interval: Duration,
    /// Cadence for polling review status while awaiting review.
    pub review_poll_interval: Duration,
    /// Lease TTL for the concurrency guard.
    pub lease_ttl: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            execution_ceiling: Duration::from_secs(2 * 60 * 60),
            telemetry_poll_interval: Duration::from_secs(30),
            review_poll_interval: Duration::from_secs(60),
            lease_ttl: Duration::from_secs(15 * 60),
        }
    }
}

impl LifecycleConfig {
    /// Sets the wall-clock ceiling for the Executing phase.
    pub fn with_execution_ceiling(mut self, ceiling: Duration) -> Self {
        self.execution_ceiling = ceiling;
        self
    }

    /// Sets the lease TTL used when claiming an item.
    pub fn with_lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl = ttl;
        self
    }
}

/// What one run ended as.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    /// The work item that was driven.
    pub work_item_id: String,
    /// Terminal phase: Done or Aborted.
    pub final_phase: Phase,
    /// The decision kind in effect when the run ended.
    pub decision_kind: Option<DecisionKind>,
    /// Whether an escalation fired during the run.
    pub escalated: bool,
    /// Rationale for an abort, when aborted.
    pub abort_reason: Option<String>,
    /// Id of the replacement item, when the conflict strategy recreated one.
    pub recreated_as: Option<String>,
}

/// Drives one work item through its phases.
pub struct LifecycleOrchestrator {
    tracker: Arc<dyn WorkTracker>,
    agent: Arc<dyn ExecutionAgent>,
    resilience: Arc<Resilience>,
    gateway: Arc<CoordinatorGateway>,
    leases: Arc<LeaseGuard>,
    analyzer: ConflictComplexityAnalyzer,
    escalation: crate::escalate::EscalationConfig,
    config: LifecycleConfig,
    holder_id: String,
}

impl LifecycleOrchestrator {
    /// Build an orchestrator over shared collaborators.
    ///
    /// `holder_id` identifies this slot in lease records and annotations.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tracker: Arc<dyn WorkTracker>,
        agent: Arc<dyn ExecutionAgent>,
        resilience: Arc<Resilience>,
        gateway: Arc<CoordinatorGateway>,
        leases: Arc<LeaseGuard>,
        analyzer: ConflictComplexityAnalyzer,
        escalation: crate::escalate::EscalationConfig,
        config: LifecycleConfig,
        holder_id: impl Into<String>,
    ) -> Self {
        Self {
            tracker,
            agent,
            resilience,
            gateway,
            leases,
            analyzer,
            escalation,
            config,
            holder_id: holder_id.into(),
        }
    }

    /// Run one work item to a terminal phase.
    ///
    /// Returns `Err(Busy)` when the lease is held elsewhere (the caller may
    /// come back on the next poll cycle). Every other ending, including
    /// aborts, is reported as an outcome: the abort rationale has already
    /// been annotated on the tracker by the time this returns.
    pub async fn run(
        &self,
        mut item: WorkItem,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<RunOutcome> {
        // Routing: the gateway is the only legal entry point.
        self.gateway.route(&mut item).await?;

        // Claimed: requires the lease. Non-blocking by design.
        if !self
            .leases
            .try_acquire(&item.id, &self.holder_id, self.config.lease_ttl)
        {
            let holder = self
                .leases
                .current(&item.id)
                .map(|l| l.holder)
                .unwrap_or_else(|| "unknown".to_string());
            return Err(DispatchError::Busy {
                work_item: item.id,
                holder,
            });
        }
        self.transition(&mut item, Phase::Claimed, None).await;

        let outcome = self.drive(&mut item, &mut cancel).await;
        self.leases.release(&item.id, &self.holder_id);
        outcome
    }

    /// Everything between Claimed and a terminal phase. Split out so the
    /// lease release in [`run`](Self::run) covers every exit path.
    async fn drive(
        &self,
        item: &mut WorkItem,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<RunOutcome> {
        let mut escalated = false;
        let mut auto_resolve_used = false;

        // Executing, with at most one loop back from a conflict auto-resolve.
        loop {
            match self.execute(item, cancel, &mut escalated).await {
                Ok(()) => {}
                Err(err) => return Ok(self.abort(item, err.to_string(), escalated).await),
            }

            // Conflict check happens only when the tracker reports conflicts.
            let change_request = match self.find_change_request(&item.id).await {
                Ok(cr) => cr,
                Err(err) => return Ok(self.abort(item, err.to_string(), escalated).await),
            };
            let conflicting = change_request
                .as_ref()
                .map(|cr| cr.conflict_status == ConflictStatus::Conflicting)
                .unwrap_or(false);
            if !conflicting {
                break;
            }

            self.transition(item, Phase::ConflictCheck, None).await;
            let conflicts = change_request
                .and_then(|cr| cr.conflicts)
                .unwrap_or_default();
            let report = self.analyzer.analyze(&conflicts);
            info!(
                work_item = %item.id,
                score = report.score,
                strategy = report.strategy.as_label(),
                "conflict analyzed"
            );

            match report.strategy {
                ConflictStrategy::AutoResolve if !auto_resolve_used => {
                    auto_resolve_used = true;
                    self.transition(
                        item,
                        Phase::Executing,
                        Some(format!(
                            "conflict score {} in {} file(s): retrying with automated resolution",
                            report.score,
                            report.paths.len()
                        )),
                    )
                    .await;
                    continue;
                }
                ConflictStrategy::AutoResolve => {
                    // Second auto-resolve is never attempted.
                    let reason = format!(
                        "conflict persists after automated resolution (score {})",
                        report.score
                    );
                    return Ok(self.abort(item, reason, escalated).await);
                }
                ConflictStrategy::ManualFix => {
                    let reason = format!(
                        "conflict requires manual resolution: {} file(s) [{}], score {}",
                        report.paths.len(),
                        report.paths.join(", "),
                        report.score
                    );
                    return Ok(self.abort(item, reason, escalated).await);
                }
                ConflictStrategy::CloseAndRecreate => {
                    let replacement = self.recreate(item, report.score).await;
                    let reason = match &replacement {
                        Some(new_id) => format!(
                            "conflict unrecoverable (score {}), recreated as {}",
                            report.score, new_id
                        ),
                        None => format!(
                            "conflict unrecoverable (score {}), recreation failed",
                            report.score
                        ),
                    };
                    let mut outcome = self.abort(item, reason, escalated).await;
                    outcome.recreated_as = replacement;
                    return Ok(outcome);
                }
            }
        }

        // Awaiting review: external approval signal.
        self.transition(item, Phase::AwaitingReview, None).await;
        let approved_cr = match self.await_approval(&item.id, cancel).await {
            Ok(cr) => cr,
            Err(err) => return Ok(self.abort(item, err.to_string(), escalated).await),
        };

        // Merging, or straight to Done when no change request was produced.
        let Some(cr_id) = approved_cr else {
            self.transition(
                item,
                Phase::Done,
                Some("no change request produced; nothing to merge".to_string()),
            )
            .await;
            return Ok(self.outcome(item, escalated, None));
        };

        self.transition(item, Phase::Merging, None).await;
        let tracker = &self.tracker;
        let merge = self
            .resilience
            .call(Operation::MergeChangeRequest, || {
                tracker.merge_change_request(&cr_id)
            })
            .await;
        match merge {
            Ok(()) => {
                self.transition(item, Phase::Done, None).await;
                Ok(self.outcome(item, escalated, None))
            }
            Err(err) => Ok(self.abort(item, format!("merge failed: {err}"), escalated).await),
        }
    }

    /// The Executing phase: start the agent, poll telemetry on a cadence,
    /// consult the escalator at every checkpoint, and enforce the ceiling
    /// and cancellation.
    async fn execute(
        &self,
        item: &mut WorkItem,
        cancel: &mut watch::Receiver<bool>,
        escalated: &mut bool,
    ) -> Result<()> {
        self.transition(item, Phase::Executing, None).await;

        let agent = &self.agent;
        let decision = item
            .decision
            .clone()
            .ok_or_else(|| DispatchError::Fatal("executing without a decision".to_string()))?;
        let handle: RunHandle = self
            .resilience
            .call(Operation::AgentStart, || agent.start(item, &decision))
            .await?;

        let mut escalator = AgentEscalator::new(self.escalation.clone());
        let deadline = Instant::now() + self.config.execution_ceiling;
        let mut cancel_closed = false;

        loop {
            tokio::select! {
                changed = cancel.changed(), if !cancel_closed => {
                    match changed {
                        Ok(()) if *cancel.borrow() => {
                            self.stop_agent(&handle).await;
                            return Err(DispatchError::Cancelled {
                                origin: "external cancellation".to_string(),
                            });
                        }
                        Ok(()) => {}
                        // Sender dropped: no cancellation will ever arrive.
                        Err(_) => cancel_closed = true,
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    self.stop_agent(&handle).await;
                    return Err(DispatchError::ExecutionTimeout {
                        ceiling: self.config.execution_ceiling,
                    });
                }
                _ = tokio::time::sleep(self.config.telemetry_poll_interval) => {
                    let telemetry = match self
                        .resilience
                        .call(Operation::AgentPoll, || agent.poll_telemetry(&handle))
                        .await
                    {
                        Ok(telemetry) => telemetry,
                        // Telemetry is gone but the run is not: stop it
                        // before aborting or it keeps executing orphaned.
                        Err(err) => {
                            self.stop_agent(&handle).await;
                            return Err(err);
                        }
                    };

                    if let Some(event) = escalator.check(&telemetry) {
                        *escalated = true;
                        self.gateway.escalate(item, &event).await;
                    }

                    if telemetry.finished {
                        if telemetry.succeeded {
                            return Ok(());
                        }
                        return Err(DispatchError::Fatal(format!(
                            "agent run failed after {} consecutive failure(s)",
                            telemetry.consecutive_failures
                        )));
                    }
                }
            }
        }
    }

    /// Poll for the external approval signal.
    ///
    /// Returns the approved change request id, or `None` when the item has
    /// no change request at all.
    async fn await_approval(
        &self,
        item_id: &str,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<Option<String>> {
        let mut cancel_closed = false;
        loop {
            let change_request = self.find_change_request(item_id).await?;
            let Some(cr) = change_request else {
                return Ok(None);
            };
            if cr.approved {
                return Ok(Some(cr.id));
            }

            tokio::select! {
                changed = cancel.changed(), if !cancel_closed => {
                    match changed {
                        Ok(()) if *cancel.borrow() => {
                            return Err(DispatchError::Cancelled {
                                origin: "external cancellation".to_string(),
                            });
                        }
                        Ok(()) => {}
                        Err(_) => cancel_closed = true,
                    }
                }
                _ = tokio::time::sleep(self.config.review_poll_interval) => {}
            }
        }
    }

    async fn find_change_request(
        &self,
        item_id: &str,
    ) -> Result<Option<crate::tracker::ChangeRequest>> {
        let tracker = &self.tracker;
        let requests = self
            .resilience
            .call(Operation::ListChangeRequests, || {
                tracker.list_change_requests(item_id)
            })
            .await?;
        Ok(requests.into_iter().next())
    }

    async fn recreate(&self, item: &WorkItem, score: u32) -> Option<String> {
        let tracker = &self.tracker;
        let new_item = NewWorkItem {
            title: item.title.clone(),
            body: format!(
                "Recreated from {} after an unrecoverable merge conflict (score {}).\n\n{}",
                item.id, score, item.body
            ),
            labels: vec!["recreated".to_string()],
        };
        let result = self
            .resilience
            .call(Operation::CreateWorkItem, || {
                tracker.create_work_item(new_item.clone())
            })
            .await;
        match result {
            Ok(id) => Some(id),
            Err(err) => {
                warn!(work_item = %item.id, error = %err, "failed to file replacement item");
                None
            }
        }
    }

    async fn stop_agent(&self, handle: &RunHandle) {
        let agent = &self.agent;
        if let Err(err) = self
            .resilience
            .call(Operation::AgentStop, || agent.stop(handle))
            .await
        {
            warn!(error = %err, "failed to stop agent run");
        }
    }

    /// Move to `phase`, log it, and annotate the tracker. The annotation is
    /// best-effort; its failure does not change the transition.
    async fn transition(&self, item: &mut WorkItem, phase: Phase, note: Option<String>) {
        info!(
            work_item = %item.id,
            from = item.phase.as_label(),
            to = phase.as_label(),
            "phase transition"
        );
        item.phase = phase;
        item.updated_at = chrono::Utc::now();

        let body = match note {
            Some(note) => format!("[{}] phase: {} ({note})", self.holder_id, phase.as_label()),
            None => format!("[{}] phase: {}", self.holder_id, phase.as_label()),
        };
        let tracker = &self.tracker;
        if let Err(err) = self
            .resilience
            .call(Operation::AddComment, || tracker.add_comment(&item.id, &body))
            .await
        {
            warn!(work_item = %item.id, error = %err, "transition annotation failed");
        }
    }

    async fn abort(&self, item: &mut WorkItem, reason: String, escalated: bool) -> RunOutcome {
        self.transition(item, Phase::Aborted, Some(reason.clone()))
            .await;
        self.outcome(item, escalated, Some(reason))
    }

    fn outcome(&self, item: &WorkItem, escalated: bool, abort_reason: Option<String>) -> RunOutcome {
        RunOutcome {
            work_item_id: item.id.clone(),
            final_phase: item.phase,
            decision_kind: item.decision_kind(),
            escalated,
            abort_reason,
            recreated_as: None,
        }
    }
}
