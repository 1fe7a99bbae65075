//! Work item and routing decision types.
//!
//! A [`WorkItem`] is the in-memory view of one unit of inbound work for the
//! duration of a single run. The durable record lives on the remote tracker
//! as labels and comments; nothing here is persisted locally.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle phase of a work item while an orchestrator drives it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Waiting for the gateway to produce a decision.
    Routing,
    /// Decision exists and the lease has been acquired.
    Claimed,
    /// The execution agent is running.
    Executing,
    /// Merge conflicts were reported and are being analyzed.
    ConflictCheck,
    /// Execution finished; waiting on external approval.
    AwaitingReview,
    /// Approval received; merge in progress.
    Merging,
    /// Terminal success.
    Done,
    /// Terminal failure, always carries a rationale annotation.
    Aborted,
}

impl Phase {
    /// Stable label used in tracker annotations.
    pub fn as_label(&self) -> &'static str {
        match self {
            Phase::Routing => "routing",
            Phase::Claimed => "claimed",
            Phase::Executing => "executing",
            Phase::ConflictCheck => "conflict_check",
            Phase::AwaitingReview => "awaiting_review",
            Phase::Merging => "merging",
            Phase::Done => "done",
            Phase::Aborted => "aborted",
        }
    }

    /// True for the two terminal phases.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Done | Phase::Aborted)
    }
}

/// How much supervision a work item's execution receives.
///
/// Ordered: escalation may only move rightward, never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    /// Hand off to the agent with minimal supervision.
    DelegateSimple,
    /// Hand off, but watch telemetry closely for escalation triggers.
    DelegateWithEscalation,
    /// Full orchestration from the start.
    Orchestrate,
}

impl DecisionKind {
    /// Stable label used as a tracker routing label.
    pub fn as_label(&self) -> &'static str {
        match self {
            DecisionKind::DelegateSimple => "route:delegate-simple",
            DecisionKind::DelegateWithEscalation => "route:delegate-escalation",
            DecisionKind::Orchestrate => "route:orchestrate",
        }
    }
}

/// A routing decision emitted by the gateway.
///
/// Immutable once emitted for a given attempt. An escalation supersedes a
/// decision with a new one; it never edits the old one, so the audit trail
/// on the tracker keeps the full history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    /// Supervision level for this attempt.
    pub kind: DecisionKind,
    /// The complexity score that produced the kind.
    pub score: u32,
    /// Names of the signals that contributed to the score.
    pub signals: Vec<String>,
    /// Human-readable explanation written to the tracker.
    pub rationale: String,
    /// When the decision was emitted.
    pub decided_at: DateTime<Utc>,
}

impl Decision {
    /// Build a superseding decision at a higher supervision level.
    ///
    /// Returns `None` when `kind` would not raise the supervision level:
    /// escalation is strictly monotonic.
    pub fn supersede(&self, kind: DecisionKind, rationale: impl Into<String>) -> Option<Decision> {
        if kind <= self.kind {
            return None;
        }
        Some(Decision {
            kind,
            score: self.score,
            signals: self.signals.clone(),
            rationale: rationale.into(),
            decided_at: Utc::now(),
        })
    }
}

/// One unit of inbound work, owned by an orchestrator for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    /// Identifier unique within the remote tracker.
    pub id: String,
    /// Short title.
    pub title: String,
    /// Free-form body text; may be empty.
    pub body: String,
    /// Current label set. Append/remove only, never rewritten wholesale.
    pub labels: BTreeSet<String>,
    /// Current lifecycle phase.
    pub phase: Phase,
    /// The currently-active decision, if the gateway has run.
    pub decision: Option<Decision>,
    /// Number of prior failed execution attempts, from tracker history.
    pub failed_attempts: u32,
    /// Creation timestamp from the tracker.
    pub created_at: DateTime<Utc>,
    /// Last-update timestamp from the tracker.
    pub updated_at: DateTime<Utc>,
}

impl WorkItem {
    /// Create a fresh work item in the Routing phase.
    pub fn new(id: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            body: body.into(),
            labels: BTreeSet::new(),
            phase: Phase::Routing,
            decision: None,
            failed_attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// The active decision kind, if any.
    pub fn decision_kind(&self) -> Option<DecisionKind> {
        self.decision.as_ref().map(|d| d.kind)
    }

    /// Replace the active decision with a superseding one.
    ///
    /// The caller is responsible for writing the audit comment; this only
    /// swaps the in-memory active decision.
    pub fn apply_superseding(&mut self, decision: Decision) {
        self.decision = Some(decision);
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(kind: DecisionKind) -> Decision {
        Decision {
            kind,
            score: 12,
            signals: vec!["body_length".to_string()],
            rationale: "test".to_string(),
            decided_at: Utc::now(),
        }
    }

    #[test]
    fn test_supersede_upgrades_only() {
        let d = decision(DecisionKind::DelegateWithEscalation);
        assert!(d.supersede(DecisionKind::Orchestrate, "files>5").is_some());
        assert!(d
            .supersede(DecisionKind::DelegateSimple, "downgrade")
            .is_none());
        assert!(d
            .supersede(DecisionKind::DelegateWithEscalation, "same")
            .is_none());
    }

    #[test]
    fn test_kind_ordering_matches_supervision_level() {
        assert!(DecisionKind::DelegateSimple < DecisionKind::DelegateWithEscalation);
        assert!(DecisionKind::DelegateWithEscalation < DecisionKind::Orchestrate);
    }

    #[test]
    fn test_new_work_item_starts_routing_without_decision() {
        let item = WorkItem::new("WI-1", "Fix flaky test", "");
        assert_eq!(item.phase, Phase::Routing);
        assert!(item.decision.is_none());
        assert!(!item.phase.is_terminal());
    }

    #[test]
    fn test_terminal_phases() {
        assert!(Phase::Done.is_terminal());
        assert!(Phase::Aborted.is_terminal());
        assert!(!Phase::Merging.is_terminal());
    }

    #[test]
    fn test_decision_serializes_with_snake_case_kind() {
        let value = serde_json::to_value(decision(DecisionKind::DelegateWithEscalation)).unwrap();
        assert_eq!(value["kind"], "delegate_with_escalation");
        assert_eq!(value["score"], 12);
        assert_eq!(
            serde_json::to_value(Phase::AwaitingReview).unwrap(),
            "awaiting_review"
        );
    }
}
