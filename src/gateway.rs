//! The mandatory routing gateway.
//!
//! Every work item passes through [`CoordinatorGateway::route`] before any
//! execution starts. The gateway classifies, records the decision on the
//! item, and writes the audit annotation (routing label plus rationale
//! comment) to the tracker. The annotation is best-effort: the in-memory
//! decision is authoritative even when the tracker write fails, but the
//! failure is surfaced as a degraded-mode counter the poller can watch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use crate::classify::{
    count_cross_references, count_file_references, Category, ComplexityClassifier, ItemMetadata,
};
use crate::error::Result;
use crate::escalate::{escalated_kind, EscalationEvent};
use crate::resilience::{Operation, Resilience};
use crate::tracker::WorkTracker;
use crate::workitem::{Decision, DecisionKind, WorkItem};

/// The single legal entry point for routing work items.
pub struct CoordinatorGateway {
    tracker: Arc<dyn WorkTracker>,
    resilience: Arc<Resilience>,
    classifier: ComplexityClassifier,
    degraded_annotations: AtomicU64,
}

impl CoordinatorGateway {
    /// Build a gateway over the given collaborators.
    pub fn new(
        tracker: Arc<dyn WorkTracker>,
        resilience: Arc<Resilience>,
        classifier: ComplexityClassifier,
    ) -> Self {
        Self {
            tracker,
            resilience,
            classifier,
            degraded_annotations: AtomicU64::new(0),
        }
    }

    /// Route a work item, producing its decision.
    ///
    /// Idempotent: if the item already carries an unresolved decision the
    /// existing one is returned without re-scoring, so a crashed-and-retried
    /// caller cannot double-route an attempt.
    pub async fn route(&self, item: &mut WorkItem) -> Result<Decision> {
        if let Some(existing) = &item.decision {
            info!(
                work_item = %item.id,
                kind = existing.kind.as_label(),
                "returning existing decision"
            );
            return Ok(existing.clone());
        }

        let meta = ItemMetadata {
            label_count: item.labels.len() as u32,
            referenced_files: count_file_references(&item.body),
            cross_references: count_cross_references(&item.body),
            failed_attempts: item.failed_attempts,
        };
        let text = format!("{}\n{}", item.title, item.body);
        let classification = self.classifier.classify(&text, &meta);

        let kind = match classification.category {
            Category::Simple => DecisionKind::DelegateSimple,
            Category::Uncertain => DecisionKind::DelegateWithEscalation,
            Category::Complex => DecisionKind::Orchestrate,
        };
        let signal_names: Vec<String> = classification
            .signals
            .iter()
            .map(|s| s.name.clone())
            .collect();
        let rationale = format!(
            "routed as {}: category={} score={} signals=[{}]",
            kind.as_label(),
            classification.category.as_label(),
            classification.score,
            signal_names.join(", "),
        );

        let decision = Decision {
            kind,
            score: classification.score,
            signals: signal_names,
            rationale: rationale.clone(),
            decided_at: chrono::Utc::now(),
        };

        info!(
            work_item = %item.id,
            kind = kind.as_label(),
            score = decision.score,
            "routing decision made"
        );

        item.decision = Some(decision.clone());
        item.labels.insert(kind.as_label().to_string());
        item.updated_at = chrono::Utc::now();

        self.annotate(&item.id, kind.as_label(), &rationale).await;

        Ok(decision)
    }

    /// Supersede an item's decision in response to an escalation event.
    ///
    /// Returns the new decision, or `None` when the item is already at the
    /// highest supervision level (the event is still annotated so the audit
    /// trail records the crossing). Escalation never downgrades.
    pub async fn escalate(
        &self,
        item: &mut WorkItem,
        event: &EscalationEvent,
    ) -> Option<Decision> {
        let current = item.decision.clone()?;
        let target = escalated_kind(current.kind);
        let rationale = format!(
            "escalated {} -> {}: trigger {} (observed {}, threshold {})",
            current.kind.as_label(),
            target.as_label(),
            event.trigger,
            event.observed,
            event.threshold,
        );

        let superseding = current.supersede(target, rationale.clone());
        if let Some(decision) = &superseding {
            item.labels.remove(current.kind.as_label());
            item.labels.insert(target.as_label().to_string());
            item.apply_superseding(decision.clone());
            self.swap_labels(&item.id, current.kind.as_label(), target.as_label())
                .await;
        }
        // The comment goes out either way: a crossing at the top level is
        // still worth an audit entry.
        self.comment(&item.id, &rationale).await;
        superseding
    }

    /// Number of audit annotations that could not be written. Non-zero means
    /// the tracker's record is behind the authoritative in-memory decisions.
    pub fn degraded(&self) -> u64 {
        self.degraded_annotations.load(Ordering::Relaxed)
    }

    async fn annotate(&self, item_id: &str, label: &str, rationale: &str) {
        let tracker = &self.tracker;
        let label_result = self
            .resilience
            .call(Operation::AddLabel, || tracker.add_label(item_id, label))
            .await;
        if let Err(err) = label_result {
            self.mark_degraded(item_id, "routing label", &err);
        }
        self.comment(item_id, rationale).await;
    }

    async fn comment(&self, item_id: &str, body: &str) {
        let tracker = &self.tracker;
        let result = self
            .resilience
            .call(Operation::AddComment, || tracker.add_comment(item_id, body))
            .await;
        if let Err(err) = result {
            self.mark_degraded(item_id, "rationale comment", &err);
        }
    }

    async fn swap_labels(&self, item_id: &str, old: &str, new: &str) {
        let tracker = &self.tracker;
        let remove = self
            .resilience
            .call(Operation::RemoveLabel, || tracker.remove_label(item_id, old))
            .await;
        if let Err(err) = remove {
            self.mark_degraded(item_id, "label removal", &err);
        }
        let add = self
            .resilience
            .call(Operation::AddLabel, || tracker.add_label(item_id, new))
            .await;
        if let Err(err) = add {
            self.mark_degraded(item_id, "label swap", &err);
        }
    }

    fn mark_degraded(&self, item_id: &str, what: &str, err: &crate::error::DispatchError) {
        self.degraded_annotations.fetch_add(1, Ordering::Relaxed);
        warn!(
            work_item = item_id,
            error = %err,
            "failed to write {what}; decision stands, audit trail degraded"
        );
    }
}
