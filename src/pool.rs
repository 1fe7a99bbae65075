//! Fixed-size slot pool driving one orchestrator per claimed work item.
//!
//! Slots are independent: the only state shared between them is the
//! process-wide resilience layer and the lease guard. A busy lease is a
//! skip, not an error; the item stays available for the next poll cycle.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, RwLock, Semaphore};
use tracing::{info, warn};

use crate::error::{DispatchError, ErrorCategory};
use crate::lifecycle::{LifecycleOrchestrator, RunOutcome};
use crate::workitem::{Phase, WorkItem};

/// Pool sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of concurrent execution slots.
    pub slots: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { slots: 3 }
    }
}

/// Aggregate result of one dispatch batch.
#[derive(Debug, Default)]
pub struct BatchResult {
    /// Outcomes for items that reached a terminal phase.
    pub outcomes: Vec<RunOutcome>,
    /// Items skipped because another holder owned the lease.
    pub busy: Vec<String>,
    /// Items that failed before reaching the lifecycle, with the error text.
    pub failed: HashMap<String, String>,
}

impl BatchResult {
    /// Count of items that ended in Done.
    pub fn done(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.final_phase == Phase::Done)
            .count()
    }

    /// Count of items that ended in Aborted.
    pub fn aborted(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.final_phase == Phase::Aborted)
            .count()
    }
}

/// Runs work items through orchestrators, bounded by the slot count.
pub struct SlotPool {
    semaphore: Arc<Semaphore>,
    orchestrator: Arc<LifecycleOrchestrator>,
    in_flight: Arc<RwLock<std::collections::HashSet<String>>>,
}

impl SlotPool {
    /// Create a pool over a shared orchestrator.
    pub fn new(config: PoolConfig, orchestrator: Arc<LifecycleOrchestrator>) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(config.slots.max(1))),
            orchestrator,
            in_flight: Arc::new(RwLock::new(std::collections::HashSet::new())),
        }
    }

    /// Drive a batch of candidate items to terminal phases.
    ///
    /// Each item gets its own task and cancel subscription; `cancel` fans
    /// out to every slot. Items already in flight in this pool are skipped
    /// as busy without consuming a slot.
    pub async fn dispatch(
        &self,
        items: Vec<WorkItem>,
        cancel: watch::Receiver<bool>,
    ) -> BatchResult {
        let mut handles = Vec::new();

        for item in items {
            let item_id = item.id.clone();
            {
                let mut in_flight = self.in_flight.write().await;
                if !in_flight.insert(item_id.clone()) {
                    info!(work_item = %item_id, "already in flight, skipping");
                    continue;
                }
            }

            let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break, // pool shut down
            };
            let orchestrator = Arc::clone(&self.orchestrator);
            let in_flight = Arc::clone(&self.in_flight);
            let slot_cancel = cancel.clone();

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                let result = orchestrator.run(item, slot_cancel).await;
                in_flight.write().await.remove(&item_id);
                (item_id, result)
            }));
        }

        let mut batch = BatchResult::default();
        for handle in handles {
            let (item_id, result) = match handle.await {
                Ok(pair) => pair,
                Err(join_err) => {
                    warn!(error = %join_err, "slot task panicked");
                    continue;
                }
            };
            match result {
                Ok(outcome) => batch.outcomes.push(outcome),
                Err(err) if err.classify() == ErrorCategory::Busy => {
                    batch.busy.push(item_id);
                }
                Err(err) => {
                    self.record_failure(&mut batch, item_id, err);
                }
            }
        }
        batch
    }

    fn record_failure(&self, batch: &mut BatchResult, item_id: String, err: DispatchError) {
        warn!(work_item = %item_id, error = %err, "item failed before lifecycle completion");
        batch.failed.insert(item_id, err.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pool_is_small() {
        assert_eq!(PoolConfig::default().slots, 3);
    }

    #[test]
    fn test_batch_result_counts() {
        let mut batch = BatchResult::default();
        batch.outcomes.push(RunOutcome {
            work_item_id: "WI-1".to_string(),
            final_phase: Phase::Done,
            decision_kind: None,
            escalated: false,
            abort_reason: None,
            recreated_as: None,
        });
        batch.outcomes.push(RunOutcome {
            work_item_id: "WI-2".to_string(),
            final_phase: Phase::Aborted,
            decision_kind: None,
            escalated: false,
            abort_reason: Some("merge failed".to_string()),
            recreated_as: None,
        });
        assert_eq!(batch.done(), 1);
        assert_eq!(batch.aborted(), 1);
    }
}
