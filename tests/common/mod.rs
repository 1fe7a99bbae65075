//! Shared in-memory fakes for lifecycle integration tests.
//!
//! `FakeTracker` scripts change-request listings and can inject leading
//! transient failures; `FakeAgent` replays a telemetry sequence. Both record
//! every write so tests can assert on the audit trail.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use dispatchio::agent::{ExecutionAgent, RunHandle, RunTelemetry};
use dispatchio::error::{DispatchError, Result};
use dispatchio::escalate::EscalationConfig;
use dispatchio::gateway::CoordinatorGateway;
use dispatchio::lifecycle::{LifecycleConfig, LifecycleOrchestrator};
use dispatchio::lock::LeaseGuard;
use dispatchio::resilience::Resilience;
use dispatchio::tracker::{ChangeRequest, NewWorkItem, WorkTracker};
use dispatchio::workitem::WorkItem;
use dispatchio::{ComplexityClassifier, ConflictComplexityAnalyzer};

/// Tracker fake with scripted change-request listings.
#[derive(Default)]
pub struct FakeTracker {
    pub labels: Mutex<HashMap<String, Vec<String>>>,
    pub comments: Mutex<HashMap<String, Vec<String>>>,
    pub merged: Mutex<Vec<String>>,
    pub created: Mutex<Vec<NewWorkItem>>,
    /// Listings returned by successive `list_change_requests` calls. The
    /// last scripted response repeats once the queue runs dry.
    pub cr_script: Mutex<VecDeque<Vec<ChangeRequest>>>,
    /// Leading transient failures injected into `list_change_requests`.
    pub list_failures: AtomicU32,
}

impl FakeTracker {
    pub fn script_change_requests(&self, responses: Vec<Vec<ChangeRequest>>) {
        *self.cr_script.lock().unwrap() = responses.into();
    }

    pub fn comments_for(&self, id: &str) -> Vec<String> {
        self.comments
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn labels_for(&self, id: &str) -> Vec<String> {
        self.labels
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl WorkTracker for FakeTracker {
    async fn fetch_work_item(&self, id: &str) -> Result<WorkItem> {
        Ok(WorkItem::new(id, "fetched", ""))
    }

    async fn list_work_items(&self, _label: &str) -> Result<Vec<WorkItem>> {
        Ok(vec![])
    }

    async fn add_label(&self, id: &str, label: &str) -> Result<()> {
        self.labels
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_default()
            .push(label.to_string());
        Ok(())
    }

    async fn remove_label(&self, id: &str, label: &str) -> Result<()> {
        if let Some(labels) = self.labels.lock().unwrap().get_mut(id) {
            labels.retain(|l| l != label);
        }
        Ok(())
    }

    async fn add_comment(&self, id: &str, body: &str) -> Result<()> {
        self.comments
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_default()
            .push(body.to_string());
        Ok(())
    }

    async fn list_change_requests(&self, _work_item_id: &str) -> Result<Vec<ChangeRequest>> {
        let remaining = self.list_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.list_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(DispatchError::Transient {
                dependency: "tracker",
                message: "injected 503".to_string(),
            });
        }
        let mut script = self.cr_script.lock().unwrap();
        if script.len() > 1 {
            Ok(script.pop_front().unwrap_or_default())
        } else {
            Ok(script.front().cloned().unwrap_or_default())
        }
    }

    async fn merge_change_request(&self, change_request_id: &str) -> Result<()> {
        self.merged
            .lock()
            .unwrap()
            .push(change_request_id.to_string());
        Ok(())
    }

    async fn create_work_item(&self, item: NewWorkItem) -> Result<String> {
        let mut created = self.created.lock().unwrap();
        created.push(item);
        Ok(format!("WI-{}", 100 + created.len()))
    }
}

/// Agent fake replaying a telemetry script; the last frame repeats.
pub struct FakeAgent {
    script: Mutex<VecDeque<RunTelemetry>>,
    pub started: AtomicU32,
    pub stopped: AtomicU32,
    /// When set, every telemetry poll fails terminally.
    pub poll_fatal: AtomicBool,
}

impl FakeAgent {
    pub fn with_script(frames: Vec<RunTelemetry>) -> Self {
        Self {
            script: Mutex::new(frames.into()),
            started: AtomicU32::new(0),
            stopped: AtomicU32::new(0),
            poll_fatal: AtomicBool::new(false),
        }
    }

    /// A run that finishes successfully on the first telemetry poll.
    pub fn immediate_success() -> Self {
        Self::with_script(vec![finished_telemetry(true)])
    }
}

#[async_trait]
impl ExecutionAgent for FakeAgent {
    async fn start(
        &self,
        item: &WorkItem,
        _decision: &dispatchio::workitem::Decision,
    ) -> Result<RunHandle> {
        self.started.fetch_add(1, Ordering::SeqCst);
        Ok(RunHandle(format!("run-{}", item.id)))
    }

    async fn poll_telemetry(&self, _handle: &RunHandle) -> Result<RunTelemetry> {
        if self.poll_fatal.load(Ordering::SeqCst) {
            return Err(DispatchError::Fatal("telemetry channel lost".to_string()));
        }
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            Ok(script.pop_front().unwrap_or_else(RunTelemetry::started_now))
        } else {
            Ok(script
                .front()
                .cloned()
                .unwrap_or_else(RunTelemetry::started_now))
        }
    }

    async fn stop(&self, _handle: &RunHandle) -> Result<()> {
        self.stopped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn finished_telemetry(succeeded: bool) -> RunTelemetry {
    RunTelemetry {
        finished: true,
        succeeded,
        ..RunTelemetry::started_now()
    }
}

pub fn progress_telemetry(files: u32, components: u32) -> RunTelemetry {
    RunTelemetry {
        files_touched: files,
        components_touched: components,
        ..RunTelemetry::started_now()
    }
}

pub fn approved_cr(work_item_id: &str) -> ChangeRequest {
    ChangeRequest {
        id: format!("CR-{work_item_id}"),
        work_item_id: work_item_id.to_string(),
        conflict_status: dispatchio::tracker::ConflictStatus::Clean,
        conflicts: None,
        approved: true,
    }
}

/// Wire an orchestrator over the fakes with default tuning and a shared
/// lease guard.
pub fn orchestrator(
    tracker: Arc<FakeTracker>,
    agent: Arc<FakeAgent>,
    leases: Arc<LeaseGuard>,
    holder: &str,
) -> LifecycleOrchestrator {
    orchestrator_with_lifecycle(tracker, agent, leases, holder, LifecycleConfig::default())
}

/// Same wiring with explicit lifecycle tuning.
pub fn orchestrator_with_lifecycle(
    tracker: Arc<FakeTracker>,
    agent: Arc<FakeAgent>,
    leases: Arc<LeaseGuard>,
    holder: &str,
    lifecycle: LifecycleConfig,
) -> LifecycleOrchestrator {
    let resilience = Arc::new(Resilience::default());
    let gateway = Arc::new(CoordinatorGateway::new(
        Arc::clone(&tracker) as Arc<dyn WorkTracker>,
        Arc::clone(&resilience),
        ComplexityClassifier::default(),
    ));
    LifecycleOrchestrator::new(
        tracker,
        agent,
        resilience,
        gateway,
        leases,
        ConflictComplexityAnalyzer::default(),
        EscalationConfig::default(),
        lifecycle,
        holder,
    )
}
