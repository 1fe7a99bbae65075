//! Dispatchio: autonomous work routing and resilience.
//!
//! Classifies incoming work items by complexity, routes every item through
//! a coordinator gateway, and drives each claimed item through its lifecycle
//! (claim, execute, conflict check, review, merge) with retries, circuit
//! breakers, and per-dependency cooldown pacing around every external call.

pub mod agent;
pub mod classify;
pub mod config;
pub mod conflict;
pub mod error;
pub mod escalate;
pub mod gateway;
pub mod lifecycle;
pub mod lock;
pub mod pool;
pub mod resilience;
pub mod tracker;
pub mod workitem;

pub use agent::{ExecutionAgent, RunHandle, RunTelemetry};
pub use classify::{Category, Classification, ClassifierConfig, ComplexityClassifier};
pub use config::DispatchConfig;
pub use conflict::{
    ConflictBand, ConflictComplexityAnalyzer, ConflictConfig, ConflictReport, ConflictStrategy,
};
pub use error::{error_category_label, DispatchError, ErrorCategory, Result};
pub use escalate::{AgentEscalator, EscalationConfig, EscalationEvent};
pub use gateway::CoordinatorGateway;
pub use lifecycle::{LifecycleConfig, LifecycleOrchestrator, RunOutcome};
pub use lock::{LeaseGuard, LockRecord};
pub use pool::{BatchResult, PoolConfig, SlotPool};
pub use resilience::{
    CooldownConfig, Dependency, OpClass, Operation, Resilience, ResilienceConfig,
};
pub use tracker::{
    ChangeRequest, ConflictEntry, ConflictSet, ConflictStatus, NewWorkItem, WorkTracker,
};
pub use workitem::{Decision, DecisionKind, Phase, WorkItem};

/// Install a `tracing` subscriber honoring `RUST_LOG`, defaulting to `info`.
///
/// Returns an error string if a global subscriber is already installed.
pub fn init_tracing() -> std::result::Result<(), String> {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| e.to_string())
}
