//! Resilience layer wrapping every outbound collaborator call.
//!
//! Three cooperating primitives: [`RetryPolicy`] (backoff and jitter),
//! [`CircuitBreaker`] (per-dependency fail-fast), and [`CooldownTracker`]
//! (per-class pacing). Call sites never decide retry behavior themselves;
//! each names its [`Operation`] once and the explicit table here routes it
//! to a dependency and an operation class.

mod breaker;
mod cooldown;
mod retry;

use std::future::Future;

use futures::future::Either;
use serde::{Deserialize, Serialize};

pub use breaker::{BreakerConfig, CircuitBreaker, CircuitState};
pub use cooldown::{CooldownConfig, CooldownTracker};
pub use retry::{RetryConfig, RetryParams, RetryPolicy};

use crate::error::{DispatchError, Result};

/// External dependencies guarded by circuit breakers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dependency {
    /// The remote work tracker.
    Tracker,
    /// The execution agent.
    Agent,
    /// The inference backend the agent consults.
    Inference,
}

impl Dependency {
    /// Stable name used in errors and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Dependency::Tracker => "tracker",
            Dependency::Agent => "agent",
            Dependency::Inference => "inference",
        }
    }
}

/// Cost class of an operation, driving retry and cooldown parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpClass {
    /// Cheap, idempotent; retried aggressively.
    Read,
    /// State-changing; paced and retried cautiously.
    Write,
    /// Model call; expensive but safe to repeat.
    Inference,
}

/// Every outbound operation the core performs.
///
/// The variant list is exhaustive on purpose: adding a collaborator method
/// without adding it here (and to [`Operation::routing`]) will not compile
/// past review, which is how the class-per-call-site mapping stays honest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    FetchWorkItem,
    ListWorkItems,
    AddLabel,
    RemoveLabel,
    AddComment,
    ListChangeRequests,
    MergeChangeRequest,
    CreateWorkItem,
    AgentStart,
    AgentPoll,
    AgentStop,
    InferenceCall,
}

impl Operation {
    /// The dependency this operation talks to and the cost class it bills
    /// against.
    ///
    /// Listing and fetch calls are `Read` without exception; a past defect
    /// billed a listing call against the write cooldown and throttled the
    /// poller for no reason.
    pub fn routing(&self) -> (Dependency, OpClass) {
        match self {
            Operation::FetchWorkItem => (Dependency::Tracker, OpClass::Read),
            Operation::ListWorkItems => (Dependency::Tracker, OpClass::Read),
            Operation::ListChangeRequests => (Dependency::Tracker, OpClass::Read),
            Operation::AddLabel => (Dependency::Tracker, OpClass::Write),
            Operation::RemoveLabel => (Dependency::Tracker, OpClass::Write),
            Operation::AddComment => (Dependency::Tracker, OpClass::Write),
            Operation::MergeChangeRequest => (Dependency::Tracker, OpClass::Write),
            Operation::CreateWorkItem => (Dependency::Tracker, OpClass::Write),
            Operation::AgentStart => (Dependency::Agent, OpClass::Write),
            Operation::AgentPoll => (Dependency::Agent, OpClass::Read),
            Operation::AgentStop => (Dependency::Agent, OpClass::Write),
            Operation::InferenceCall => (Dependency::Inference, OpClass::Inference),
        }
    }
}

/// Configuration for the whole resilience layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Per-class retry parameters.
    pub retry: RetryConfig,
    /// Breaker tuning for the tracker.
    pub tracker_breaker: BreakerConfig,
    /// Breaker tuning for the agent.
    pub agent_breaker: BreakerConfig,
    /// Breaker tuning for the inference backend.
    pub inference_breaker: BreakerConfig,
    /// Per-class cooldown intervals.
    pub cooldown: CooldownConfig,
}

/// Process-wide resilience facade shared by all execution slots.
#[derive(Debug)]
pub struct Resilience {
    retry: RetryPolicy,
    tracker_breaker: CircuitBreaker,
    agent_breaker: CircuitBreaker,
    inference_breaker: CircuitBreaker,
    cooldown: CooldownTracker,
}

impl Resilience {
    /// Build the facade from configuration.
    pub fn new(config: ResilienceConfig) -> Self {
        Self {
            retry: RetryPolicy::new(config.retry),
            tracker_breaker: CircuitBreaker::new(
                Dependency::Tracker.as_str(),
                config.tracker_breaker,
            ),
            agent_breaker: CircuitBreaker::new(Dependency::Agent.as_str(), config.agent_breaker),
            inference_breaker: CircuitBreaker::new(
                Dependency::Inference.as_str(),
                config.inference_breaker,
            ),
            cooldown: CooldownTracker::new(config.cooldown),
        }
    }

    /// The breaker guarding `dependency`, for diagnostics and operator
    /// resets.
    pub fn breaker(&self, dependency: Dependency) -> &CircuitBreaker {
        match dependency {
            Dependency::Tracker => &self.tracker_breaker,
            Dependency::Agent => &self.agent_breaker,
            Dependency::Inference => &self.inference_breaker,
        }
    }

    /// Run one collaborator call under retry, breaker, and cooldown rules.
    ///
    /// Per attempt: the breaker gates first (an open circuit rejects with no
    /// network attempt and no cooldown charge), the cooldown paces the call,
    /// then the operation runs. Transient failures feed the breaker's
    /// failure counter; rate limits and ambiguous writes do not, since they
    /// say nothing about dependency health.
    pub async fn call<T, F, Fut>(&self, op: Operation, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let (dependency, class) = op.routing();
        let breaker = self.breaker(dependency);
        let cooldown = &self.cooldown;

        self.retry
            .execute(class, dependency.as_str(), |_attempt| {
                // Gate before constructing the operation future: an open
                // circuit must cost nothing, not even closure side effects.
                match breaker.preflight() {
                    Err(err) => Either::Left(async move { Err(err) }),
                    Ok(()) => {
                        let fut = f();
                        Either::Right(async move {
                            cooldown.pace(class).await;
                            match fut.await {
                                Ok(value) => {
                                    breaker.record_success();
                                    Ok(value)
                                }
                                Err(err) => {
                                    if matches!(err, DispatchError::Transient { .. }) {
                                        breaker.record_failure();
                                    } else {
                                        // A non-transient outcome says nothing
                                        // about dependency health, but it must
                                        // still release a half-open trial slot
                                        // or the breaker can never recover.
                                        breaker.record_trial_abandoned();
                                    }
                                    Err(err)
                                }
                            }
                        })
                    }
                }
            })
            .await
    }
}

impl Default for Resilience {
    fn default() -> Self {
        Self::new(ResilienceConfig::default())
    }
}
