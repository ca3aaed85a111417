//! Orchestration state: exclusive owner of the plan and the TTL budget.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::plan::{Plan, StepStatus};

/// Snapshot of one phase execution, appended per pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPass {
    pub pass_number: usize,
    pub phase: String,
    pub plan_state: Value,
    pub ttl_remaining: i64,
}

/// Mutable state for a single request.
///
/// The state exclusively owns the plan; components receive borrowed views
/// during a phase and never retain mutable references across phase
/// boundaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationState {
    pub plan: Plan,
    pub ttl_remaining: i64,
    pub current_step_id: Option<String>,
    /// Append-only pass history.
    pub execution_passes: Vec<ExecutionPass>,
    /// Opaque identifier stamped on all telemetry records for this request.
    pub correlation_id: String,
}

impl OrchestrationState {
    /// Default TTL when none is allocated.
    pub const DEFAULT_TTL: i64 = 10;

    /// Create state with the default TTL.
    pub fn new(plan: Plan) -> Self {
        Self::with_ttl(plan, Self::DEFAULT_TTL)
    }

    /// Create state with an explicit TTL.
    pub fn with_ttl(plan: Plan, ttl_remaining: i64) -> Self {
        Self {
            plan,
            ttl_remaining,
            current_step_id: None,
            execution_passes: Vec::new(),
            correlation_id: Uuid::new_v4().to_string(),
        }
    }

    /// Whether the budget is exhausted.
    pub fn ttl_expired(&self) -> bool {
        self.ttl_remaining <= 0
    }

    /// Mark a step Running and set it current.
    pub fn start_step(&mut self, step_id: &str) -> Result<()> {
        let step = self
            .plan
            .step_mut(step_id)
            .ok_or_else(|| Error::validation(format!("unknown step: {}", step_id)))?;
        step.status = StepStatus::Running;
        self.current_step_id = Some(step_id.to_string());
        Ok(())
    }

    /// Mark the current step Complete and clear it.
    pub fn complete_current_step(&mut self) {
        if let Some(step_id) = self.current_step_id.take() {
            if let Some(step) = self.plan.step_mut(&step_id) {
                step.status = StepStatus::Complete;
            }
        }
    }

    /// Mark the current step Failed, recording the error, and clear it.
    pub fn fail_current_step(&mut self, error: impl Into<String>) {
        if let Some(step_id) = self.current_step_id.take() {
            if let Some(step) = self.plan.step_mut(&step_id) {
                step.status = StepStatus::Failed;
                step.errors.get_or_insert_with(Vec::new).push(error.into());
            }
        }
    }

    /// Append a pass snapshot to the history.
    pub fn record_pass(&mut self, pass_number: usize, phase: impl Into<String>) {
        let snapshot = ExecutionPass {
            pass_number,
            phase: phase.into(),
            plan_state: self.plan.to_value(),
            ttl_remaining: self.ttl_remaining,
        };
        self.execution_passes.push(snapshot);
    }
}
