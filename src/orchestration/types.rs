//! Shared orchestration records: phase outcomes, step execution results,
//! and evaluation results.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::adaptive::ClarityState;
use crate::convergence::ConvergenceAssessment;
use crate::plan::StepStatus;
use crate::validation::SemanticValidationReport;

/// Outcome of an internal phase function: an optional value plus an
/// optional error message.
///
/// Phases degrade rather than abort, so a failed outcome often still
/// carries usable fallback data in the surrounding state; only boundary
/// failures escape as typed errors.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseOutcome<T> {
    pub value: Option<T>,
    pub error: Option<String>,
}

impl<T> PhaseOutcome<T> {
    /// Successful outcome carrying a value.
    pub fn ok(value: T) -> Self {
        Self {
            value: Some(value),
            error: None,
        }
    }

    /// Failed outcome carrying the error message.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            value: None,
            error: Some(error.into()),
        }
    }

    /// Whether the phase succeeded.
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of executing a single step in Phase C.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepExecutionRecord {
    pub step_id: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub clarity: ClarityState,
}

impl StepExecutionRecord {
    /// Snapshot as a JSON value for prompts and telemetry.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Result of Phase C evaluation: validation report plus convergence
/// decision.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationOutcome {
    pub converged: bool,
    pub needs_refinement: bool,
    pub semantic_validation: SemanticValidationReport,
    pub convergence_assessment: Option<ConvergenceAssessment>,
}

impl EvaluationOutcome {
    /// Reason codes from the convergence assessment, if one was produced.
    pub fn convergence_reason_codes(&self) -> Vec<String> {
        self.convergence_assessment
            .as_ref()
            .map(|a| a.reason_codes.clone())
            .unwrap_or_default()
    }
}
