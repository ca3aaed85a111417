//! Convergence assessment data model.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::{Error, Result};

/// Cross-artifact alignment status between plan, steps, answer, and memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyStatus {
    pub plan_aligned: bool,
    pub step_aligned: bool,
    pub answer_aligned: bool,
    pub memory_aligned: bool,
}

impl Default for ConsistencyStatus {
    fn default() -> Self {
        Self {
            plan_aligned: true,
            step_aligned: true,
            answer_aligned: true,
            memory_aligned: true,
        }
    }
}

impl ConsistencyStatus {
    /// Whether every artifact pair is aligned.
    pub fn all_aligned(&self) -> bool {
        self.plan_aligned && self.step_aligned && self.answer_aligned && self.memory_aligned
    }
}

/// Threshold gates for the convergence decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceCriteria {
    pub completeness_threshold: f64,
    pub coherence_threshold: f64,
    pub consistency_threshold: f64,
}

impl Default for ConvergenceCriteria {
    fn default() -> Self {
        Self {
            completeness_threshold: 0.95,
            coherence_threshold: 0.90,
            consistency_threshold: 0.90,
        }
    }
}

/// Result of the convergence engine: whether execution has converged, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceAssessment {
    pub converged: bool,
    /// Why convergence was or wasn't achieved. Must be non-empty when
    /// `converged` is false.
    pub reason_codes: Vec<String>,
    pub completeness_score: f64,
    pub coherence_score: f64,
    #[serde(default)]
    pub consistency_status: ConsistencyStatus,
    #[serde(default)]
    pub detected_issues: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl ConvergenceAssessment {
    /// Create a validated assessment.
    pub fn new(
        converged: bool,
        reason_codes: Vec<String>,
        completeness_score: f64,
        coherence_score: f64,
        consistency_status: ConsistencyStatus,
        detected_issues: Vec<String>,
        metadata: HashMap<String, Value>,
    ) -> Result<Self> {
        let assessment = Self {
            converged,
            reason_codes,
            completeness_score,
            coherence_score,
            consistency_status,
            detected_issues,
            metadata,
        };
        assessment.validate()?;
        Ok(assessment)
    }

    /// Validate score ranges and the reason-code invariant.
    pub fn validate(&self) -> Result<()> {
        for (name, score) in [
            ("completeness_score", self.completeness_score),
            ("coherence_score", self.coherence_score),
        ] {
            if !(0.0..=1.0).contains(&score) {
                return Err(Error::validation(format!(
                    "{} must be in range [0.0, 1.0], got {}",
                    name, score
                )));
            }
        }
        if !self.converged && self.reason_codes.is_empty() {
            return Err(Error::validation(
                "reason_codes must be non-empty when converged is false",
            ));
        }
        Ok(())
    }
}
