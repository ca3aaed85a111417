//! Convergence engine: LLM-assisted scoring under threshold gates.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::{Error, Result};
use crate::llm::{GenerateRequest, LlmAdapter};
use crate::supervisor::{extract_json_object, Supervisor};
use crate::validation::SemanticValidationReport;

use super::types::{ConsistencyStatus, ConvergenceAssessment, ConvergenceCriteria};

const ENGINE_SYSTEM_PROMPT: &str = "You are a convergence evaluator. Score how completely and \
coherently the execution results satisfy the plan goal, and whether plan, steps, answer, and \
memory artifacts are mutually consistent. Return only JSON.";

/// Scores as produced by the evaluating LLM.
#[derive(Debug, Deserialize)]
struct LlmScores {
    completeness_score: f64,
    coherence_score: f64,
    #[serde(default)]
    consistency_status: ConsistencyStatus,
    #[serde(default)]
    detected_issues: Vec<String>,
}

/// Determines whether task execution has converged.
///
/// Scoring is delegated to the LLM; the thresholded decision and the reason
/// codes are computed here. The engine never errors outward: provider
/// failures produce a conservative non-converged assessment.
pub struct ConvergenceEngine {
    adapter: Arc<dyn LlmAdapter>,
    supervisor: Supervisor,
    criteria: ConvergenceCriteria,
}

impl ConvergenceEngine {
    pub fn new(adapter: Arc<dyn LlmAdapter>) -> Self {
        let supervisor = Supervisor::new(adapter.clone());
        Self {
            adapter,
            supervisor,
            criteria: ConvergenceCriteria::default(),
        }
    }

    /// Override the default threshold gates.
    pub fn with_criteria(mut self, criteria: ConvergenceCriteria) -> Self {
        self.criteria = criteria;
        self
    }

    /// The engine's configured criteria.
    pub fn criteria(&self) -> &ConvergenceCriteria {
        &self.criteria
    }

    /// Assess convergence of the current pass.
    pub async fn assess(
        &self,
        plan_state: &Value,
        execution_results: &[Value],
        validation_report: &SemanticValidationReport,
        custom_criteria: Option<&ConvergenceCriteria>,
    ) -> ConvergenceAssessment {
        let criteria = custom_criteria.copied().unwrap_or(self.criteria);

        let scores = match self
            .perform_convergence_assessment(plan_state, execution_results, validation_report)
            .await
        {
            Ok(scores) => scores,
            Err(err) => {
                debug!(error = %err, "convergence scoring failed, returning conservative assessment");
                let reason = match &err {
                    Error::Llm(_) | Error::Validation(_) | Error::PhaseTransition { .. } => {
                        "llm_assessment_failed"
                    }
                    _ => "unexpected_error",
                };
                return conservative_assessment(reason, &err, validation_report, &criteria);
            }
        };

        self.gate(scores, validation_report, &criteria)
    }

    /// Apply the threshold gates and derive reason codes.
    fn gate(
        &self,
        scores: LlmScores,
        validation_report: &SemanticValidationReport,
        criteria: &ConvergenceCriteria,
    ) -> ConvergenceAssessment {
        let completeness = scores.completeness_score.clamp(0.0, 1.0);
        let coherence = scores.coherence_score.clamp(0.0, 1.0);

        let completeness_met = completeness >= criteria.completeness_threshold;
        let coherence_met = coherence >= criteria.coherence_threshold;
        let consistency_met = scores.consistency_status.all_aligned();
        let converged = completeness_met && coherence_met && consistency_met;

        let mut reason_codes = Vec::new();
        if converged {
            reason_codes.push("completeness_threshold_met".to_string());
            reason_codes.push("coherence_threshold_met".to_string());
            reason_codes.push("consistency_aligned".to_string());
        } else {
            if !completeness_met {
                reason_codes.push("completeness_below_threshold".to_string());
            }
            if !coherence_met {
                reason_codes.push("coherence_below_threshold".to_string());
            }
            if !consistency_met {
                if completeness_met && coherence_met {
                    reason_codes.push("consistency_conflict".to_string());
                }
                reason_codes.push("consistency_not_aligned".to_string());
            }
        }

        ConvergenceAssessment {
            converged,
            reason_codes,
            completeness_score: completeness,
            coherence_score: coherence,
            consistency_status: scores.consistency_status,
            detected_issues: scores.detected_issues,
            metadata: assessment_metadata(validation_report, criteria),
        }
    }

    /// Delegate scoring to the LLM and parse the response.
    async fn perform_convergence_assessment(
        &self,
        plan_state: &Value,
        execution_results: &[Value],
        validation_report: &SemanticValidationReport,
    ) -> Result<LlmScores> {
        let prompt = format!(
            "Evaluate whether this execution has converged.\n\n\
             Plan state:\n{}\n\nExecution results:\n{}\n\nSemantic validation issues:\n{}\n\n\
             Return a JSON object:\n\
             {{\n  \"completeness_score\": 0.0-1.0,\n  \"coherence_score\": 0.0-1.0,\n  \
             \"consistency_status\": {{\"plan_aligned\": bool, \"step_aligned\": bool, \
             \"answer_aligned\": bool, \"memory_aligned\": bool}},\n  \
             \"detected_issues\": [\"...\"]\n}}\n\nReturn only the JSON object.",
            serde_json::to_string_pretty(plan_state)?,
            serde_json::to_string_pretty(&execution_results)?,
            serde_json::to_string_pretty(&validation_report.issues)?
        );
        let request = GenerateRequest::new(prompt, ENGINE_SYSTEM_PROMPT)
            .with_max_tokens(1024)
            .with_temperature(0.2);

        let text = self.adapter.generate(request).await?.text;
        let value = match extract_json_object(&text) {
            Some(value) => value,
            None => self.supervisor.repair_json(&text, None).await?,
        };
        serde_json::from_value(value)
            .map_err(|e| Error::validation(format!("convergence scores malformed: {}", e)))
    }
}

fn assessment_metadata(
    validation_report: &SemanticValidationReport,
    criteria: &ConvergenceCriteria,
) -> HashMap<String, Value> {
    let mut metadata = HashMap::new();
    metadata.insert(
        "semantic_validation_issues_count".to_string(),
        Value::from(validation_report.issues.len()),
    );
    metadata.insert(
        "semantic_validation_severity".to_string(),
        validation_report
            .max_severity()
            .map(|s| Value::from(s.to_string()))
            .unwrap_or(Value::Null),
    );
    metadata.insert(
        "thresholds_used".to_string(),
        serde_json::to_value(criteria).unwrap_or(Value::Null),
    );
    metadata
}

fn conservative_assessment(
    reason: &str,
    err: &Error,
    validation_report: &SemanticValidationReport,
    criteria: &ConvergenceCriteria,
) -> ConvergenceAssessment {
    ConvergenceAssessment {
        converged: false,
        reason_codes: vec![reason.to_string()],
        completeness_score: 0.0,
        coherence_score: 0.0,
        consistency_status: ConsistencyStatus {
            plan_aligned: false,
            step_aligned: false,
            answer_aligned: false,
            memory_aligned: false,
        },
        detected_issues: vec![format!("Convergence assessment unavailable: {}", err)],
        metadata: assessment_metadata(validation_report, criteria),
    }
}
