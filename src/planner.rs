//! LLM-backed plan generation and refinement-action synthesis.

use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::adaptive::TaskProfile;
use crate::error::{Error, Result};
use crate::llm::{GenerateRequest, LlmAdapter};
use crate::plan::{Plan, RefinementAction};
use crate::supervisor::{extract_json_array, extract_json_object, Supervisor};
use crate::validation::ValidationIssue;

const PLANNER_SYSTEM_PROMPT: &str = "You are a planning assistant. Decompose requests into \
ordered, concrete steps with explicit dependencies. Return only valid JSON.";

/// Generates plans and synthesizes refinement actions.
pub struct RecursivePlanner {
    adapter: Arc<dyn LlmAdapter>,
    supervisor: Supervisor,
}

impl RecursivePlanner {
    pub fn new(adapter: Arc<dyn LlmAdapter>) -> Self {
        let supervisor = Supervisor::new(adapter.clone());
        Self {
            adapter,
            supervisor,
        }
    }

    /// Generate an initial plan for a request.
    ///
    /// Malformed output gets one supervisor repair pass; residual failure
    /// is a [`Error::Plan`] the caller may treat as non-fatal.
    pub async fn generate_plan(&self, request: &str, profile: &TaskProfile) -> Result<Plan> {
        if request.trim().is_empty() {
            return Err(Error::validation("request must be a non-empty string"));
        }

        let prompt = generation_prompt(request, profile);
        let text = self
            .adapter
            .generate(GenerateRequest::new(prompt, PLANNER_SYSTEM_PROMPT))
            .await?
            .text;

        let value = extract_json_object(&text)
            .ok_or_else(|| Error::plan("planner response contained no JSON object"));

        match value.and_then(Plan::from_value) {
            Ok(plan) => Ok(plan),
            Err(err) => {
                debug!(error = %err, "generated plan malformed, attempting repair");
                let raw: Value = extract_json_object(&text)
                    .unwrap_or_else(|| Value::String(text.clone()));
                let repaired = self.supervisor.repair_plan(&raw).await.map_err(|e| {
                    Error::plan(format!("plan generation failed after repair: {}", e))
                })?;
                Plan::from_value(repaired)
            }
        }
    }

    /// Synthesize refinement actions for a plan that has not converged.
    ///
    /// Invalid action entries in the LLM output are skipped; a response
    /// with no parseable action array is a [`Error::Plan`].
    pub async fn refine_plan(
        &self,
        plan: &Plan,
        validation_issues: &[ValidationIssue],
        convergence_reason_codes: &[String],
    ) -> Result<Vec<RefinementAction>> {
        let prompt = refinement_prompt(plan, validation_issues, convergence_reason_codes);
        let text = self
            .adapter
            .generate(GenerateRequest::new(prompt, PLANNER_SYSTEM_PROMPT))
            .await?
            .text;

        let array = match extract_json_array(&text) {
            Some(array) => array,
            None => self
                .supervisor
                .repair_json(&text, Some(&refinement_actions_schema()))
                .await
                .ok()
                .and_then(|value| {
                    if value.is_array() {
                        Some(value)
                    } else {
                        value.get("actions").cloned().filter(Value::is_array)
                    }
                })
                .ok_or_else(|| Error::plan("refinement response contained no action array"))?,
        };

        let entries = array.as_array().cloned().unwrap_or_default();
        let actions: Vec<RefinementAction> = entries
            .into_iter()
            .filter_map(|entry| serde_json::from_value::<RefinementAction>(entry).ok())
            .collect();
        Ok(actions)
    }
}

fn generation_prompt(request: &str, profile: &TaskProfile) -> String {
    format!(
        "Create an execution plan for this request:\n\n{}\n\n\
         Task profile (complexity hints):\n{}\n\n\
         Return a JSON object:\n\
         {{\n  \"goal\": \"...\",\n  \"steps\": [\n    {{\n      \"step_id\": \"step1\",\n      \
         \"description\": \"...\",\n      \"tool\": \"tool_name\" (optional),\n      \
         \"agent\": \"llm\" (optional),\n      \"dependencies\": [\"step_id\", ...] (optional)\n    \
         }}\n  ]\n}}\n\n\
         Step ids must be unique and dependencies must reference earlier steps.\n\
         Return only the JSON object.",
        request,
        serde_json::to_string_pretty(profile).unwrap_or_default()
    )
}

fn refinement_prompt(
    plan: &Plan,
    validation_issues: &[ValidationIssue],
    convergence_reason_codes: &[String],
) -> String {
    format!(
        "This plan has not converged and needs refinement.\n\n\
         Current plan:\n{}\n\nValidation issues:\n{}\n\nConvergence reason codes: {}\n\n\
         Return a JSON array of refinement actions:\n\
         [\n  {{\n    \"action_type\": \"ADD\" | \"MODIFY\" | \"REMOVE\" | \"REPLACE\",\n    \
         \"target_step_id\": \"...\" (required for MODIFY/REMOVE/REPLACE),\n    \
         \"new_step\": {{\"step_id\": \"...\", \"description\": \"...\"}} (required for \
         ADD/REPLACE, partial fields for MODIFY),\n    \"reason\": \"...\"\n  }}\n]\n\n\
         Return only the JSON array.",
        serde_json::to_string_pretty(plan).unwrap_or_default(),
        serde_json::to_string_pretty(validation_issues).unwrap_or_default(),
        convergence_reason_codes.join(", ")
    )
}

fn refinement_actions_schema() -> Value {
    serde_json::json!({
        "type": "array",
        "items": {
            "type": "object",
            "properties": {
                "action_type": {"type": "string", "enum": ["ADD", "MODIFY", "REMOVE", "REPLACE"]},
                "target_step_id": {"type": "string"},
                "new_step": {"type": "object"},
                "reason": {"type": "string"}
            },
            "required": ["action_type", "reason"]
        }
    })
}
