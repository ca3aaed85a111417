//! Semantic validation: structural checks plus LLM advisory checks.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::llm::{GenerateRequest, LlmAdapter};
use crate::supervisor::{extract_json_object, Supervisor};
use crate::tools::ToolRegistry;

use super::types::{
    ArtifactType, IssueSeverity, IssueType, SemanticValidationReport, ValidationIssue,
};

const VALIDATOR_SYSTEM_PROMPT: &str = "You are a semantic validation assistant. Analyze plans, \
steps, and execution artifacts for quality issues. Identify specificity problems, relevance \
issues, do/say mismatches, hallucinated tools, and consistency violations. Classify issues by \
type and assign severity. Propose repairs when possible. Return structured JSON with detected \
issues.";

/// Issue as produced by the advisory LLM; invalid entries are skipped.
#[derive(Debug, Deserialize)]
struct AdvisoryIssue {
    #[serde(rename = "type")]
    issue_type: IssueType,
    severity: IssueSeverity,
    description: String,
    #[serde(default)]
    location: Option<Value>,
    #[serde(default)]
    proposed_repair: Option<Value>,
}

/// Validator combining deterministic structural checks with LLM advisory
/// checks. LLM failures degrade silently: the returned report then carries
/// structural issues only.
pub struct SemanticValidator {
    adapter: Arc<dyn LlmAdapter>,
    supervisor: Supervisor,
}

impl SemanticValidator {
    pub fn new(adapter: Arc<dyn LlmAdapter>) -> Self {
        let supervisor = Supervisor::new(adapter.clone());
        Self {
            adapter,
            supervisor,
        }
    }

    /// Validate an artifact, producing a report of detected issues.
    ///
    /// Structural checks run first and are independent of LLM state; the
    /// advisory pass covers specificity, relevance, do/say mismatch,
    /// consistency, and (when a registry is supplied) tool hallucination.
    pub async fn validate(
        &self,
        artifact: &Value,
        artifact_type: ArtifactType,
        tool_registry: Option<&dyn ToolRegistry>,
    ) -> SemanticValidationReport {
        let mut issues = structural_checks(artifact, artifact_type);
        issues.extend(
            self.advisory_checks(artifact, artifact_type, tool_registry)
                .await,
        );
        SemanticValidationReport::new(artifact_type, issues)
    }

    async fn advisory_checks(
        &self,
        artifact: &Value,
        artifact_type: ArtifactType,
        tool_registry: Option<&dyn ToolRegistry>,
    ) -> Vec<ValidationIssue> {
        let prompt = build_validation_prompt(artifact, artifact_type, tool_registry);
        let request = GenerateRequest::new(prompt, VALIDATOR_SYSTEM_PROMPT)
            .with_max_tokens(2048)
            .with_temperature(0.3);

        let text = match self.adapter.generate(request).await {
            Ok(response) => response.text,
            Err(err) => {
                debug!(error = %err, "advisory validation degraded to structural-only");
                return Vec::new();
            }
        };

        let parsed = match self.parse_validation_response(&text).await {
            Some(value) => value,
            None => return Vec::new(),
        };

        let Some(entries) = parsed.get("issues").and_then(Value::as_array) else {
            return Vec::new();
        };

        entries
            .iter()
            .filter_map(|entry| {
                serde_json::from_value::<AdvisoryIssue>(entry.clone()).ok()
            })
            .map(|issue| {
                let mut built =
                    ValidationIssue::new(issue.issue_type, issue.severity, issue.description);
                built.location = issue.location;
                built.proposed_repair = issue.proposed_repair;
                built
            })
            .collect()
    }

    /// Parse the advisory response, falling back to supervisor JSON repair
    /// with a bounded issue schema; residual failure yields no issues.
    async fn parse_validation_response(&self, text: &str) -> Option<Value> {
        if let Some(value) = extract_json_object(text) {
            return Some(value);
        }

        let schema = serde_json::json!({
            "type": "object",
            "properties": {
                "issues": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "type": {"type": "string"},
                            "severity": {"type": "string"},
                            "description": {"type": "string"},
                            "location": {"type": "object"},
                            "proposed_repair": {"type": "object"}
                        },
                        "required": ["type", "severity", "description"]
                    }
                }
            },
            "required": ["issues"]
        });

        match self.supervisor.repair_json(text, Some(&schema)).await {
            Ok(value) => Some(value),
            Err(err) => {
                debug!(error = %err, "validation response repair failed");
                None
            }
        }
    }
}

/// Deterministic checks for duplicate ids and missing required fields.
fn structural_checks(artifact: &Value, artifact_type: ArtifactType) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    match artifact_type {
        ArtifactType::Plan => {
            if let Some(steps) = artifact.get("steps").and_then(Value::as_array) {
                let mut seen: HashSet<&str> = HashSet::new();
                for (idx, step) in steps.iter().enumerate() {
                    match step.get("step_id").and_then(Value::as_str) {
                        Some(step_id) => {
                            if !seen.insert(step_id) {
                                issues.push(
                                    ValidationIssue::new(
                                        IssueType::Consistency,
                                        IssueSeverity::High,
                                        format!("Duplicate step_id found: {}", step_id),
                                    )
                                    .with_location(serde_json::json!({"step_id": step_id})),
                                );
                            }
                        }
                        None => issues.push(
                            ValidationIssue::new(
                                IssueType::Consistency,
                                IssueSeverity::Critical,
                                format!("Step at index {} missing required field: step_id", idx),
                            )
                            .with_location(serde_json::json!({"step_index": idx})),
                        ),
                    }
                    if step.get("description").and_then(Value::as_str).is_none() {
                        issues.push(
                            ValidationIssue::new(
                                IssueType::Consistency,
                                IssueSeverity::Critical,
                                format!("Step at index {} missing required field: description", idx),
                            )
                            .with_location(serde_json::json!({"step_index": idx})),
                        );
                    }
                }
            }
            if artifact.get("goal").and_then(Value::as_str).is_none() {
                issues.push(ValidationIssue::new(
                    IssueType::Consistency,
                    IssueSeverity::Critical,
                    "Plan missing required field: goal",
                ));
            }
        }
        ArtifactType::Step => {
            if artifact.get("step_id").and_then(Value::as_str).is_none() {
                issues.push(ValidationIssue::new(
                    IssueType::Consistency,
                    IssueSeverity::Critical,
                    "Step missing required field: step_id",
                ));
            }
            if artifact.get("description").and_then(Value::as_str).is_none() {
                issues.push(ValidationIssue::new(
                    IssueType::Consistency,
                    IssueSeverity::Critical,
                    "Step missing required field: description",
                ));
            }
        }
        ArtifactType::ExecutionArtifact | ArtifactType::CrossPhase => {}
    }

    issues
}

fn build_validation_prompt(
    artifact: &Value,
    artifact_type: ArtifactType,
    tool_registry: Option<&dyn ToolRegistry>,
) -> String {
    let mut parts: Vec<String> = Vec::new();
    let tool_names: Option<Vec<String>> =
        tool_registry.map(|r| r.list_all().into_iter().map(|t| t.name).collect());

    match artifact_type {
        ArtifactType::Plan => {
            parts.push("Validate this plan for semantic quality issues:".into());
            parts.push(format!(
                "Goal: {}",
                artifact.get("goal").and_then(Value::as_str).unwrap_or("N/A")
            ));
            parts.push(format!(
                "Steps: {}",
                serde_json::to_string_pretty(artifact.get("steps").unwrap_or(&Value::Null))
                    .unwrap_or_default()
            ));
            parts.push(
                "\nCheck for the following issues:\n\
                 1. SPECIFICITY: Are steps concrete and actionable? Are descriptions vague?\n\
                 2. RELEVANCE: Do steps contribute to the overall goal?\n\
                 3. DO/SAY MISMATCH: Do step descriptions match their actions or tool invocations?\n\
                 4. CONSISTENCY: Do steps logically flow? Are dependencies satisfied?"
                    .into(),
            );
            if let Some(names) = &tool_names {
                parts.push(format!("Available tools: {}", names.join(", ")));
                parts.push(
                    "5. HALLUCINATION: Are any tools referenced that don't exist in the available \
                     tools list?"
                        .into(),
                );
            }
        }
        ArtifactType::Step => {
            parts.push("Validate this step for semantic quality issues:".into());
            parts.push(serde_json::to_string_pretty(artifact).unwrap_or_default());
            parts.push(
                "\nCheck for the following issues:\n\
                 1. SPECIFICITY: Is the step description concrete and actionable?\n\
                 2. RELEVANCE: Does this step contribute to the plan goal?\n\
                 3. DO/SAY MISMATCH: Does the step description match its actions?"
                    .into(),
            );
            if let (Some(names), Some(tool)) = (&tool_names, artifact.get("tool")) {
                parts.push(format!("Available tools: {}", names.join(", ")));
                parts.push(format!(
                    "4. HALLUCINATION: Is the tool {} in the available tools list?",
                    tool
                ));
            }
        }
        ArtifactType::ExecutionArtifact => {
            parts.push("Validate this execution artifact for semantic quality issues:".into());
            parts.push(serde_json::to_string_pretty(artifact).unwrap_or_default());
            parts.push(
                "\nCheck for the following issues:\n\
                 1. CONSISTENCY: Does the artifact align with the plan and step descriptions?\n\
                 2. RELEVANCE: Is the artifact relevant to the task goal?"
                    .into(),
            );
        }
        ArtifactType::CrossPhase => {
            parts.push("Validate cross-phase consistency:".into());
            parts.push(serde_json::to_string_pretty(artifact).unwrap_or_default());
            parts.push(
                "\nCheck for consistency between plan, execution steps, final answer, and memory \
                 artifacts. Look for contradictions or misalignments across phases."
                    .into(),
            );
        }
    }

    parts.push(
        "\nReturn a JSON object with this structure:\n\
         {\n  \"issues\": [\n    {\n      \"type\": \"specificity\" | \"relevance\" | \
         \"consistency\" | \"hallucination\" | \"do_say_mismatch\",\n      \"severity\": \
         \"LOW\" | \"MEDIUM\" | \"HIGH\" | \"CRITICAL\",\n      \"description\": \"...\",\n      \
         \"location\": {\"step_id\": \"...\"} (optional),\n      \"proposed_repair\": {...} \
         (optional)\n    }\n  ]\n}\n\nReturn only the JSON object, no explanation."
            .into(),
    );

    parts.join("\n")
}
