//! LLM-backed repair of malformed artifacts.
//!
//! The supervisor is the bounded last resort for LLM output that fails to
//! parse or validate: malformed JSON, broken plan structures, tool calls
//! that don't match their schema, and steps referencing tools that don't
//! exist. Every operation makes at most `max_attempts` LLM calls and raises
//! a non-retryable [`Error::Supervisor`] on exhaustion; callers decide
//! whether to surface or degrade.

use regex::Regex;
use serde_json::Value;
use std::sync::{Arc, LazyLock};
use tracing::debug;

use crate::error::{Error, Result};
use crate::llm::{GenerateRequest, LlmAdapter};
use crate::plan::{Plan, PlanStep};
use crate::tools::ToolSpec;

/// Pattern for the first JSON object in free-form text, tolerating one
/// level of nesting.
static JSON_OBJECT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{[^{}]*(?:\{[^{}]*\}[^{}]*)*\}").expect("Invalid regex")
});

/// Pattern for the first JSON array in free-form text, tolerating nested
/// objects inside.
static JSON_ARRAY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[[^\[\]]*(?:\{[^{}]*(?:\{[^{}]*\}[^{}]*)*\}[^\[\]]*)*\]").expect("Invalid regex")
});

/// Extract the first JSON object from LLM response text.
///
/// Tries the whole text first (arbitrary nesting), then falls back to an
/// object embedded in prose.
pub(crate) fn extract_json_object(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(text.trim()) {
        if value.is_object() {
            return Some(value);
        }
    }
    JSON_OBJECT_PATTERN
        .find(text)
        .and_then(|found| serde_json::from_str::<Value>(found.as_str()).ok())
        .filter(Value::is_object)
}

/// Extract the first JSON array from LLM response text.
pub(crate) fn extract_json_array(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(text.trim()) {
        if value.is_array() {
            return Some(value);
        }
    }
    JSON_ARRAY_PATTERN
        .find(text)
        .and_then(|found| serde_json::from_str::<Value>(found.as_str()).ok())
        .filter(Value::is_array)
}

const REPAIR_SYSTEM_PROMPT: &str = "You are a JSON repair assistant. Fix malformed JSON or \
structured artifacts. Return only the corrected JSON, no explanation.";

/// Bounded LLM-backed repair of malformed artifacts.
pub struct Supervisor {
    adapter: Arc<dyn LlmAdapter>,
    max_attempts: usize,
}

impl Supervisor {
    /// Default number of repair attempts per operation.
    pub const DEFAULT_MAX_ATTEMPTS: usize = 2;

    pub fn new(adapter: Arc<dyn LlmAdapter>) -> Self {
        Self {
            adapter,
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Override the attempt bound.
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Run the repair loop: prompt, extract, validate, retry with the failed
    /// output folded into the next prompt.
    async fn repair_loop<F>(&self, initial_prompt: String, mut accept: F) -> Result<Value>
    where
        F: FnMut(&Value) -> Result<()>,
    {
        let mut prompt = initial_prompt;
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            let request = GenerateRequest::new(&prompt, REPAIR_SYSTEM_PROMPT)
                .with_max_tokens(2048)
                .with_temperature(0.2);
            let response_text = match self.adapter.generate(request).await {
                Ok(response) => response.text,
                Err(err) => {
                    last_error = err.to_string();
                    continue;
                }
            };

            match extract_json_object(&response_text).or_else(|| extract_json_array(&response_text))
            {
                Some(value) => match accept(&value) {
                    Ok(()) => return Ok(value),
                    Err(err) => {
                        debug!(attempt, error = %err, "repair output rejected");
                        last_error = err.to_string();
                        prompt = format!(
                            "{}\n\nYour previous output was rejected ({}):\n{}",
                            prompt, err, response_text
                        );
                    }
                },
                None => {
                    debug!(attempt, "repair output contained no JSON");
                    last_error = "response contained no JSON".to_string();
                    prompt = format!(
                        "{}\n\nYour previous output contained no valid JSON:\n{}",
                        prompt, response_text
                    );
                }
            }
        }

        Err(Error::supervisor(format!(
            "repair failed after {} attempts: {}",
            self.max_attempts, last_error
        )))
    }

    /// Repair malformed JSON text into a parsed value, optionally checked
    /// against an expected schema description.
    pub async fn repair_json(
        &self,
        malformed_json: &str,
        expected_schema: Option<&Value>,
    ) -> Result<Value> {
        let mut prompt = format!("Fix this malformed JSON: {}", malformed_json);
        if let Some(schema) = expected_schema {
            prompt.push_str(&format!(
                "\n\nThe corrected JSON must match this schema:\n{}",
                serde_json::to_string_pretty(schema)?
            ));
        }
        self.repair_loop(prompt, |_| Ok(())).await
    }

    /// Repair a malformed tool call against the tool's input schema.
    pub async fn repair_tool_call(&self, call: &Value, tool_schema: &Value) -> Result<Value> {
        let prompt = format!(
            "Fix this malformed tool call:\n{}\n\nIt must match this tool schema:\n{}",
            serde_json::to_string_pretty(call)?,
            serde_json::to_string_pretty(tool_schema)?
        );
        self.repair_loop(prompt, |_| Ok(())).await
    }

    /// Repair a malformed plan structure; the result constructs a valid
    /// [`Plan`].
    pub async fn repair_plan(&self, plan: &Value) -> Result<Value> {
        let prompt = format!(
            "Fix this malformed plan so it has a non-empty \"goal\" and a \"steps\" array where \
             every step has a unique \"step_id\" and a \"description\":\n{}",
            serde_json::to_string_pretty(plan)?
        );
        self.repair_loop(prompt, |value| {
            Plan::from_value(value.clone()).map(|_| ()).map_err(|e| {
                Error::validation(format!("repaired plan still invalid: {}", e))
            })
        })
        .await
    }

    /// Repair a step referencing a tool that is not in the registry.
    ///
    /// The repaired step keeps its id, references one of `available_tools`,
    /// and has its `errors` cleared.
    pub async fn repair_missing_tool_step(
        &self,
        step: &PlanStep,
        available_tools: &[ToolSpec],
        plan_goal: &str,
    ) -> Result<PlanStep> {
        let tool_lines: Vec<String> = available_tools
            .iter()
            .map(|t| format!("- {}: {}", t.name, t.description))
            .collect();
        let prompt = format!(
            "Repair this step so it references one of the available tools.\n\n\
             Plan goal: {}\n\nStep:\n{}\n\nAvailable tools:\n{}\n\n\
             Return the corrected step as JSON with fields step_id, description, tool, status.",
            plan_goal,
            serde_json::to_string_pretty(step)?,
            tool_lines.join("\n")
        );

        let step_id = step.step_id.clone();
        let known: Vec<&str> = available_tools.iter().map(|t| t.name.as_str()).collect();
        let value = self
            .repair_loop(prompt, |value| {
                let candidate: PlanStep = serde_json::from_value(value.clone())
                    .map_err(|e| Error::validation(format!("not a valid step: {}", e)))?;
                candidate.validate()?;
                match candidate.tool.as_deref() {
                    Some(tool) if known.contains(&tool) => Ok(()),
                    Some(tool) => Err(Error::validation(format!(
                        "tool '{}' is not in the available tools",
                        tool
                    ))),
                    None => Err(Error::validation("repaired step must reference a tool")),
                }
            })
            .await?;

        let mut repaired: PlanStep = serde_json::from_value(value)?;
        repaired.step_id = step_id;
        repaired.errors = None;
        Ok(repaired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::MockAdapter;
    use pretty_assertions::assert_eq;

    fn supervisor_with(adapter: MockAdapter) -> Supervisor {
        Supervisor::new(Arc::new(adapter))
    }

    #[test]
    fn test_extract_json_object_from_prose() {
        let text = "Here is the result:\n{\"goal\": \"test\", \"steps\": []}\nDone.";
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["goal"], "test");

        assert!(extract_json_object("no json here").is_none());
    }

    #[test]
    fn test_extract_json_object_deep_nesting_via_whole_text() {
        // Two-level nesting defeats the embedded pattern; the whole-text
        // parse catches it.
        let text = r#"{"a": {"b": {"c": 1}}}"#;
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["a"]["b"]["c"], 1);
    }

    #[test]
    fn test_extract_json_array() {
        let text = "Actions:\n[{\"action_type\": \"ADD\", \"reason\": \"x\"}]";
        let value = extract_json_array(text).unwrap();
        assert_eq!(value[0]["action_type"], "ADD");
    }

    #[tokio::test]
    async fn test_repair_json_fixes_malformed_json() {
        let adapter = MockAdapter::new();
        adapter.push_text(r#"{"goal": "test", "steps": [{"step_id": "1"}]}"#);
        let supervisor = supervisor_with(adapter);

        let result = supervisor
            .repair_json(r#"{"goal": "test", "steps": [{"step_id": "1"}]"#, None)
            .await
            .unwrap();
        assert_eq!(result["goal"], "test");
        assert_eq!(result["steps"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_repair_json_retries_then_succeeds() {
        let adapter = MockAdapter::new();
        adapter.push_text("{\"still\": invalid}");
        adapter.push_text(r#"{"goal": "fixed", "steps": []}"#);
        let supervisor = supervisor_with(adapter);

        let result = supervisor.repair_json("{\"invalid\": json}", None).await.unwrap();
        assert_eq!(result["goal"], "fixed");
    }

    #[tokio::test]
    async fn test_repair_json_raises_after_max_attempts() {
        let adapter = MockAdapter::always("{\"still\": invalid}");
        let supervisor = supervisor_with(adapter);

        let err = supervisor
            .repair_json("{\"invalid\": json}", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Supervisor(_)));
    }

    #[tokio::test]
    async fn test_repair_plan_validates_structure() {
        let adapter = MockAdapter::new();
        // First reply misses steps, second constructs.
        adapter.push_text(r#"{"goal": "test"}"#);
        adapter.push_text(
            r#"{"goal": "test", "steps": [{"step_id": "1", "description": "Step 1", "status": "pending"}]}"#,
        );
        let supervisor = supervisor_with(adapter);

        let result = supervisor
            .repair_plan(&serde_json::json!({"goal": "test"}))
            .await
            .unwrap();
        assert_eq!(result["steps"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_repair_tool_call() {
        let adapter = MockAdapter::new();
        adapter.push_text(r#"{"tool_name": "echo", "arguments": {"message": "test"}}"#);
        let supervisor = supervisor_with(adapter);

        let schema = serde_json::json!({
            "type": "object",
            "required": ["tool_name", "arguments"]
        });
        let result = supervisor
            .repair_tool_call(&serde_json::json!({"tool_name": "echo", "args": "test"}), &schema)
            .await
            .unwrap();
        assert_eq!(result["tool_name"], "echo");
        assert!(result.get("arguments").is_some());
    }

    #[tokio::test]
    async fn test_repair_missing_tool_step() {
        let adapter = MockAdapter::new();
        adapter.push_text(
            r#"{"step_id": "step1", "description": "Calculate sum of numbers", "tool": "calculator", "status": "pending"}"#,
        );
        let supervisor = supervisor_with(adapter);

        let step = PlanStep::new("step1", "Calculate sum of numbers")
            .unwrap()
            .with_tool("nonexistent_calculator");
        let mut broken = step.clone();
        broken.errors = Some(vec!["Tool 'nonexistent_calculator' not found".into()]);

        let tools = vec![ToolSpec::new("calculator", "Calculator tool for math operations")];
        let repaired = supervisor
            .repair_missing_tool_step(&broken, &tools, "Calculate mathematical operations")
            .await
            .unwrap();

        assert_eq!(repaired.tool.as_deref(), Some("calculator"));
        assert_eq!(repaired.step_id, "step1");
        assert!(repaired.errors.is_none());
    }

    #[tokio::test]
    async fn test_repair_missing_tool_step_rejects_unknown_tool() {
        let adapter = MockAdapter::always(
            r#"{"step_id": "step1", "description": "Calculate", "tool": "still_missing", "status": "pending"}"#,
        );
        let supervisor = supervisor_with(adapter);

        let step = PlanStep::new("step1", "Calculate").unwrap().with_tool("missing");
        let tools = vec![ToolSpec::new("calculator", "Calculator")];
        let err = supervisor
            .repair_missing_tool_step(&step, &tools, "goal")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Supervisor(_)));
    }

    #[tokio::test]
    async fn test_repair_prompt_includes_available_tools() {
        let adapter = MockAdapter::new();
        adapter.push_text(
            r#"{"step_id": "step1", "description": "Calculate", "tool": "calculator", "status": "pending"}"#,
        );
        let adapter = Arc::new(adapter);
        let supervisor = Supervisor::new(adapter.clone());

        let step = PlanStep::new("step1", "Calculate").unwrap().with_tool("missing");
        let tools = vec![ToolSpec::new("calculator", "Calculator")];
        supervisor
            .repair_missing_tool_step(&step, &tools, "Test goal")
            .await
            .unwrap();

        let prompt = adapter.last_prompt().unwrap();
        assert!(prompt.contains("calculator"));
        assert!(prompt.contains("Repair this step"));
    }
}
