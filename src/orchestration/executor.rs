//! Single-step execution: routing, memory writeback, handoff production.

use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::adaptive::ClarityState;
use crate::error::Error;
use crate::llm::{call_llm_with_provider_error_handling, GenerateRequest, LlmAdapter};
use crate::memory::{step_result_key, Memory};
use crate::plan::{PlanStep, StepKind, StepStatus};
use crate::supervisor::Supervisor;
use crate::telemetry::ErrorRecord;
use crate::tools::ToolRegistry;

use super::state::OrchestrationState;
use super::types::StepExecutionRecord;

/// Telemetry ingredients collected while executing one step.
#[derive(Debug, Default)]
pub struct StepTelemetry {
    pub llm_output: Option<Value>,
    pub tool_calls: Vec<Value>,
    pub supervisor_actions: Vec<Value>,
    pub errors: Vec<ErrorRecord>,
}

/// Executes a single plan step, routing on [`StepKind`].
pub struct StepExecutor {
    adapter: Arc<dyn LlmAdapter>,
    supervisor: Arc<Supervisor>,
}

impl StepExecutor {
    pub fn new(adapter: Arc<dyn LlmAdapter>, supervisor: Arc<Supervisor>) -> Self {
        Self {
            adapter,
            supervisor,
        }
    }

    /// Execute the step at `step_idx` in the state's plan.
    ///
    /// The step ends Complete or Failed; a failure is captured in the
    /// returned record and never escapes.
    pub async fn execute_step(
        &self,
        state: &mut OrchestrationState,
        step_idx: usize,
        tool_registry: Option<&dyn ToolRegistry>,
        memory: Option<&dyn Memory>,
    ) -> (StepExecutionRecord, StepTelemetry) {
        let step_id = state.plan.steps[step_idx].step_id.clone();
        let mut telemetry = StepTelemetry::default();

        if let Err(err) = state.start_step(&step_id) {
            telemetry.errors.push(ErrorRecord::from_error(&err));
            return (
                StepExecutionRecord {
                    step_id,
                    status: StepStatus::Failed,
                    output: None,
                    error: Some(err.to_string()),
                    clarity: ClarityState::Blocked,
                },
                telemetry,
            );
        }

        let result = self
            .run_step(state, step_idx, tool_registry, &mut telemetry)
            .await;

        match result {
            Ok(output) => {
                if let Some(memory) = memory {
                    if let Err(err) = memory.write(&step_result_key(&step_id), &output) {
                        debug!(step_id = %step_id, error = %err, "memory write failed");
                        telemetry.errors.push(ErrorRecord::from_error(&err));
                    }
                }

                let step = &mut state.plan.steps[step_idx];
                step.step_output = Some(output.clone());
                // Multi-line outputs hand their first line to dependents;
                // single-line outputs are read back from memory as-is.
                if output.lines().count() > 1 {
                    step.handoff_to_next = output.lines().next().map(str::to_string);
                }
                let had_errors = step.errors.as_ref().is_some_and(|e| !e.is_empty());
                state.complete_current_step();

                (
                    StepExecutionRecord {
                        step_id,
                        status: StepStatus::Complete,
                        output: Some(output),
                        error: None,
                        clarity: if had_errors {
                            ClarityState::PartiallyClear
                        } else {
                            ClarityState::Clear
                        },
                    },
                    telemetry,
                )
            }
            Err(err) => {
                telemetry.errors.push(ErrorRecord::from_error(&err));
                state.fail_current_step(err.to_string());
                (
                    StepExecutionRecord {
                        step_id,
                        status: StepStatus::Failed,
                        output: None,
                        error: Some(err.to_string()),
                        clarity: ClarityState::Blocked,
                    },
                    telemetry,
                )
            }
        }
    }

    async fn run_step(
        &self,
        state: &mut OrchestrationState,
        step_idx: usize,
        tool_registry: Option<&dyn ToolRegistry>,
        telemetry: &mut StepTelemetry,
    ) -> crate::error::Result<String> {
        let step = state.plan.steps[step_idx].clone();
        match step.kind() {
            StepKind::Tool(tool_name) => {
                let registry = tool_registry.ok_or_else(|| {
                    Error::Tool(format!(
                        "step '{}' requires tool '{}' but no registry is available",
                        step.step_id, tool_name
                    ))
                })?;
                let tool_name = self
                    .resolve_tool(state, step_idx, tool_name, registry, telemetry)
                    .await?;
                self.invoke_tool(&state.plan.steps[step_idx], &tool_name, registry, telemetry)
                    .await
            }
            StepKind::Llm => self.run_llm_step(&step, &state.plan.goal, telemetry).await,
        }
    }

    /// Resolve a tool name, routing unknown names through supervisor repair.
    async fn resolve_tool(
        &self,
        state: &mut OrchestrationState,
        step_idx: usize,
        tool_name: &str,
        registry: &dyn ToolRegistry,
        telemetry: &mut StepTelemetry,
    ) -> crate::error::Result<String> {
        if registry.get(tool_name).is_some() {
            return Ok(tool_name.to_string());
        }

        debug!(tool = %tool_name, "unknown tool, requesting supervisor repair");
        let mut broken = state.plan.steps[step_idx].clone();
        broken
            .errors
            .get_or_insert_with(Vec::new)
            .push(format!("Tool '{}' not found in registry", tool_name));

        let repaired = self
            .supervisor
            .repair_missing_tool_step(&broken, &registry.list_all(), &state.plan.goal)
            .await?;
        let repaired_tool = repaired
            .tool
            .clone()
            .ok_or_else(|| Error::Tool("repaired step lost its tool reference".into()))?;

        telemetry.supervisor_actions.push(serde_json::json!({
            "action": "repair_missing_tool_step",
            "step_id": repaired.step_id,
            "original_tool": tool_name,
            "repaired_tool": repaired_tool,
        }));

        let slot = &mut state.plan.steps[step_idx];
        slot.description = repaired.description;
        slot.tool = Some(repaired_tool.clone());
        slot.errors = None;
        Ok(repaired_tool)
    }

    async fn invoke_tool(
        &self,
        step: &PlanStep,
        tool_name: &str,
        registry: &dyn ToolRegistry,
        telemetry: &mut StepTelemetry,
    ) -> crate::error::Result<String> {
        let args = serde_json::json!({
            "description": step.description,
            "incoming_context": step.incoming_context,
        });

        match registry.invoke(tool_name, args.clone()).await {
            Ok(result) => {
                telemetry.tool_calls.push(serde_json::json!({
                    "tool": tool_name,
                    "args": args,
                    "result": result,
                }));
                Ok(match result {
                    Value::String(text) => text,
                    other => other.to_string(),
                })
            }
            Err(err) => {
                telemetry.tool_calls.push(serde_json::json!({
                    "tool": tool_name,
                    "args": args,
                    "error": err.to_string(),
                }));
                Err(err)
            }
        }
    }

    async fn run_llm_step(
        &self,
        step: &PlanStep,
        goal: &str,
        telemetry: &mut StepTelemetry,
    ) -> crate::error::Result<String> {
        let mut prompt = format!("Goal: {}\n\n", goal);
        if let (Some(index), Some(total)) = (step.step_index, step.total_steps) {
            prompt.push_str(&format!("Step {} of {}: {}\n", index, total, step.description));
        } else {
            prompt.push_str(&format!("Step: {}\n", step.description));
        }
        if let Some(context) = &step.incoming_context {
            prompt.push_str(&format!("\nContext from earlier steps:\n{}\n", context));
        }
        prompt.push_str("\nCarry out this step and state the result.");

        let request = GenerateRequest::new(
            prompt,
            "You are executing one step of a larger plan. Be concrete and concise.",
        );
        let response = call_llm_with_provider_error_handling(&*self.adapter, request, "C").await?;
        telemetry.llm_output = Some(Value::String(response.text.clone()));
        Ok(response.text)
    }
}
