//! Plan and step data model.
//!
//! A [`Plan`] is the declarative execution strategy for a request: an ordered
//! list of [`PlanStep`]s with unique ids and an acyclic dependency graph.
//! Malformed plan JSON is rejected at the boundary; callers route it through
//! supervisor repair before a typed record is constructed.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::{Error, Result};

/// Execution state of a plan step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Complete,
    Failed,
}

impl StepStatus {
    /// Whether the step has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Complete => "complete",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Execution routing for a step.
///
/// When both `tool` and `agent` are set on a step, the tool takes precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind<'a> {
    /// Invoke a registered tool by name.
    Tool(&'a str),
    /// Explicit LLM reasoning step.
    Llm,
}

/// A single step within a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Unique identifier within the owning plan.
    pub step_id: String,
    /// Human-readable description of what the step does.
    pub description: String,
    /// Current execution state.
    #[serde(default)]
    pub status: StepStatus,
    /// Name of a registered tool for tool-based execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// Execution agent type; `"llm"` is the only legal value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    /// Step ids within the same plan that must complete first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    /// Error messages populated by validation, cleared on successful repair.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    /// 1-based position within the plan, populated by step preparation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_index: Option<usize>,
    /// Total step count, populated by step preparation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_steps: Option<usize>,
    /// Context hydrated from dependency outputs before execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incoming_context: Option<String>,
    /// Handoff message produced by execution for downstream steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handoff_to_next: Option<String>,
    /// Raw output of the executed step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_output: Option<String>,
}

impl PlanStep {
    /// Create a pending step with the given id and description.
    pub fn new(step_id: impl Into<String>, description: impl Into<String>) -> Result<Self> {
        let step = Self {
            step_id: step_id.into().trim().to_string(),
            description: description.into().trim().to_string(),
            status: StepStatus::Pending,
            tool: None,
            agent: None,
            dependencies: Vec::new(),
            errors: None,
            step_index: None,
            total_steps: None,
            incoming_context: None,
            handoff_to_next: None,
            step_output: None,
        };
        step.validate()?;
        Ok(step)
    }

    /// Set the tool name for tool-based execution.
    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    /// Set the execution agent (normalized lowercase).
    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into().to_lowercase());
        self
    }

    /// Set the dependency list.
    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Validate field-level invariants (id/description non-empty, agent
    /// domain, tool non-empty if present).
    pub fn validate(&self) -> Result<()> {
        if self.step_id.trim().is_empty() {
            return Err(Error::validation("step_id cannot be empty"));
        }
        if self.description.trim().is_empty() {
            return Err(Error::validation("description cannot be empty"));
        }
        if let Some(tool) = &self.tool {
            if tool.trim().is_empty() {
                return Err(Error::validation(format!(
                    "step '{}': tool name cannot be empty",
                    self.step_id
                )));
            }
        }
        if let Some(agent) = &self.agent {
            if !agent.eq_ignore_ascii_case("llm") {
                return Err(Error::validation(format!(
                    "step '{}': agent must be 'llm', got '{}'",
                    self.step_id, agent
                )));
            }
        }
        Ok(())
    }

    /// Normalize mutable fields after boundary deserialization.
    fn normalize(&mut self) {
        self.step_id = self.step_id.trim().to_string();
        self.description = self.description.trim().to_string();
        if let Some(agent) = &self.agent {
            self.agent = Some(agent.to_lowercase());
        }
    }

    /// Execution routing for this step. Tool takes precedence over agent.
    pub fn kind(&self) -> StepKind<'_> {
        match &self.tool {
            Some(tool) => StepKind::Tool(tool),
            None => StepKind::Llm,
        }
    }

    /// Build a step from a partial patch; `step_id` and `description` are
    /// required, everything else defaults.
    pub fn from_patch(patch: &StepPatch) -> Result<Self> {
        let step_id = patch
            .step_id
            .as_deref()
            .ok_or_else(|| Error::validation("new_step is missing step_id"))?;
        let description = patch
            .description
            .as_deref()
            .ok_or_else(|| Error::validation("new_step is missing description"))?;
        let mut step = Self::new(step_id, description)?;
        if let Some(status) = patch.status {
            step.status = status;
        }
        if let Some(tool) = &patch.tool {
            step.tool = Some(tool.clone());
        }
        if let Some(agent) = &patch.agent {
            step.agent = Some(agent.to_lowercase());
        }
        if let Some(dependencies) = &patch.dependencies {
            step.dependencies = dependencies.clone();
        }
        step.validate()?;
        Ok(step)
    }

    /// Overwrite only the fields present in the patch.
    pub fn apply_patch(&mut self, patch: &StepPatch) -> Result<()> {
        if let Some(step_id) = &patch.step_id {
            self.step_id = step_id.trim().to_string();
        }
        if let Some(description) = &patch.description {
            self.description = description.trim().to_string();
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(tool) = &patch.tool {
            self.tool = Some(tool.clone());
        }
        if let Some(agent) = &patch.agent {
            self.agent = Some(agent.to_lowercase());
        }
        if let Some(dependencies) = &patch.dependencies {
            self.dependencies = dependencies.clone();
        }
        self.validate()
    }
}

/// Partial step used by refinement actions.
///
/// MODIFY actions carry only the fields to overwrite; ADD/REPLACE actions
/// must carry at least `step_id` and `description`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StepStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<String>>,
}

/// Kind of declarative plan mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    Add,
    Modify,
    Remove,
    Replace,
}

/// A declarative mutation of a plan produced by the recursive planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementAction {
    pub action_type: ActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_step_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_step: Option<StepPatch>,
    pub reason: String,
}

/// A declarative plan representing a multi-step execution strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// The objective of the plan.
    pub goal: String,
    /// Ordered list of execution steps.
    pub steps: Vec<PlanStep>,
}

impl Plan {
    /// Create a validated plan.
    pub fn new(goal: impl Into<String>, steps: Vec<PlanStep>) -> Result<Self> {
        let plan = Self {
            goal: goal.into().trim().to_string(),
            steps,
        };
        plan.validate()?;
        Ok(plan)
    }

    /// Deserialize and validate a plan from a JSON value.
    ///
    /// Returns [`Error::Plan`] on both shape and invariant failures so the
    /// caller can route the raw value through supervisor repair.
    pub fn from_value(value: Value) -> Result<Self> {
        let mut plan: Plan = serde_json::from_value(value)
            .map_err(|e| Error::plan(format!("plan deserialization failed: {}", e)))?;
        plan.goal = plan.goal.trim().to_string();
        for step in &mut plan.steps {
            step.normalize();
        }
        plan.validate()
            .map_err(|e| Error::plan(format!("plan validation failed: {}", e)))?;
        Ok(plan)
    }

    /// Deserialize and validate a plan from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| Error::plan(format!("plan is not valid JSON: {}", e)))?;
        Self::from_value(value)
    }

    /// Validate plan invariants: non-empty goal, at least one step, unique
    /// step ids, dependencies referencing existing steps, acyclic graph.
    pub fn validate(&self) -> Result<()> {
        if self.goal.trim().is_empty() {
            return Err(Error::validation("goal cannot be empty"));
        }
        if self.steps.is_empty() {
            return Err(Error::validation("plan must contain at least one step"));
        }
        let mut seen = HashSet::new();
        for step in &self.steps {
            step.validate()?;
            if !seen.insert(step.step_id.as_str()) {
                return Err(Error::validation(format!(
                    "duplicate step_id: {}",
                    step.step_id
                )));
            }
        }
        for step in &self.steps {
            for dep in &step.dependencies {
                if !seen.contains(dep.as_str()) {
                    return Err(Error::validation(format!(
                        "step '{}' depends on unknown step '{}'",
                        step.step_id, dep
                    )));
                }
            }
        }
        self.check_acyclic()
    }

    /// Kahn-style cycle check over the dependency graph.
    fn check_acyclic(&self) -> Result<()> {
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for step in &self.steps {
            in_degree.entry(&step.step_id).or_insert(0);
            for dep in &step.dependencies {
                *in_degree.entry(&step.step_id).or_insert(0) += 1;
                dependents.entry(dep).or_default().push(&step.step_id);
            }
        }

        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut visited = 0usize;
        while let Some(id) = queue.pop_front() {
            visited += 1;
            if let Some(next) = dependents.get(id) {
                for &dependent in next {
                    if let Some(deg) = in_degree.get_mut(dependent) {
                        *deg -= 1;
                        if *deg == 0 {
                            queue.push_back(dependent);
                        }
                    }
                }
            }
        }
        if visited != self.steps.len() {
            return Err(Error::validation("dependency graph contains a cycle"));
        }
        Ok(())
    }

    /// Look up a step by id.
    pub fn step(&self, step_id: &str) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }

    /// Look up a step mutably by id.
    pub fn step_mut(&mut self, step_id: &str) -> Option<&mut PlanStep> {
        self.steps.iter_mut().find(|s| s.step_id == step_id)
    }

    /// Whether every step has reached [`StepStatus::Complete`].
    pub fn all_steps_complete(&self) -> bool {
        self.steps.iter().all(|s| s.status == StepStatus::Complete)
    }

    /// Snapshot as a JSON value for telemetry and cross-component handoff.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
