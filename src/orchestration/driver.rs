//! Outer orchestration loop: passes over A→B→C→D until a terminal status.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::adaptive::{AdaptiveDepth, AdaptiveDepthConfig, ClarityState, TaskProfile};
use crate::convergence::{ConvergenceCriteria, ConvergenceEngine};
use crate::error::Result;
use crate::llm::LlmAdapter;
use crate::memory::Memory;
use crate::plan::{Plan, PlanStep};
use crate::planner::RecursivePlanner;
use crate::supervisor::Supervisor;
use crate::telemetry::JsonlLogger;
use crate::tools::ToolRegistry;
use crate::validation::SemanticValidator;

use super::contracts::{
    enforce_transition, execute_with_retry, validate_transition_inputs,
    validate_transition_outputs, Transition, TransitionInputs, TransitionOutputs,
    MAX_TRANSITION_RETRIES,
};
use super::executor::StepExecutor;
use super::phases::PhaseOrchestrator;
use super::state::{ExecutionPass, OrchestrationState};
use super::types::{EvaluationOutcome, StepExecutionRecord};

/// Reasoning-depth change treated as a major complexity shift, re-entering
/// Phase A instead of Phase B.
const MAJOR_DEPTH_SHIFT: i64 = 2;

/// How a request run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalStatus {
    Converged,
    TtlExpired,
    MaxPassesReached,
}

impl std::fmt::Display for TerminalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Converged => "converged",
            Self::TtlExpired => "ttl_expired",
            Self::MaxPassesReached => "max_passes_reached",
        };
        write!(f, "{}", s)
    }
}

/// Result envelope produced when a run terminates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationOutcome {
    pub status: TerminalStatus,
    pub execution_history: Vec<ExecutionPass>,
    pub final_plan: Plan,
    /// Budget remaining at termination; never negative.
    pub ttl_remaining: i64,
}

/// Builder for [`Orchestrator`] instances.
pub struct OrchestratorBuilder {
    adapter: Arc<dyn LlmAdapter>,
    tool_registry: Option<Arc<dyn ToolRegistry>>,
    memory: Option<Arc<dyn Memory>>,
    telemetry: Option<JsonlLogger>,
    global_ttl: Option<i64>,
    max_passes: usize,
    criteria: Option<ConvergenceCriteria>,
    adaptive_config: Option<AdaptiveDepthConfig>,
    use_planner: bool,
    use_validator: bool,
    use_convergence_engine: bool,
    use_adaptive_depth: bool,
}

impl OrchestratorBuilder {
    pub fn new(adapter: Arc<dyn LlmAdapter>) -> Self {
        Self {
            adapter,
            tool_registry: None,
            memory: None,
            telemetry: None,
            global_ttl: None,
            max_passes: Orchestrator::DEFAULT_MAX_PASSES,
            criteria: None,
            adaptive_config: None,
            use_planner: true,
            use_validator: true,
            use_convergence_engine: true,
            use_adaptive_depth: true,
        }
    }

    pub fn tool_registry(mut self, registry: Arc<dyn ToolRegistry>) -> Self {
        self.tool_registry = Some(registry);
        self
    }

    pub fn memory(mut self, memory: Arc<dyn Memory>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn telemetry(mut self, telemetry: JsonlLogger) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Cap every TTL allocation at this limit.
    pub fn global_ttl(mut self, ttl: i64) -> Self {
        self.global_ttl = Some(ttl);
        self
    }

    /// Bound on the number of A→B→C→D passes.
    pub fn max_passes(mut self, max_passes: usize) -> Self {
        self.max_passes = max_passes.max(1);
        self
    }

    pub fn convergence_criteria(mut self, criteria: ConvergenceCriteria) -> Self {
        self.criteria = Some(criteria);
        self
    }

    pub fn adaptive_config(mut self, config: AdaptiveDepthConfig) -> Self {
        self.adaptive_config = Some(config);
        self
    }

    /// Toggle the recursive planner (on by default).
    pub fn use_planner(mut self, enabled: bool) -> Self {
        self.use_planner = enabled;
        self
    }

    /// Toggle the semantic validator (on by default).
    pub fn use_validator(mut self, enabled: bool) -> Self {
        self.use_validator = enabled;
        self
    }

    /// Toggle the convergence engine (on by default).
    pub fn use_convergence_engine(mut self, enabled: bool) -> Self {
        self.use_convergence_engine = enabled;
        self
    }

    /// Toggle adaptive depth (on by default).
    pub fn use_adaptive_depth(mut self, enabled: bool) -> Self {
        self.use_adaptive_depth = enabled;
        self
    }

    pub fn build(self) -> Orchestrator {
        let adapter = self.adapter;
        let supervisor = Arc::new(Supervisor::new(adapter.clone()));

        let planner = self.use_planner.then(|| RecursivePlanner::new(adapter.clone()));
        let validator = self
            .use_validator
            .then(|| SemanticValidator::new(adapter.clone()));
        let engine = self.use_convergence_engine.then(|| {
            let engine = ConvergenceEngine::new(adapter.clone());
            match self.criteria {
                Some(criteria) => engine.with_criteria(criteria),
                None => engine,
            }
        });
        let adaptive = self.use_adaptive_depth.then(|| {
            let adaptive = AdaptiveDepth::new(adapter.clone());
            match self.adaptive_config {
                Some(config) => adaptive.with_config(config),
                None => adaptive,
            }
        });

        Orchestrator {
            executor: StepExecutor::new(adapter, supervisor),
            planner,
            validator,
            engine,
            adaptive,
            tool_registry: self.tool_registry,
            memory: self.memory,
            telemetry: self.telemetry.unwrap_or_else(JsonlLogger::sink),
            global_ttl: self.global_ttl,
            max_passes: self.max_passes,
            phases: PhaseOrchestrator::new(),
        }
    }
}

/// Drives a request through adaptive multi-pass orchestration.
pub struct Orchestrator {
    executor: StepExecutor,
    planner: Option<RecursivePlanner>,
    validator: Option<SemanticValidator>,
    engine: Option<ConvergenceEngine>,
    adaptive: Option<AdaptiveDepth>,
    tool_registry: Option<Arc<dyn ToolRegistry>>,
    memory: Option<Arc<dyn Memory>>,
    telemetry: JsonlLogger,
    global_ttl: Option<i64>,
    max_passes: usize,
    phases: PhaseOrchestrator,
}

impl Orchestrator {
    /// Default bound on A→B→C→D passes.
    pub const DEFAULT_MAX_PASSES: usize = 5;

    pub fn builder(adapter: Arc<dyn LlmAdapter>) -> OrchestratorBuilder {
        OrchestratorBuilder::new(adapter)
    }

    /// Execute a request, bootstrapping the initial plan from the request
    /// itself when the planner is disabled.
    pub async fn execute(&self, request: &str) -> Result<OrchestrationOutcome> {
        self.execute_with_plan(request, None).await
    }

    /// Execute a request starting from a caller-provided plan.
    pub async fn execute_with_plan(
        &self,
        request: &str,
        initial_plan: Option<Plan>,
    ) -> Result<OrchestrationOutcome> {
        let registry = self.tool_registry.as_deref();
        let memory = self.memory.as_deref();

        // Phase A: profile and budget.
        let phase_a = self
            .phases
            .phase_a_profile_and_ttl(request, self.adaptive.as_ref(), self.global_ttl)
            .await;
        let (mut profile, ttl) = match phase_a.value {
            Some(value) => value,
            None => {
                debug!(error = ?phase_a.error, "Phase A failed, using fallback profile and TTL");
                let fallback = self
                    .global_ttl
                    .unwrap_or_else(|| self.default_ttl());
                (TaskProfile::default_profile(), fallback)
            }
        };

        let initial_plan = match initial_plan {
            Some(plan) => plan,
            None => bootstrap_plan(request)?,
        };
        let mut state = OrchestrationState::with_ttl(initial_plan, ttl);
        let mut step_counter = 0usize;
        let mut reenter_phase_a = false;

        for pass_number in 1..=self.max_passes {
            // Re-entry into Phase A after a major complexity shift.
            let reentered_a = reenter_phase_a;
            if reenter_phase_a {
                reenter_phase_a = false;
                let phase_a = self
                    .phases
                    .phase_a_profile_and_ttl(request, self.adaptive.as_ref(), self.global_ttl)
                    .await;
                if let Some((new_profile, allocated)) = phase_a.value {
                    profile = new_profile;
                    // Re-allocation never grows the remaining budget.
                    state.ttl_remaining = allocated.min(state.ttl_remaining);
                }
            }

            let regenerate = pass_number == 1 || reentered_a;

            // Phase B under the A→B contract, retrying retryable failures.
            let current_ttl = state.ttl_remaining;
            let prior_plan = state.plan.clone();
            let refined_plan = execute_with_retry(
                || self.run_phase_b(request, prior_plan.clone(), &profile, current_ttl, regenerate),
                Transition::AToB,
                MAX_TRANSITION_RETRIES,
            )
            .await?;
            state.plan = refined_plan;

            validate_transition_inputs(
                Transition::BToC,
                &TransitionInputs::BToC {
                    refined_plan: &state.plan,
                },
            )?;

            // Phase C: execute / evaluate / refine until converged, blocked,
            // or out of budget.
            let mut pass_results: Vec<StepExecutionRecord> = Vec::new();
            let mut last_evaluation: Option<EvaluationOutcome> = None;

            loop {
                if state.ttl_expired() {
                    break;
                }

                let batch = self
                    .phases
                    .phase_c_execute_batch(
                        &mut state,
                        &self.executor,
                        registry,
                        memory,
                        &self.telemetry,
                        &mut step_counter,
                    )
                    .await;
                if batch.is_empty() {
                    break;
                }
                pass_results.extend(batch);

                let evaluation = self
                    .phases
                    .phase_c_evaluate(
                        &state,
                        &pass_results,
                        self.validator.as_ref(),
                        self.engine.as_ref(),
                        registry,
                    )
                    .await;
                if evaluation.converged {
                    state.record_pass(pass_number, "C");
                    info!(pass = pass_number, "request converged");
                    return Ok(self.outcome(TerminalStatus::Converged, &state));
                }
                if state.ttl_expired() {
                    last_evaluation = Some(evaluation);
                    break;
                }

                let refine = self
                    .phases
                    .phase_c_refine(&mut state, &evaluation, self.planner.as_ref())
                    .await;
                if !refine.succeeded() {
                    debug!(error = ?refine.error, "refinement failed, plan retained");
                }
                last_evaluation = Some(evaluation);
            }

            state.record_pass(pass_number, "C");

            validate_transition_outputs(
                Transition::BToC,
                &TransitionOutputs::BToC {
                    execution_results: &pass_results,
                },
            )?;

            if state.ttl_expired() {
                return Ok(self.outcome(TerminalStatus::TtlExpired, &state));
            }

            // Phase D under the C→D and D→A/B contracts. Skipped entirely
            // when the pass executed nothing (a blocked plan re-plans in B).
            if let Some(evaluation) = &last_evaluation {
                enforce_transition(
                    Transition::CToD,
                    &TransitionInputs::CToD {
                        execution_results: &pass_results,
                        evaluation_results: evaluation,
                    },
                    &TransitionOutputs::CToD,
                )?;

                let clarity_states: Vec<ClarityState> =
                    pass_results.iter().map(|r| r.clarity).collect();
                let phase_d = self
                    .phases
                    .phase_d_adaptive_depth(
                        &mut state,
                        &profile,
                        Some(evaluation),
                        &clarity_states,
                        self.adaptive.as_ref(),
                        self.global_ttl,
                    )
                    .await;

                if let Some(Some(updated)) = phase_d.value {
                    let depth_delta = i64::from(updated.reasoning_depth)
                        - i64::from(profile.reasoning_depth);
                    reenter_phase_a = depth_delta.abs() >= MAJOR_DEPTH_SHIFT;
                    profile = updated;
                }

                enforce_transition(
                    Transition::DToAOrB,
                    &TransitionInputs::DToAOrB {
                        task_profile: &profile,
                        ttl_remaining: state.ttl_remaining,
                    },
                    &TransitionOutputs::DToAOrB,
                )?;
                state.record_pass(pass_number, "D");
            }
        }

        Ok(self.outcome(TerminalStatus::MaxPassesReached, &state))
    }

    /// Phase B wrapped in A→B contract enforcement.
    async fn run_phase_b(
        &self,
        request: &str,
        prior_plan: Plan,
        profile: &TaskProfile,
        ttl: i64,
        regenerate: bool,
    ) -> Result<Plan> {
        validate_transition_inputs(
            Transition::AToB,
            &TransitionInputs::AToB {
                task_profile: profile,
                initial_plan: &prior_plan,
                ttl,
            },
        )?;

        let outcome = self
            .phases
            .phase_b_plan_and_refine(
                request,
                Some(prior_plan.clone()),
                profile,
                self.planner.as_ref(),
                self.validator.as_ref(),
                self.tool_registry.as_deref(),
                regenerate,
            )
            .await;
        let refined_plan = match outcome.value {
            Some(plan) => plan,
            None => prior_plan.clone(),
        };

        enforce_transition(
            Transition::AToB,
            &TransitionInputs::AToB {
                task_profile: profile,
                initial_plan: &prior_plan,
                ttl,
            },
            &TransitionOutputs::AToB {
                refined_plan: &refined_plan,
            },
        )?;
        Ok(refined_plan)
    }

    fn default_ttl(&self) -> i64 {
        self.adaptive
            .as_ref()
            .map(|a| a.config().default_ttl)
            .unwrap_or(OrchestrationState::DEFAULT_TTL)
    }

    fn outcome(&self, status: TerminalStatus, state: &OrchestrationState) -> OrchestrationOutcome {
        OrchestrationOutcome {
            status,
            execution_history: state.execution_passes.clone(),
            final_plan: state.plan.clone(),
            ttl_remaining: state.ttl_remaining.max(0),
        }
    }
}

/// Single-step fallback plan when no plan was provided and the planner is
/// unavailable.
fn bootstrap_plan(request: &str) -> Result<Plan> {
    Plan::new(
        request,
        vec![PlanStep::new("step1", format!("Respond to the request: {}", request))?
            .with_agent("llm")],
    )
}
