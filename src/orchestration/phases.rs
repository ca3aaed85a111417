//! Phase implementations: A (profile & TTL), B (plan & refine), C
//! (execute / evaluate / refine), D (adaptive depth).

use tracing::{debug, warn};

use crate::adaptive::{AdaptiveDepth, ClarityState, TaskProfile};
use crate::convergence::ConvergenceEngine;
use crate::memory::Memory;
use crate::plan::{Plan, RefinementAction};
use crate::planner::RecursivePlanner;
use crate::telemetry::{CycleRecord, JsonlLogger};
use crate::tools::ToolRegistry;
use crate::validation::{ArtifactType, IssueSeverity, SemanticValidationReport, SemanticValidator};

use super::executor::StepExecutor;
use super::refinement::PlanRefinement;
use super::state::OrchestrationState;
use super::step_prep::StepPreparation;
use super::types::{EvaluationOutcome, PhaseOutcome, StepExecutionRecord};

/// Implements the individual phases of the A→B→C→D loop.
///
/// Collaborators are passed per call and borrowed only for the duration of
/// the phase; every optional collaborator has a degrade path.
#[derive(Default)]
pub struct PhaseOrchestrator {
    step_prep: StepPreparation,
    refinement: PlanRefinement,
}

impl PhaseOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Phase A: infer the task profile and allocate TTL.
    ///
    /// Without an adaptive depth engine the default profile and the global
    /// TTL (or the engine-independent default) are used. A failed outcome
    /// leaves the fallback choice to the caller.
    pub async fn phase_a_profile_and_ttl(
        &self,
        request: &str,
        adaptive_depth: Option<&AdaptiveDepth>,
        global_ttl: Option<i64>,
    ) -> PhaseOutcome<(TaskProfile, i64)> {
        let Some(adaptive) = adaptive_depth else {
            let ttl = global_ttl.unwrap_or(OrchestrationState::DEFAULT_TTL);
            return PhaseOutcome::ok((TaskProfile::default_profile(), ttl));
        };

        match adaptive.infer_task_profile(request, None).await {
            Ok(profile) => {
                let ttl = adaptive.allocate_ttl(&profile, global_ttl);
                PhaseOutcome::ok((profile, ttl))
            }
            Err(err) => PhaseOutcome::failed(err.to_string()),
        }
    }

    /// Phase B: generate the initial plan and refine it against validation
    /// issues.
    ///
    /// With `regenerate` set the planner produces a fresh plan (entry from
    /// Phase A); without it the prior plan is kept and only refined
    /// (re-entry from Phase D). A planner failure is non-fatal: the prior
    /// plan is retained. The outcome fails only when no plan exists at all.
    #[allow(clippy::too_many_arguments)]
    pub async fn phase_b_plan_and_refine(
        &self,
        request: &str,
        prior_plan: Option<Plan>,
        task_profile: &TaskProfile,
        planner: Option<&RecursivePlanner>,
        validator: Option<&SemanticValidator>,
        tool_registry: Option<&dyn ToolRegistry>,
        regenerate: bool,
    ) -> PhaseOutcome<Plan> {
        let mut plan = prior_plan;

        if let Some(planner) = planner.filter(|_| regenerate || plan.is_none()) {
            match planner.generate_plan(request, task_profile).await {
                Ok(generated) => plan = Some(generated),
                Err(err) => {
                    warn!(error = %err, "plan generation failed, retaining prior plan");
                }
            }
        }

        let Some(mut plan) = plan else {
            return PhaseOutcome::failed("no plan available and plan generation failed");
        };

        if let Some(validator) = validator {
            let report = validator
                .validate(&plan.to_value(), ArtifactType::Plan, tool_registry)
                .await;
            if report.has_issues() {
                if let Some(planner) = planner {
                    match planner.refine_plan(&plan, &report.issues, &[]).await {
                        Ok(actions) => {
                            let (applied, updated, error) =
                                self.refinement.apply_actions(&plan, &actions);
                            if applied {
                                plan = updated;
                            } else if let Some(error) = error {
                                warn!(error = %error, "plan refinement failed, retaining plan");
                            }
                        }
                        Err(err) => {
                            warn!(error = %err, "refinement synthesis failed, retaining plan");
                        }
                    }
                }
            }
        }

        self.step_prep.populate_step_indices(&mut plan);
        PhaseOutcome::ok(plan)
    }

    /// Phase C-execute: run the ready batch, decrementing TTL once per
    /// executed step and appending one telemetry record each.
    ///
    /// A step failure is recorded and does not abort the batch; TTL
    /// exhaustion mid-batch stops further execution.
    #[allow(clippy::too_many_arguments)]
    pub async fn phase_c_execute_batch(
        &self,
        state: &mut OrchestrationState,
        executor: &StepExecutor,
        tool_registry: Option<&dyn ToolRegistry>,
        memory: Option<&dyn Memory>,
        telemetry: &JsonlLogger,
        step_counter: &mut usize,
    ) -> Vec<StepExecutionRecord> {
        let ready = self.step_prep.get_ready_steps(&mut state.plan, memory);
        let mut records = Vec::new();

        for step_idx in ready {
            if state.ttl_expired() {
                debug!("TTL exhausted mid-batch, stopping execution");
                break;
            }

            let (record, step_telemetry) = executor
                .execute_step(state, step_idx, tool_registry, memory)
                .await;
            state.ttl_remaining -= 1;
            *step_counter += 1;

            let mut cycle = CycleRecord::new(
                *step_counter,
                state.plan.to_value(),
                state.ttl_remaining.max(0),
            )
            .with_correlation_id(state.correlation_id.clone());
            cycle.llm_output = step_telemetry.llm_output;
            cycle.supervisor_actions = step_telemetry.supervisor_actions;
            cycle.tool_calls = step_telemetry.tool_calls;
            cycle.errors = step_telemetry.errors;
            telemetry.append(&cycle);

            records.push(record);
        }

        records
    }

    /// Phase C-evaluate: validate the execution artifact and decide
    /// convergence.
    ///
    /// Auto-convergence short-circuits when every step is Complete and no
    /// issue of severity HIGH or above is present; otherwise the engine
    /// decides (absent engine: not converged).
    pub async fn phase_c_evaluate(
        &self,
        state: &OrchestrationState,
        execution_results: &[StepExecutionRecord],
        validator: Option<&SemanticValidator>,
        convergence_engine: Option<&ConvergenceEngine>,
        tool_registry: Option<&dyn ToolRegistry>,
    ) -> EvaluationOutcome {
        let artifact = serde_json::json!({
            "plan": state.plan.to_value(),
            "execution_results": execution_results
                .iter()
                .map(StepExecutionRecord::to_value)
                .collect::<Vec<_>>(),
        });

        let semantic_validation = match validator {
            Some(validator) => {
                validator
                    .validate(&artifact, ArtifactType::ExecutionArtifact, tool_registry)
                    .await
            }
            None => SemanticValidationReport::empty(ArtifactType::ExecutionArtifact),
        };

        if state.plan.all_steps_complete()
            && !semantic_validation.has_issue_at_least(IssueSeverity::High)
        {
            return EvaluationOutcome {
                converged: true,
                needs_refinement: false,
                semantic_validation,
                convergence_assessment: None,
            };
        }

        let convergence_assessment = match convergence_engine {
            Some(engine) => {
                let results: Vec<serde_json::Value> = execution_results
                    .iter()
                    .map(StepExecutionRecord::to_value)
                    .collect();
                Some(
                    engine
                        .assess(&state.plan.to_value(), &results, &semantic_validation, None)
                        .await,
                )
            }
            None => None,
        };

        let converged = convergence_assessment
            .as_ref()
            .map(|a| a.converged)
            .unwrap_or(false);

        EvaluationOutcome {
            converged,
            needs_refinement: !converged,
            semantic_validation,
            convergence_assessment,
        }
    }

    /// Phase C-refine: request refinement actions and apply them.
    ///
    /// A planner or application failure returns a failed outcome with the
    /// original plan retained.
    pub async fn phase_c_refine(
        &self,
        state: &mut OrchestrationState,
        evaluation: &EvaluationOutcome,
        planner: Option<&RecursivePlanner>,
    ) -> PhaseOutcome<Vec<RefinementAction>> {
        let Some(planner) = planner else {
            return PhaseOutcome::ok(Vec::new());
        };

        let reason_codes = evaluation.convergence_reason_codes();
        let actions = match planner
            .refine_plan(
                &state.plan,
                &evaluation.semantic_validation.issues,
                &reason_codes,
            )
            .await
        {
            Ok(actions) => actions,
            Err(err) => return PhaseOutcome::failed(err.to_string()),
        };

        let (applied, updated, error) = self.refinement.apply_actions(&state.plan, &actions);
        if !applied {
            return PhaseOutcome::failed(
                error.unwrap_or_else(|| "refinement application failed".into()),
            );
        }

        state.plan = updated;
        self.step_prep.populate_step_indices(&mut state.plan);
        PhaseOutcome::ok(actions)
    }

    /// Phase D: update the task profile on complexity mismatch and adjust
    /// TTL for the new profile.
    ///
    /// Returns the updated profile when the three trigger conditions hold
    /// and the update succeeds, `None` otherwise.
    pub async fn phase_d_adaptive_depth(
        &self,
        state: &mut OrchestrationState,
        task_profile: &TaskProfile,
        evaluation: Option<&EvaluationOutcome>,
        clarity_states: &[ClarityState],
        adaptive_depth: Option<&AdaptiveDepth>,
        global_ttl: Option<i64>,
    ) -> PhaseOutcome<Option<TaskProfile>> {
        let Some(adaptive) = adaptive_depth else {
            return PhaseOutcome::ok(None);
        };
        let Some(evaluation) = evaluation else {
            return PhaseOutcome::ok(None);
        };
        let Some(assessment) = &evaluation.convergence_assessment else {
            return PhaseOutcome::ok(None);
        };

        let updated = adaptive
            .update_task_profile(
                task_profile,
                assessment,
                &evaluation.semantic_validation,
                clarity_states,
            )
            .await;

        match updated {
            Some(new_profile) => {
                let (adjusted_ttl, reason) = adaptive.adjust_ttl_for_updated_profile(
                    task_profile,
                    &new_profile,
                    state.ttl_remaining,
                    global_ttl,
                );
                debug!(ttl = adjusted_ttl, reason = %reason, "TTL adjusted for updated profile");
                state.ttl_remaining = adjusted_ttl;
                PhaseOutcome::ok(Some(new_profile))
            }
            None => PhaseOutcome::ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adaptive::AdaptiveDepth;
    use crate::convergence::{ConsistencyStatus, ConvergenceAssessment};
    use crate::llm::mock::MockAdapter;
    use crate::llm::LlmAdapter;
    use crate::memory::InMemoryStore;
    use crate::plan::{PlanStep, StepStatus};
    use crate::supervisor::Supervisor;
    use crate::validation::{IssueType, ValidationIssue};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn orchestrator() -> PhaseOrchestrator {
        PhaseOrchestrator::new()
    }

    fn executor_with(adapter: MockAdapter) -> StepExecutor {
        let adapter: Arc<dyn LlmAdapter> = Arc::new(adapter);
        let supervisor = Arc::new(Supervisor::new(adapter.clone()));
        StepExecutor::new(adapter, supervisor)
    }

    fn two_step_state() -> OrchestrationState {
        let plan = Plan::new(
            "Test goal",
            vec![
                PlanStep::new("step1", "Step 1").unwrap(),
                PlanStep::new("step2", "Step 2")
                    .unwrap()
                    .with_dependencies(vec!["step1".into()]),
            ],
        )
        .unwrap();
        OrchestrationState::with_ttl(plan, 10)
    }

    fn profile_json() -> String {
        serde_json::json!({
            "reasoning_depth": 3,
            "information_sufficiency": 0.7,
            "expected_tool_usage": "moderate",
            "output_breadth": "moderate",
            "confidence_requirement": "medium",
            "raw_inference": "Test inference"
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_phase_a_with_adaptive_depth() {
        let adaptive = AdaptiveDepth::new(Arc::new(MockAdapter::always(profile_json())));
        let outcome = orchestrator()
            .phase_a_profile_and_ttl("Test request", Some(&adaptive), Some(20))
            .await;

        assert!(outcome.succeeded());
        let (profile, ttl) = outcome.value.unwrap();
        assert_eq!(profile.reasoning_depth, 3);
        // 2.0 * (3*1.5) * (0.7*1.0) * 1.0 * 1.0 * 1.0 = 6.3 -> 6
        assert_eq!(ttl, 6);
    }

    #[tokio::test]
    async fn test_phase_a_without_adaptive_depth_uses_global_ttl() {
        let outcome = orchestrator()
            .phase_a_profile_and_ttl("Test request", None, Some(20))
            .await;

        assert!(outcome.succeeded());
        let (profile, ttl) = outcome.value.unwrap();
        assert_eq!(profile.profile_version, 1);
        assert_eq!(ttl, 20);
    }

    #[tokio::test]
    async fn test_phase_a_empty_request_fails() {
        let adaptive = AdaptiveDepth::new(Arc::new(MockAdapter::new()));
        let outcome = orchestrator()
            .phase_a_profile_and_ttl("", Some(&adaptive), Some(20))
            .await;

        assert!(!outcome.succeeded());
        assert!(outcome.value.is_none());
    }

    #[tokio::test]
    async fn test_phase_b_without_planner_keeps_plan() {
        let state = two_step_state();
        let outcome = orchestrator()
            .phase_b_plan_and_refine(
                "Test request",
                Some(state.plan.clone()),
                &TaskProfile::default_profile(),
                None,
                None,
                None,
                true,
            )
            .await;

        assert!(outcome.succeeded());
        let plan = outcome.value.unwrap();
        assert_eq!(plan.steps.len(), 2);
        // Step indices are populated on the way out.
        assert_eq!(plan.steps[0].step_index, Some(1));
        assert_eq!(plan.steps[1].total_steps, Some(2));
    }

    #[tokio::test]
    async fn test_phase_b_planner_failure_retains_prior_plan() {
        let adapter = MockAdapter::always("not a plan at all");
        let planner = RecursivePlanner::new(Arc::new(adapter));
        let state = two_step_state();

        let outcome = orchestrator()
            .phase_b_plan_and_refine(
                "Test request",
                Some(state.plan.clone()),
                &TaskProfile::default_profile(),
                Some(&planner),
                None,
                None,
                true,
            )
            .await;

        assert!(outcome.succeeded());
        assert_eq!(outcome.value.unwrap().goal, "Test goal");
    }

    #[tokio::test]
    async fn test_phase_b_reentry_refines_without_regenerating() {
        // Re-entry from Phase D: the planner is present but generation is
        // skipped, so the prior plan survives untouched.
        let adapter = MockAdapter::always(
            r#"{"goal": "Replacement", "steps": [{"step_id": "x", "description": "X"}]}"#,
        );
        let planner = RecursivePlanner::new(Arc::new(adapter));
        let state = two_step_state();

        let outcome = orchestrator()
            .phase_b_plan_and_refine(
                "Test request",
                Some(state.plan.clone()),
                &TaskProfile::default_profile(),
                Some(&planner),
                None,
                None,
                false,
            )
            .await;

        assert!(outcome.succeeded());
        assert_eq!(outcome.value.unwrap().goal, "Test goal");
    }

    #[tokio::test]
    async fn test_phase_b_no_plan_and_no_planner_fails() {
        let outcome = orchestrator()
            .phase_b_plan_and_refine(
                "Test request",
                None,
                &TaskProfile::default_profile(),
                None,
                None,
                None,
                true,
            )
            .await;
        assert!(!outcome.succeeded());
    }

    #[tokio::test]
    async fn test_phase_c_execute_batch_decrements_ttl_per_step() {
        let mut state = two_step_state();
        let executor = executor_with(MockAdapter::always("done"));
        let telemetry = JsonlLogger::buffered();
        let memory = InMemoryStore::new();
        let mut counter = 0;

        let records = orchestrator()
            .phase_c_execute_batch(
                &mut state,
                &executor,
                None,
                Some(&memory as &dyn Memory),
                &telemetry,
                &mut counter,
            )
            .await;

        // Only step1 is ready in the first batch; step2 depends on it.
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].step_id, "step1");
        assert_eq!(state.ttl_remaining, 9);
        assert_eq!(counter, 1);

        let logged = telemetry.buffered_records().unwrap();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].step_number, 1);
        assert_eq!(logged[0].ttl_remaining, 9);
        assert_eq!(logged[0].correlation_id, state.correlation_id);

        // Second batch picks up the dependent step.
        let records = orchestrator()
            .phase_c_execute_batch(
                &mut state,
                &executor,
                None,
                Some(&memory as &dyn Memory),
                &telemetry,
                &mut counter,
            )
            .await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].step_id, "step2");
        assert_eq!(state.ttl_remaining, 8);
    }

    #[tokio::test]
    async fn test_phase_c_execute_step_failure_does_not_abort_batch() {
        let plan = Plan::new(
            "Test goal",
            vec![
                PlanStep::new("step1", "Step 1").unwrap(),
                PlanStep::new("step2", "Step 2").unwrap(),
            ],
        )
        .unwrap();
        let mut state = OrchestrationState::with_ttl(plan, 10);

        let adapter = MockAdapter::new();
        adapter.push_failure("Invalid API key - authentication failed");
        adapter.push_text("second step ok");
        let executor = executor_with(adapter);
        let telemetry = JsonlLogger::sink();
        let mut counter = 0;

        let records = orchestrator()
            .phase_c_execute_batch(&mut state, &executor, None, None, &telemetry, &mut counter)
            .await;

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status, StepStatus::Failed);
        assert_eq!(records[1].status, StepStatus::Complete);
        // TTL decremented for both, irrespective of success.
        assert_eq!(state.ttl_remaining, 8);
    }

    #[tokio::test]
    async fn test_phase_c_execute_stops_when_ttl_exhausted() {
        let plan = Plan::new(
            "Test goal",
            vec![
                PlanStep::new("step1", "Step 1").unwrap(),
                PlanStep::new("step2", "Step 2").unwrap(),
            ],
        )
        .unwrap();
        let mut state = OrchestrationState::with_ttl(plan, 1);
        let executor = executor_with(MockAdapter::always("done"));
        let telemetry = JsonlLogger::sink();
        let mut counter = 0;

        let records = orchestrator()
            .phase_c_execute_batch(&mut state, &executor, None, None, &telemetry, &mut counter)
            .await;

        assert_eq!(records.len(), 1);
        assert_eq!(state.ttl_remaining, 0);
        assert_eq!(state.plan.steps[1].status, StepStatus::Pending);
    }

    #[tokio::test]
    async fn test_phase_c_evaluate_auto_convergence() {
        let mut state = two_step_state();
        for step in &mut state.plan.steps {
            step.status = StepStatus::Complete;
        }

        let outcome = orchestrator()
            .phase_c_evaluate(&state, &[], None, None, None)
            .await;

        assert!(outcome.converged);
        assert!(!outcome.needs_refinement);
        assert!(outcome.convergence_assessment.is_none());
    }

    #[tokio::test]
    async fn test_phase_c_evaluate_high_severity_blocks_auto_convergence() {
        let mut state = two_step_state();
        for step in &mut state.plan.steps {
            step.status = StepStatus::Complete;
        }

        // Validator reports a HIGH issue; no engine means not converged.
        let adapter = MockAdapter::always(
            r#"{"issues": [{"type": "consistency", "severity": "HIGH", "description": "mismatch"}]}"#,
        );
        let validator = SemanticValidator::new(Arc::new(adapter));

        let outcome = orchestrator()
            .phase_c_evaluate(&state, &[], Some(&validator), None, None)
            .await;

        assert!(!outcome.converged);
        assert!(outcome.needs_refinement);
        assert!(outcome.semantic_validation.has_issues());
    }

    #[tokio::test]
    async fn test_phase_c_evaluate_uses_engine_when_not_auto() {
        let state = two_step_state();

        let engine_adapter = MockAdapter::always(
            serde_json::json!({
                "completeness_score": 0.98,
                "coherence_score": 0.95,
                "consistency_status": {
                    "plan_aligned": true, "step_aligned": true,
                    "answer_aligned": true, "memory_aligned": true
                },
                "detected_issues": []
            })
            .to_string(),
        );
        let engine = ConvergenceEngine::new(Arc::new(engine_adapter));

        let outcome = orchestrator()
            .phase_c_evaluate(&state, &[], None, Some(&engine), None)
            .await;

        assert!(outcome.converged);
        let assessment = outcome.convergence_assessment.unwrap();
        assert_eq!(assessment.completeness_score, 0.98);
    }

    #[tokio::test]
    async fn test_phase_c_refine_without_planner_is_noop() {
        let mut state = two_step_state();
        let evaluation = EvaluationOutcome {
            converged: false,
            needs_refinement: true,
            semantic_validation: SemanticValidationReport::empty(ArtifactType::ExecutionArtifact),
            convergence_assessment: None,
        };

        let outcome = orchestrator()
            .phase_c_refine(&mut state, &evaluation, None)
            .await;

        assert!(outcome.succeeded());
        assert!(outcome.value.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_phase_c_refine_applies_actions_and_reindexes() {
        let mut state = two_step_state();
        let adapter = MockAdapter::always(
            r#"[{"action_type": "ADD", "new_step": {"step_id": "step3", "description": "Step 3"}, "reason": "coverage"}]"#,
        );
        let planner = RecursivePlanner::new(Arc::new(adapter));
        let evaluation = EvaluationOutcome {
            converged: false,
            needs_refinement: true,
            semantic_validation: SemanticValidationReport::empty(ArtifactType::ExecutionArtifact),
            convergence_assessment: None,
        };

        let outcome = orchestrator()
            .phase_c_refine(&mut state, &evaluation, Some(&planner))
            .await;

        assert!(outcome.succeeded());
        assert_eq!(outcome.value.unwrap().len(), 1);
        assert_eq!(state.plan.steps.len(), 3);
        assert_eq!(state.plan.steps[2].step_index, Some(3));
        assert_eq!(state.plan.steps[0].total_steps, Some(3));
    }

    #[tokio::test]
    async fn test_phase_c_refine_failure_retains_plan() {
        let mut state = two_step_state();
        let adapter = MockAdapter::always("no actions here");
        let planner = RecursivePlanner::new(Arc::new(adapter));
        let evaluation = EvaluationOutcome {
            converged: false,
            needs_refinement: true,
            semantic_validation: SemanticValidationReport::empty(ArtifactType::ExecutionArtifact),
            convergence_assessment: None,
        };

        let outcome = orchestrator()
            .phase_c_refine(&mut state, &evaluation, Some(&planner))
            .await;

        assert!(!outcome.succeeded());
        assert_eq!(state.plan.steps.len(), 2);
    }

    fn failed_evaluation() -> EvaluationOutcome {
        EvaluationOutcome {
            converged: false,
            needs_refinement: true,
            semantic_validation: SemanticValidationReport::new(
                ArtifactType::ExecutionArtifact,
                vec![ValidationIssue::new(
                    IssueType::Specificity,
                    IssueSeverity::High,
                    "vague",
                )],
            ),
            convergence_assessment: Some(ConvergenceAssessment {
                converged: false,
                reason_codes: vec!["completeness_below_threshold".into()],
                completeness_score: 0.4,
                coherence_score: 0.5,
                consistency_status: ConsistencyStatus::default(),
                detected_issues: vec![],
                metadata: HashMap::new(),
            }),
        }
    }

    #[tokio::test]
    async fn test_phase_d_without_adaptive_depth() {
        let mut state = two_step_state();
        let outcome = orchestrator()
            .phase_d_adaptive_depth(
                &mut state,
                &TaskProfile::default_profile(),
                Some(&failed_evaluation()),
                &[ClarityState::Blocked],
                None,
                Some(20),
            )
            .await;

        assert!(outcome.succeeded());
        assert_eq!(outcome.value.unwrap(), None);
    }

    #[tokio::test]
    async fn test_phase_d_update_adjusts_ttl() {
        let mut state = two_step_state();
        // Updated profile has depth 5 (delta +2 from default 3).
        let adapter = MockAdapter::always(
            serde_json::json!({
                "reasoning_depth": 5,
                "information_sufficiency": 0.3,
                "expected_tool_usage": "extensive",
                "output_breadth": "broad",
                "confidence_requirement": "high",
                "raw_inference": "harder than expected"
            })
            .to_string(),
        );
        let adaptive = AdaptiveDepth::new(Arc::new(adapter));

        let outcome = orchestrator()
            .phase_d_adaptive_depth(
                &mut state,
                &TaskProfile::default_profile(),
                Some(&failed_evaluation()),
                &[ClarityState::Blocked],
                Some(&adaptive),
                Some(20),
            )
            .await;

        assert!(outcome.succeeded());
        let updated = outcome.value.unwrap().unwrap();
        assert_eq!(updated.profile_version, 2);
        assert_eq!(updated.reasoning_depth, 5);
        // 10 * (1 + 2*0.20) = 14
        assert_eq!(state.ttl_remaining, 14);
    }

    #[tokio::test]
    async fn test_phase_d_no_update_when_conditions_missing() {
        let mut state = two_step_state();
        let adaptive = AdaptiveDepth::new(Arc::new(MockAdapter::always(profile_json())));

        // No blocked step.
        let outcome = orchestrator()
            .phase_d_adaptive_depth(
                &mut state,
                &TaskProfile::default_profile(),
                Some(&failed_evaluation()),
                &[ClarityState::Clear],
                Some(&adaptive),
                Some(20),
            )
            .await;

        assert!(outcome.succeeded());
        assert_eq!(outcome.value.unwrap(), None);
        assert_eq!(state.ttl_remaining, 10);
    }
}
