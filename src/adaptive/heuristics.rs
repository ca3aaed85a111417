//! Profile inference, TTL allocation, and pass-boundary profile updates.

use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::convergence::ConvergenceAssessment;
use crate::error::{Error, Result};
use crate::llm::{GenerateRequest, LlmAdapter};
use crate::supervisor::{extract_json_object, Supervisor};
use crate::validation::SemanticValidationReport;

use super::types::{AdaptiveDepthConfig, ClarityState, TaskProfile};

const INFER_SYSTEM_PROMPT: &str = "You are a task complexity analyzer. Analyze tasks and infer \
their complexity characteristics. Return only valid JSON with the required fields: \
reasoning_depth, information_sufficiency, expected_tool_usage, output_breadth, \
confidence_requirement, raw_inference.";

const UPDATE_SYSTEM_PROMPT: &str = "You are a task complexity analyzer. Based on execution \
feedback (convergence failure, validation issues, blocked steps), update the task profile to \
better reflect the actual task complexity. Return only valid JSON with the required fields: \
reasoning_depth, information_sufficiency, expected_tool_usage, output_breadth, \
confidence_requirement, raw_inference.";

/// Adaptive depth heuristics: task profile inference and TTL allocation.
pub struct AdaptiveDepth {
    adapter: Arc<dyn LlmAdapter>,
    supervisor: Supervisor,
    config: AdaptiveDepthConfig,
}

impl AdaptiveDepth {
    pub fn new(adapter: Arc<dyn LlmAdapter>) -> Self {
        let supervisor = Supervisor::new(adapter.clone());
        Self {
            adapter,
            supervisor,
            config: AdaptiveDepthConfig::default(),
        }
    }

    /// Override the formula configuration.
    pub fn with_config(mut self, config: AdaptiveDepthConfig) -> Self {
        self.config = config;
        self
    }

    /// The active configuration.
    pub fn config(&self) -> &AdaptiveDepthConfig {
        &self.config
    }

    /// Infer a task profile for a request.
    ///
    /// Never raises past the empty-input precondition: LLM failures, parse
    /// failures, and failed repairs all fall back to the default profile.
    pub async fn infer_task_profile(
        &self,
        task_description: &str,
        context: Option<&Value>,
    ) -> Result<TaskProfile> {
        if task_description.trim().is_empty() {
            return Err(Error::validation(
                "task_description must be a non-empty string",
            ));
        }

        let prompt = inference_prompt(task_description, context);
        let request = GenerateRequest::new(prompt, INFER_SYSTEM_PROMPT);

        let text = match self.adapter.generate(request).await {
            Ok(response) => response.text,
            Err(err) => {
                debug!(error = %err, "profile inference LLM call failed, using default");
                return Ok(TaskProfile::default_profile());
            }
        };

        Ok(self
            .profile_from_response(&text, None)
            .await
            .unwrap_or_else(TaskProfile::default_profile))
    }

    /// Parse a profile from response text, with one supervisor repair pass.
    /// `force_version` overrides whatever version the LLM produced.
    async fn profile_from_response(
        &self,
        text: &str,
        force_version: Option<u32>,
    ) -> Option<TaskProfile> {
        let direct = extract_json_object(text)
            .and_then(|value| build_profile(value, force_version).ok());
        if direct.is_some() {
            return direct;
        }

        let repaired = self
            .supervisor
            .repair_json(text, Some(&task_profile_schema()))
            .await
            .ok()?;
        build_profile(repaired, force_version).ok()
    }

    /// Allocate TTL from profile dimensions. Pure and deterministic.
    pub fn allocate_ttl(&self, profile: &TaskProfile, limit: Option<i64>) -> i64 {
        let config = &self.config;
        let base = f64::from(profile.reasoning_depth) * config.reasoning_depth_weight;
        let info = profile.information_sufficiency * config.information_sufficiency_weight;
        let tool = config.tool_usage_weights.weight(profile.expected_tool_usage);
        let breadth = config.output_breadth_weights.weight(profile.output_breadth);
        let confidence = config
            .confidence_requirement_weights
            .weight(profile.confidence_requirement);

        let allocated =
            (config.ttl_base_multiplier * base * info * tool * breadth * confidence).floor() as i64;
        let allocated = allocated.max(1);

        match limit.or(config.global_ttl_limit) {
            Some(cap) => allocated.min(cap),
            None => allocated,
        }
    }

    /// Update the profile at a pass boundary when a complexity mismatch is
    /// detected.
    ///
    /// Fires only when all three trigger conditions hold: convergence
    /// failed, validation issues present, and at least one step Blocked.
    /// Returns `None` on any failure (no update).
    pub async fn update_task_profile(
        &self,
        current_profile: &TaskProfile,
        convergence_assessment: &ConvergenceAssessment,
        validation_report: &SemanticValidationReport,
        clarity_states: &[ClarityState],
    ) -> Option<TaskProfile> {
        let convergence_failed = !convergence_assessment.converged;
        let validation_issues_present = validation_report.has_issues();
        let blocked_steps_present = clarity_states.contains(&ClarityState::Blocked);

        if !(convergence_failed && validation_issues_present && blocked_steps_present) {
            return None;
        }

        let prompt = update_prompt(
            current_profile,
            convergence_assessment,
            validation_report,
            clarity_states,
        );
        let request = GenerateRequest::new(prompt, UPDATE_SYSTEM_PROMPT);

        let text = match self.adapter.generate(request).await {
            Ok(response) => response.text,
            Err(err) => {
                debug!(error = %err, "profile update LLM call failed, keeping current profile");
                return None;
            }
        };

        self.profile_from_response(&text, Some(current_profile.profile_version + 1))
            .await
    }

    /// Adjust TTL bidirectionally after a profile update.
    ///
    /// Depth increases grant +20% per level, decreases take −15% per level;
    /// with no depth change the new allocation is adopted only when it
    /// differs from the current TTL by more than 30%. Result is clamped to
    /// `[1, global_ttl_limit]`.
    pub fn adjust_ttl_for_updated_profile(
        &self,
        old_profile: &TaskProfile,
        new_profile: &TaskProfile,
        current_ttl: i64,
        limit: Option<i64>,
    ) -> (i64, String) {
        let depth_delta =
            i64::from(new_profile.reasoning_depth) - i64::from(old_profile.reasoning_depth);

        let (adjusted, reason) = if depth_delta > 0 {
            let factor = 1.0 + depth_delta as f64 * 0.20;
            (
                (current_ttl as f64 * factor) as i64,
                format!(
                    "Complexity increased (reasoning_depth {} -> {}), TTL increased by {}%",
                    old_profile.reasoning_depth,
                    new_profile.reasoning_depth,
                    (depth_delta as f64 * 20.0) as i64
                ),
            )
        } else if depth_delta < 0 {
            let factor = 1.0 + depth_delta as f64 * 0.15;
            (
                (current_ttl as f64 * factor) as i64,
                format!(
                    "Complexity decreased (reasoning_depth {} -> {}), TTL decreased by {}%",
                    old_profile.reasoning_depth,
                    new_profile.reasoning_depth,
                    (-depth_delta as f64 * 15.0) as i64
                ),
            )
        } else {
            let new_allocation = self.allocate_ttl(new_profile, limit);
            if (new_allocation - current_ttl).abs() as f64 > current_ttl as f64 * 0.3 {
                (
                    new_allocation,
                    format!(
                        "Profile updated (no depth change), TTL adjusted to new allocation ({})",
                        new_allocation
                    ),
                )
            } else {
                (
                    current_ttl,
                    format!("Profile updated (no depth change), TTL unchanged ({})", current_ttl),
                )
            }
        };

        let mut adjusted = adjusted.max(1);
        if let Some(cap) = limit.or(self.config.global_ttl_limit) {
            adjusted = adjusted.min(cap);
        }
        (adjusted, reason)
    }
}

fn build_profile(mut value: Value, force_version: Option<u32>) -> Result<TaskProfile> {
    if let (Some(version), Some(object)) = (force_version, value.as_object_mut()) {
        object.insert("profile_version".to_string(), Value::from(version));
    }
    TaskProfile::from_value(value)
}

fn inference_prompt(task_description: &str, context: Option<&Value>) -> String {
    let mut prompt = format!(
        "Analyze this task and infer its complexity characteristics:\n\nTask: {}\n",
        task_description
    );
    if let Some(context) = context {
        prompt.push_str(&format!(
            "\nContext: {}\n",
            serde_json::to_string_pretty(context).unwrap_or_default()
        ));
    }
    prompt.push_str(
        "\nInfer the following dimensions:\n\
         1. reasoning_depth: Integer 1-5 (1=very shallow, 5=very deep)\n\
         2. information_sufficiency: Float 0.0-1.0 (0.0=insufficient, 1.0=sufficient)\n\
         3. expected_tool_usage: One of \"none\", \"minimal\", \"moderate\", \"extensive\"\n\
         4. output_breadth: One of \"narrow\", \"moderate\", \"broad\"\n\
         5. confidence_requirement: One of \"low\", \"medium\", \"high\"\n\
         6. raw_inference: Natural-language explanation of how each dimension was determined\n\
         \nReturn a JSON object with these fields.\n",
    );
    prompt
}

fn update_prompt(
    current_profile: &TaskProfile,
    convergence_assessment: &ConvergenceAssessment,
    validation_report: &SemanticValidationReport,
    clarity_states: &[ClarityState],
) -> String {
    format!(
        "Update the task profile based on execution feedback:\n\n\
         Current profile:\n{}\n\nConvergence assessment:\n{}\n\n\
         Semantic validation issues:\n{}\n\nClarity states: {}\n\n\
         Based on this feedback, determine if the task complexity was underestimated or \
         overestimated:\n\
         - Underestimated (task harder than expected): increase reasoning_depth, decrease \
         information_sufficiency, increase expected_tool_usage, output_breadth, and \
         confidence_requirement\n\
         - Overestimated (task easier than expected): adjust each dimension in the opposite \
         direction\n\nReturn an updated profile JSON with adjusted dimensions.",
        serde_json::to_string_pretty(current_profile).unwrap_or_default(),
        serde_json::to_string_pretty(convergence_assessment).unwrap_or_default(),
        serde_json::to_string_pretty(&validation_report.issues).unwrap_or_default(),
        serde_json::to_string(clarity_states).unwrap_or_default()
    )
}

fn task_profile_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "required": [
            "reasoning_depth",
            "information_sufficiency",
            "expected_tool_usage",
            "output_breadth",
            "confidence_requirement",
            "raw_inference"
        ],
        "properties": {
            "reasoning_depth": {"type": "integer", "minimum": 1, "maximum": 5},
            "information_sufficiency": {"type": "number", "minimum": 0.0, "maximum": 1.0},
            "expected_tool_usage": {
                "type": "string",
                "enum": ["none", "minimal", "moderate", "extensive"]
            },
            "output_breadth": {"type": "string", "enum": ["narrow", "moderate", "broad"]},
            "confidence_requirement": {"type": "string", "enum": ["low", "medium", "high"]},
            "raw_inference": {"type": "string", "minLength": 1}
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adaptive::types::{ConfidenceRequirement, OutputBreadth, ToolUsage};
    use crate::convergence::ConsistencyStatus;
    use crate::llm::mock::MockAdapter;
    use crate::validation::{
        ArtifactType, IssueSeverity, IssueType, ValidationIssue,
    };
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::collections::HashMap;

    fn adaptive_with(adapter: MockAdapter) -> AdaptiveDepth {
        AdaptiveDepth::new(Arc::new(adapter))
    }

    fn profile(depth: u8, sufficiency: f64) -> TaskProfile {
        TaskProfile::new(
            1,
            depth,
            sufficiency,
            ToolUsage::Moderate,
            OutputBreadth::Moderate,
            ConfidenceRequirement::Medium,
            "test",
        )
        .unwrap()
    }

    fn profile_json() -> String {
        serde_json::json!({
            "reasoning_depth": 4,
            "information_sufficiency": 0.8,
            "expected_tool_usage": "extensive",
            "output_breadth": "broad",
            "confidence_requirement": "high",
            "raw_inference": "multi-source analysis task"
        })
        .to_string()
    }

    fn failed_assessment() -> ConvergenceAssessment {
        ConvergenceAssessment {
            converged: false,
            reason_codes: vec!["completeness_below_threshold".into()],
            completeness_score: 0.4,
            coherence_score: 0.5,
            consistency_status: ConsistencyStatus::default(),
            detected_issues: vec![],
            metadata: HashMap::new(),
        }
    }

    fn report_with_issue() -> SemanticValidationReport {
        SemanticValidationReport::new(
            ArtifactType::ExecutionArtifact,
            vec![ValidationIssue::new(
                IssueType::Specificity,
                IssueSeverity::High,
                "vague step",
            )],
        )
    }

    #[tokio::test]
    async fn test_infer_rejects_empty_task() {
        let adaptive = adaptive_with(MockAdapter::new());
        assert!(adaptive.infer_task_profile("  ", None).await.is_err());
    }

    #[tokio::test]
    async fn test_infer_parses_profile() {
        let adapter = MockAdapter::always(profile_json());
        let adaptive = adaptive_with(adapter);

        let profile = adaptive
            .infer_task_profile("Summarize the quarterly reports", None)
            .await
            .unwrap();
        assert_eq!(profile.reasoning_depth, 4);
        assert_eq!(profile.expected_tool_usage, ToolUsage::Extensive);
        assert_eq!(profile.profile_version, 1);
    }

    #[tokio::test]
    async fn test_infer_falls_back_to_default_on_llm_failure() {
        let adapter = MockAdapter::new();
        adapter.push_failure("provider down");
        let adaptive = adaptive_with(adapter);

        let profile = adaptive.infer_task_profile("task", None).await.unwrap();
        assert_eq!(profile, TaskProfile::default_profile());
    }

    #[tokio::test]
    async fn test_infer_falls_back_to_default_on_garbage() {
        // Inference reply and both repair attempts yield nothing usable.
        let adapter = MockAdapter::always("no json here");
        let adaptive = adaptive_with(adapter);

        let profile = adaptive.infer_task_profile("task", None).await.unwrap();
        assert_eq!(profile, TaskProfile::default_profile());
    }

    #[tokio::test]
    async fn test_infer_uses_repair_for_schema_violations() {
        let adapter = MockAdapter::new();
        // First reply violates the schema (depth out of range), repair fixes it.
        adapter.push_text(r#"{"reasoning_depth": 9, "information_sufficiency": 0.5, "expected_tool_usage": "moderate", "output_breadth": "moderate", "confidence_requirement": "medium", "raw_inference": "r"}"#);
        adapter.push_text(profile_json());
        let adaptive = adaptive_with(adapter);

        let profile = adaptive.infer_task_profile("task", None).await.unwrap();
        assert_eq!(profile.reasoning_depth, 4);
    }

    #[test]
    fn test_allocate_ttl_seed_case() {
        let adaptive = adaptive_with(MockAdapter::new());
        // 2.0 * (3*1.5) * (0.5*1.0) * 1.0 * 1.0 * 1.0 = 4.5 -> 4
        assert_eq!(adaptive.allocate_ttl(&profile(3, 0.5), None), 4);
        assert_eq!(adaptive.allocate_ttl(&profile(3, 0.5), Some(3)), 3);
    }

    #[test]
    fn test_allocate_ttl_minimum_is_one() {
        let adaptive = adaptive_with(MockAdapter::new());
        let tiny = TaskProfile::new(
            1,
            1,
            0.1,
            ToolUsage::None,
            OutputBreadth::Narrow,
            ConfidenceRequirement::Low,
            "t",
        )
        .unwrap();
        assert_eq!(adaptive.allocate_ttl(&tiny, None), 1);
    }

    #[test]
    fn test_allocate_ttl_respects_config_limit() {
        let adapter = MockAdapter::new();
        let adaptive = AdaptiveDepth::new(Arc::new(adapter))
            .with_config(AdaptiveDepthConfig::with_global_ttl_limit(5));
        let big = TaskProfile::new(
            1,
            5,
            1.0,
            ToolUsage::Extensive,
            OutputBreadth::Broad,
            ConfidenceRequirement::High,
            "t",
        )
        .unwrap();
        assert_eq!(adaptive.allocate_ttl(&big, None), 5);
        // Explicit limit overrides config
        assert_eq!(adaptive.allocate_ttl(&big, Some(7)), 7);
    }

    proptest! {
        #[test]
        fn prop_allocate_ttl_deterministic_and_positive(
            depth in 1u8..=5,
            sufficiency in 0.0f64..=1.0,
            limit in proptest::option::of(1i64..=50),
        ) {
            let adaptive = adaptive_with(MockAdapter::new());
            let profile = profile(depth, sufficiency);
            let first = adaptive.allocate_ttl(&profile, limit);
            let second = adaptive.allocate_ttl(&profile, limit);
            prop_assert_eq!(first, second);
            prop_assert!(first >= 1);
            if let Some(cap) = limit {
                prop_assert!(first <= cap);
            }
        }
    }

    #[tokio::test]
    async fn test_update_fires_when_all_three_conditions_hold() {
        let adapter = MockAdapter::always(profile_json());
        let adaptive = adaptive_with(adapter);
        let current = TaskProfile::default_profile();

        let updated = adaptive
            .update_task_profile(
                &current,
                &failed_assessment(),
                &report_with_issue(),
                &[ClarityState::Clear, ClarityState::Blocked],
            )
            .await
            .unwrap();

        assert_eq!(updated.profile_version, current.profile_version + 1);
        assert_eq!(updated.reasoning_depth, 4);
    }

    #[tokio::test]
    async fn test_update_skipped_when_any_condition_missing() {
        let adaptive = adaptive_with(MockAdapter::always(profile_json()));
        let current = TaskProfile::default_profile();
        let converged = ConvergenceAssessment {
            converged: true,
            ..failed_assessment()
        };
        let empty_report = SemanticValidationReport::empty(ArtifactType::ExecutionArtifact);

        // Convergence succeeded
        assert!(adaptive
            .update_task_profile(
                &current,
                &converged,
                &report_with_issue(),
                &[ClarityState::Blocked]
            )
            .await
            .is_none());
        // No validation issues
        assert!(adaptive
            .update_task_profile(
                &current,
                &failed_assessment(),
                &empty_report,
                &[ClarityState::Blocked]
            )
            .await
            .is_none());
        // No blocked step
        assert!(adaptive
            .update_task_profile(
                &current,
                &failed_assessment(),
                &report_with_issue(),
                &[ClarityState::Clear]
            )
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_update_returns_none_on_llm_failure() {
        let adapter = MockAdapter::new();
        adapter.push_failure("provider down");
        let adaptive = adaptive_with(adapter);

        let result = adaptive
            .update_task_profile(
                &TaskProfile::default_profile(),
                &failed_assessment(),
                &report_with_issue(),
                &[ClarityState::Blocked],
            )
            .await;
        assert!(result.is_none());
    }

    #[test]
    fn test_adjust_ttl_increase() {
        let adaptive = adaptive_with(MockAdapter::new());
        let old = profile(3, 0.5);
        let new = profile(5, 0.5);
        let (ttl, reason) = adaptive.adjust_ttl_for_updated_profile(&old, &new, 10, None);
        assert_eq!(ttl, 14);
        assert!(reason.contains("increased"));
    }

    #[test]
    fn test_adjust_ttl_decrease() {
        let adaptive = adaptive_with(MockAdapter::new());
        let old = profile(4, 0.5);
        let new = profile(2, 0.5);
        let (ttl, reason) = adaptive.adjust_ttl_for_updated_profile(&old, &new, 10, None);
        assert_eq!(ttl, 7);
        assert!(reason.contains("decreased"));
    }

    #[test]
    fn test_adjust_ttl_clamped_to_limit() {
        let adaptive = adaptive_with(MockAdapter::new());
        let old = profile(3, 0.5);
        let new = profile(5, 0.5);
        let (ttl, _) = adaptive.adjust_ttl_for_updated_profile(&old, &new, 10, Some(12));
        assert_eq!(ttl, 12);
    }

    #[test]
    fn test_adjust_ttl_zero_delta_keeps_current_within_band() {
        let adaptive = adaptive_with(MockAdapter::new());
        let old = profile(3, 0.5);
        let new = profile(3, 0.5);
        // New allocation is 4; |4 - 5| = 1 <= 5*0.3, so current is kept.
        let (ttl, reason) = adaptive.adjust_ttl_for_updated_profile(&old, &new, 5, None);
        assert_eq!(ttl, 5);
        assert!(reason.contains("unchanged"));

        // |4 - 10| = 6 > 10*0.3, so the new allocation is adopted.
        let (ttl, reason) = adaptive.adjust_ttl_for_updated_profile(&old, &new, 10, None);
        assert_eq!(ttl, 4);
        assert!(reason.contains("new allocation"));
    }
}
