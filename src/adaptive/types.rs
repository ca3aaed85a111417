//! Task profile and adaptive depth configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Expected tool usage level for a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolUsage {
    None,
    Minimal,
    #[default]
    Moderate,
    Extensive,
}

/// Expected breadth of the produced output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputBreadth {
    Narrow,
    #[default]
    Moderate,
    Broad,
}

/// Required confidence level for the answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceRequirement {
    Low,
    #[default]
    Medium,
    High,
}

/// Per-step execution outcome tag.
///
/// A Blocked state is evidence of under-estimated complexity and is one of
/// the three trigger conditions for a profile update at the pass boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClarityState {
    Clear,
    PartiallyClear,
    Blocked,
}

/// Inferred complexity characteristics of a request, used for TTL allocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskProfile {
    /// Monotonic version counter, incremented on each adaptive update.
    #[serde(default = "default_profile_version")]
    pub profile_version: u32,
    /// Ordinal scale 1-5 (1=very shallow, 5=very deep).
    pub reasoning_depth: u8,
    /// 0.0=insufficient information, 1.0=sufficient.
    pub information_sufficiency: f64,
    pub expected_tool_usage: ToolUsage,
    pub output_breadth: OutputBreadth,
    pub confidence_requirement: ConfidenceRequirement,
    /// Natural-language rationale for how each dimension was determined.
    pub raw_inference: String,
}

fn default_profile_version() -> u32 {
    1
}

impl TaskProfile {
    /// Create a validated profile.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        profile_version: u32,
        reasoning_depth: u8,
        information_sufficiency: f64,
        expected_tool_usage: ToolUsage,
        output_breadth: OutputBreadth,
        confidence_requirement: ConfidenceRequirement,
        raw_inference: impl Into<String>,
    ) -> Result<Self> {
        let profile = Self {
            profile_version,
            reasoning_depth,
            information_sufficiency,
            expected_tool_usage,
            output_breadth,
            confidence_requirement,
            raw_inference: raw_inference.into(),
        };
        profile.validate()?;
        Ok(profile)
    }

    /// Default profile used when inference fails: moderate complexity.
    pub fn default_profile() -> Self {
        Self {
            profile_version: 1,
            reasoning_depth: 3,
            information_sufficiency: 0.5,
            expected_tool_usage: ToolUsage::Moderate,
            output_breadth: OutputBreadth::Moderate,
            confidence_requirement: ConfidenceRequirement::Medium,
            raw_inference: "Default profile: moderate complexity assumed".to_string(),
        }
    }

    /// Validate numeric ranges and the non-empty rationale.
    pub fn validate(&self) -> Result<()> {
        if self.profile_version < 1 {
            return Err(Error::validation("profile_version must be >= 1"));
        }
        if !(1..=5).contains(&self.reasoning_depth) {
            return Err(Error::validation("reasoning_depth must be in range [1, 5]"));
        }
        if !(0.0..=1.0).contains(&self.information_sufficiency) {
            return Err(Error::validation(
                "information_sufficiency must be in range [0.0, 1.0]",
            ));
        }
        if self.raw_inference.trim().is_empty() {
            return Err(Error::validation("raw_inference cannot be empty"));
        }
        Ok(())
    }

    /// Deserialize and validate a profile from a JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let profile: TaskProfile = serde_json::from_value(value)
            .map_err(|e| Error::validation(format!("task profile deserialization failed: {}", e)))?;
        profile.validate()?;
        Ok(profile)
    }
}

/// Per-level weights for [`ToolUsage`] in the TTL formula.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToolUsageWeights {
    pub none: f64,
    pub minimal: f64,
    pub moderate: f64,
    pub extensive: f64,
}

impl Default for ToolUsageWeights {
    fn default() -> Self {
        Self {
            none: 0.5,
            minimal: 0.75,
            moderate: 1.0,
            extensive: 1.5,
        }
    }
}

impl ToolUsageWeights {
    pub fn weight(&self, usage: ToolUsage) -> f64 {
        match usage {
            ToolUsage::None => self.none,
            ToolUsage::Minimal => self.minimal,
            ToolUsage::Moderate => self.moderate,
            ToolUsage::Extensive => self.extensive,
        }
    }
}

/// Per-level weights for [`OutputBreadth`] in the TTL formula.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutputBreadthWeights {
    pub narrow: f64,
    pub moderate: f64,
    pub broad: f64,
}

impl Default for OutputBreadthWeights {
    fn default() -> Self {
        Self {
            narrow: 0.75,
            moderate: 1.0,
            broad: 1.5,
        }
    }
}

impl OutputBreadthWeights {
    pub fn weight(&self, breadth: OutputBreadth) -> f64 {
        match breadth {
            OutputBreadth::Narrow => self.narrow,
            OutputBreadth::Moderate => self.moderate,
            OutputBreadth::Broad => self.broad,
        }
    }
}

/// Per-level weights for [`ConfidenceRequirement`] in the TTL formula.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceWeights {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            low: 0.75,
            medium: 1.0,
            high: 1.5,
        }
    }
}

impl ConfidenceWeights {
    pub fn weight(&self, confidence: ConfidenceRequirement) -> f64 {
        match confidence {
            ConfidenceRequirement::Low => self.low,
            ConfidenceRequirement::Medium => self.medium,
            ConfidenceRequirement::High => self.high,
        }
    }
}

/// Parameters of the deterministic TTL allocation formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveDepthConfig {
    /// Global TTL limit to cap allocation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_ttl_limit: Option<i64>,
    /// Fallback TTL when profile inference fails entirely.
    pub default_ttl: i64,
    pub ttl_base_multiplier: f64,
    pub reasoning_depth_weight: f64,
    pub information_sufficiency_weight: f64,
    #[serde(default)]
    pub tool_usage_weights: ToolUsageWeights,
    #[serde(default)]
    pub output_breadth_weights: OutputBreadthWeights,
    #[serde(default)]
    pub confidence_requirement_weights: ConfidenceWeights,
}

impl Default for AdaptiveDepthConfig {
    fn default() -> Self {
        Self {
            global_ttl_limit: None,
            default_ttl: 10,
            ttl_base_multiplier: 2.0,
            reasoning_depth_weight: 1.5,
            information_sufficiency_weight: 1.0,
            tool_usage_weights: ToolUsageWeights::default(),
            output_breadth_weights: OutputBreadthWeights::default(),
            confidence_requirement_weights: ConfidenceWeights::default(),
        }
    }
}

impl AdaptiveDepthConfig {
    /// Config with a global TTL cap, other parameters at defaults.
    pub fn with_global_ttl_limit(limit: i64) -> Self {
        Self {
            global_ttl_limit: Some(limit),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_profile() {
        let profile = TaskProfile::default_profile();
        assert_eq!(profile.profile_version, 1);
        assert_eq!(profile.reasoning_depth, 3);
        assert_eq!(profile.information_sufficiency, 0.5);
        assert_eq!(profile.expected_tool_usage, ToolUsage::Moderate);
        assert_eq!(profile.output_breadth, OutputBreadth::Moderate);
        assert_eq!(profile.confidence_requirement, ConfidenceRequirement::Medium);
        assert!(profile.validate().is_ok());
    }

    #[test]
    fn test_profile_rejects_out_of_range_values() {
        assert!(TaskProfile::new(
            1,
            0,
            0.5,
            ToolUsage::Moderate,
            OutputBreadth::Moderate,
            ConfidenceRequirement::Medium,
            "r",
        )
        .is_err());
        assert!(TaskProfile::new(
            1,
            6,
            0.5,
            ToolUsage::Moderate,
            OutputBreadth::Moderate,
            ConfidenceRequirement::Medium,
            "r",
        )
        .is_err());
        assert!(TaskProfile::new(
            1,
            3,
            1.2,
            ToolUsage::Moderate,
            OutputBreadth::Moderate,
            ConfidenceRequirement::Medium,
            "r",
        )
        .is_err());
        assert!(TaskProfile::new(
            1,
            3,
            0.5,
            ToolUsage::Moderate,
            OutputBreadth::Moderate,
            ConfidenceRequirement::Medium,
            "  ",
        )
        .is_err());
        assert!(TaskProfile::new(
            0,
            3,
            0.5,
            ToolUsage::Moderate,
            OutputBreadth::Moderate,
            ConfidenceRequirement::Medium,
            "r",
        )
        .is_err());
    }

    #[test]
    fn test_profile_from_value_applies_version_default() {
        let value = serde_json::json!({
            "reasoning_depth": 4,
            "information_sufficiency": 0.8,
            "expected_tool_usage": "extensive",
            "output_breadth": "broad",
            "confidence_requirement": "high",
            "raw_inference": "deep multi-source task"
        });
        let profile = TaskProfile::from_value(value).unwrap();
        assert_eq!(profile.profile_version, 1);
        assert_eq!(profile.expected_tool_usage, ToolUsage::Extensive);
    }

    #[test]
    fn test_config_default_weights() {
        let config = AdaptiveDepthConfig::default();
        assert_eq!(config.ttl_base_multiplier, 2.0);
        assert_eq!(config.reasoning_depth_weight, 1.5);
        assert_eq!(config.information_sufficiency_weight, 1.0);
        assert_eq!(config.default_ttl, 10);
        assert_eq!(config.tool_usage_weights.weight(ToolUsage::None), 0.5);
        assert_eq!(config.tool_usage_weights.weight(ToolUsage::Extensive), 1.5);
        assert_eq!(
            config.output_breadth_weights.weight(OutputBreadth::Narrow),
            0.75
        );
        assert_eq!(
            config
                .confidence_requirement_weights
                .weight(ConfidenceRequirement::High),
            1.5
        );
    }

    #[test]
    fn test_clarity_state_serialization() {
        let value = serde_json::to_value(ClarityState::PartiallyClear).unwrap();
        assert_eq!(value, "PARTIALLY_CLEAR");
        let blocked: ClarityState = serde_json::from_value(serde_json::json!("BLOCKED")).unwrap();
        assert_eq!(blocked, ClarityState::Blocked);
    }
}
