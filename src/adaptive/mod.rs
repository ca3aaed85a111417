//! Adaptive depth: task profile inference and deterministic TTL allocation.

mod heuristics;
mod types;

pub use heuristics::AdaptiveDepth;
pub use types::{
    AdaptiveDepthConfig, ClarityState, ConfidenceRequirement, ConfidenceWeights, OutputBreadth,
    OutputBreadthWeights, TaskProfile, ToolUsage, ToolUsageWeights,
};
