//! Convergence detection: LLM-assisted scoring under threshold gates.

mod engine;
mod types;

pub use engine::ConvergenceEngine;
pub use types::{ConsistencyStatus, ConvergenceAssessment, ConvergenceCriteria};
