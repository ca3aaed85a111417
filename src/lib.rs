//! # aeon-core
//!
//! An adaptive multi-pass reasoning orchestration library: a four-phase
//! state machine that drives an external language model through a bounded,
//! self-refining loop to satisfy a natural-language request.
//!
//! ## Core Components
//!
//! - **Plan**: typed plan/step model with refinement actions
//! - **Adaptive**: task-profile inference and deterministic TTL allocation
//! - **Convergence**: LLM-assisted scoring under threshold gates
//! - **Validation**: structural plus LLM advisory checks on artifacts
//! - **Supervisor**: bounded LLM-backed repair of malformed output
//! - **Orchestration**: phase contracts, step execution, the pass loop
//!
//! ## Example
//!
//! ```rust,ignore
//! use aeon_core::{AdapterConfig, AnthropicAdapter, Orchestrator};
//! use std::sync::Arc;
//!
//! let adapter = Arc::new(AnthropicAdapter::new(AdapterConfig::new(api_key)));
//! let orchestrator = Orchestrator::builder(adapter).global_ttl(10).build();
//!
//! let outcome = orchestrator.execute("calculate the sum of 5 and 10").await?;
//! println!("{}", outcome.status);
//! ```

pub mod adaptive;
pub mod convergence;
pub mod error;
pub mod llm;
pub mod memory;
pub mod orchestration;
pub mod plan;
pub mod planner;
pub mod supervisor;
pub mod telemetry;
pub mod tools;
pub mod validation;

// Re-exports for convenience
pub use adaptive::{
    AdaptiveDepth, AdaptiveDepthConfig, ClarityState, ConfidenceRequirement, OutputBreadth,
    TaskProfile, ToolUsage,
};
pub use convergence::{
    ConsistencyStatus, ConvergenceAssessment, ConvergenceCriteria, ConvergenceEngine,
};
pub use error::{Error, Result};
pub use llm::{
    call_llm_with_provider_error_handling, AdapterConfig, AnthropicAdapter, GenerateRequest,
    GenerateResponse, LlmAdapter,
};
pub use memory::{InMemoryStore, Memory, SqliteMemoryStore};
pub use orchestration::{
    EvaluationOutcome, ExecutionPass, OrchestrationOutcome, OrchestrationState, Orchestrator,
    OrchestratorBuilder, PhaseOrchestrator, PhaseOutcome, PlanRefinement, StepExecutionRecord,
    StepExecutor, StepPreparation, TerminalStatus, Transition, TransitionContract,
};
pub use plan::{ActionType, Plan, PlanStep, RefinementAction, StepKind, StepPatch, StepStatus};
pub use planner::RecursivePlanner;
pub use supervisor::Supervisor;
pub use telemetry::{CycleRecord, ErrorRecord, JsonlLogger};
pub use tools::{InMemoryToolRegistry, ToolRegistry, ToolSpec};
pub use validation::{
    ArtifactType, IssueSeverity, IssueType, SemanticValidationReport, SemanticValidator,
    ValidationIssue,
};
