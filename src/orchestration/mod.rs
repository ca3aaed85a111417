//! Phase orchestration: contracts, phases A-D, step execution, and the
//! outer pass loop.

mod contracts;
mod driver;
mod executor;
mod phases;
mod refinement;
mod state;
mod step_prep;
mod types;

pub use contracts::{
    enforce_transition, execute_with_retry, validate_transition_inputs,
    validate_transition_outputs, FailureCondition, Transition, TransitionContract,
    TransitionInputs, TransitionOutputs, CONTRACT_A_TO_B, CONTRACT_B_TO_C, CONTRACT_C_TO_D,
    CONTRACT_D_TO_A_B, MAX_TRANSITION_RETRIES,
};
pub use driver::{Orchestrator, OrchestratorBuilder, OrchestrationOutcome, TerminalStatus};
pub use executor::{StepExecutor, StepTelemetry};
pub use phases::PhaseOrchestrator;
pub use refinement::{PlanRefinement, RefinementResult};
pub use state::{ExecutionPass, OrchestrationState};
pub use step_prep::StepPreparation;
pub use types::{EvaluationOutcome, PhaseOutcome, StepExecutionRecord};
