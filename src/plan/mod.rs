//! Plan model: steps, refinement actions, and boundary validation.

mod types;

pub use types::{ActionType, Plan, PlanStep, RefinementAction, StepKind, StepPatch, StepStatus};
