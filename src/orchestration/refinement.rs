//! Applying refinement actions to a plan.

use crate::plan::{ActionType, Plan, PlanStep, RefinementAction};

/// Result of applying a refinement batch: success flag, the resulting plan
/// (original on failure), and the error message when failed.
pub type RefinementResult = (bool, Plan, Option<String>);

/// Applies refinement actions to plans.
#[derive(Debug, Default)]
pub struct PlanRefinement;

impl PlanRefinement {
    pub fn new() -> Self {
        Self
    }

    /// Apply actions in order to produce an updated plan.
    ///
    /// Actions targeting unknown step ids are skipped. A step-construction
    /// failure aborts the whole batch and returns the original plan. An
    /// empty action list is the identity.
    pub fn apply_actions(&self, plan: &Plan, actions: &[RefinementAction]) -> RefinementResult {
        let mut updated = plan.clone();

        for action in actions {
            match action.action_type {
                ActionType::Add => {
                    if let Some(patch) = &action.new_step {
                        match PlanStep::from_patch(patch) {
                            Ok(step) => updated.steps.push(step),
                            Err(err) => return (false, plan.clone(), Some(err.to_string())),
                        }
                    }
                }
                ActionType::Modify => {
                    if let (Some(target), Some(patch)) = (&action.target_step_id, &action.new_step)
                    {
                        if let Some(step) = updated.step_mut(target) {
                            if let Err(err) = step.apply_patch(patch) {
                                return (false, plan.clone(), Some(err.to_string()));
                            }
                        }
                    }
                }
                ActionType::Remove => {
                    if let Some(target) = &action.target_step_id {
                        updated.steps.retain(|s| &s.step_id != target);
                    }
                }
                ActionType::Replace => {
                    if let (Some(target), Some(patch)) = (&action.target_step_id, &action.new_step)
                    {
                        if let Some(position) =
                            updated.steps.iter().position(|s| &s.step_id == target)
                        {
                            match PlanStep::from_patch(patch) {
                                Ok(step) => updated.steps[position] = step,
                                Err(err) => return (false, plan.clone(), Some(err.to_string())),
                            }
                        }
                    }
                }
            }
        }

        if let Err(err) = updated.validate() {
            return (false, plan.clone(), Some(err.to_string()));
        }
        (true, updated, None)
    }
}
