//! Step preparation: dependency checking, context hydration, indexing.

use tracing::debug;

use crate::memory::{step_result_key, Memory};
use crate::plan::{Plan, StepStatus};

/// Prepares steps for execution: selects dependency-satisfied pending
/// steps, hydrates their incoming context from memory, and populates
/// positional metadata.
#[derive(Debug, Default)]
pub struct StepPreparation;

impl StepPreparation {
    pub fn new() -> Self {
        Self
    }

    /// Indices of steps ready to execute: Pending, with every dependency
    /// Complete. Each ready step has its incoming context hydrated before
    /// being included.
    pub fn get_ready_steps(&self, plan: &mut Plan, memory: Option<&dyn Memory>) -> Vec<usize> {
        let mut ready = Vec::new();
        for idx in 0..plan.steps.len() {
            if plan.steps[idx].status != StepStatus::Pending {
                continue;
            }
            let satisfied = plan.steps[idx].dependencies.iter().all(|dep_id| {
                plan.step(dep_id)
                    .map(|dep| dep.status == StepStatus::Complete)
                    .unwrap_or(false)
            });
            if satisfied {
                self.populate_incoming_context(idx, plan, memory);
                ready.push(idx);
            }
        }
        ready
    }

    /// Hydrate `incoming_context` from dependency outputs.
    ///
    /// For each dependency, the stored `step_<dep_id>_result` is read from
    /// memory; the dependency's `handoff_to_next` takes precedence over the
    /// stored value. Memory read failures contribute no context.
    pub fn populate_incoming_context(
        &self,
        step_idx: usize,
        plan: &mut Plan,
        memory: Option<&dyn Memory>,
    ) {
        let Some(memory) = memory else {
            return;
        };
        let dependencies = plan.steps[step_idx].dependencies.clone();
        if dependencies.is_empty() {
            return;
        }

        let mut context_parts = Vec::new();
        for dep_id in &dependencies {
            let stored = match memory.read(&step_result_key(dep_id)) {
                Ok(value) => value,
                Err(err) => {
                    debug!(dep_id = %dep_id, error = %err, "memory read failed, skipping context");
                    None
                }
            };
            if let Some(stored) = stored {
                let handoff = plan
                    .step(dep_id)
                    .and_then(|dep| dep.handoff_to_next.clone());
                let text = handoff.unwrap_or(stored);
                context_parts.push(format!("From step {}: {}", dep_id, text));
            }
        }

        if !context_parts.is_empty() {
            plan.steps[step_idx].incoming_context = Some(context_parts.join("\n"));
        }
    }

    /// Populate 1-based `step_index` and shared `total_steps` on every step.
    pub fn populate_step_indices(&self, plan: &mut Plan) {
        let total_steps = plan.steps.len();
        for (idx, step) in plan.steps.iter_mut().enumerate() {
            step.step_index = Some(idx + 1);
            step.total_steps = Some(total_steps);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::memory::InMemoryStore;
    use crate::plan::PlanStep;
    use pretty_assertions::assert_eq;

    fn prep() -> StepPreparation {
        StepPreparation::new()
    }

    fn dependent_plan() -> Plan {
        Plan::new(
            "Test goal",
            vec![
                PlanStep::new("step1", "First").unwrap(),
                PlanStep::new("step2", "Second")
                    .unwrap()
                    .with_dependencies(vec!["step1".into()]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_ready_steps_respect_dependencies() {
        let mut plan = dependent_plan();
        let ready = prep().get_ready_steps(&mut plan, None);
        assert_eq!(ready, vec![0]);

        plan.steps[0].status = StepStatus::Complete;
        let ready = prep().get_ready_steps(&mut plan, None);
        assert_eq!(ready, vec![1]);
    }

    #[test]
    fn test_failed_dependency_blocks_dependent() {
        let mut plan = dependent_plan();
        plan.steps[0].status = StepStatus::Failed;
        let ready = prep().get_ready_steps(&mut plan, None);
        assert!(ready.is_empty());
    }

    #[test]
    fn test_non_pending_steps_not_selected() {
        let mut plan = dependent_plan();
        plan.steps[0].status = StepStatus::Running;
        let ready = prep().get_ready_steps(&mut plan, None);
        assert!(ready.is_empty());
    }

    #[test]
    fn test_context_hydrated_from_memory() {
        let memory = InMemoryStore::new();
        memory.write("step_step1_result", "42").unwrap();

        let mut plan = dependent_plan();
        plan.steps[0].status = StepStatus::Complete;
        let ready = prep().get_ready_steps(&mut plan, Some(&memory as &dyn Memory));

        assert_eq!(ready, vec![1]);
        assert_eq!(
            plan.steps[1].incoming_context.as_deref(),
            Some("From step step1: 42")
        );
    }

    #[test]
    fn test_handoff_preferred_over_memory_value() {
        let memory = InMemoryStore::new();
        memory.write("step_step1_result", "raw output").unwrap();

        let mut plan = dependent_plan();
        plan.steps[0].status = StepStatus::Complete;
        plan.steps[0].handoff_to_next = Some("summary for next step".into());
        prep().get_ready_steps(&mut plan, Some(&memory as &dyn Memory));

        assert_eq!(
            plan.steps[1].incoming_context.as_deref(),
            Some("From step step1: summary for next step")
        );
    }

    #[test]
    fn test_memory_failure_contributes_no_context() {
        struct FailingMemory;
        impl Memory for FailingMemory {
            fn read(&self, _key: &str) -> crate::error::Result<Option<String>> {
                Err(Error::Memory("read failed".into()))
            }
            fn write(&self, _key: &str, _value: &str) -> crate::error::Result<()> {
                Ok(())
            }
        }

        let mut plan = dependent_plan();
        plan.steps[0].status = StepStatus::Complete;
        let ready = prep().get_ready_steps(&mut plan, Some(&FailingMemory as &dyn Memory));

        assert_eq!(ready, vec![1]);
        assert_eq!(plan.steps[1].incoming_context, None);
    }

    #[test]
    fn test_populate_step_indices() {
        let mut plan = dependent_plan();
        prep().populate_step_indices(&mut plan);

        assert_eq!(plan.steps[0].step_index, Some(1));
        assert_eq!(plan.steps[1].step_index, Some(2));
        assert_eq!(plan.steps[0].total_steps, Some(2));
        assert_eq!(plan.steps[1].total_steps, Some(2));
    }
}
