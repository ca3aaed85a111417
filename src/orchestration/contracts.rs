//! Phase transition contracts.
//!
//! Exactly four transitions are legal: A→B, B→C, C→D, and D→A/B. Each has
//! a static contract enumerating input requirements, output requirements,
//! and classified failure conditions. Enforcement is a three-step check:
//! validate inputs, execute, validate outputs. A retryable failure gets
//! exactly one extra attempt.

use std::future::Future;

use crate::adaptive::TaskProfile;
use crate::error::{Error, Result};
use crate::plan::Plan;

use super::types::{EvaluationOutcome, StepExecutionRecord};

/// Maximum retries for a retryable transition failure.
pub const MAX_TRANSITION_RETRIES: usize = 1;

/// A classified way a transition can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureCondition {
    pub condition: &'static str,
    pub retryable: bool,
    pub error_code: &'static str,
}

/// Contract for one legal phase transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionContract {
    pub transition_name: &'static str,
    pub input_requirements: &'static [&'static str],
    pub output_requirements: &'static [&'static str],
    pub failure_conditions: &'static [FailureCondition],
}

impl TransitionContract {
    /// Look up a failure condition by its condition string.
    pub fn failure(&self, condition: &str) -> Option<&'static FailureCondition> {
        self.failure_conditions
            .iter()
            .find(|fc| fc.condition == condition)
    }

    fn violation(&self, condition: &'static str, detail: &str) -> Error {
        match self.failure(condition) {
            Some(fc) => Error::phase_transition(
                self.transition_name,
                format!("{}: {}", fc.condition, detail),
                fc.retryable,
                fc.error_code,
            ),
            None => Error::phase_transition(
                self.transition_name,
                format!("{}: {}", condition, detail),
                false,
                "AEON.PHASE_TRANSITION.UNSPECIFIED.000",
            ),
        }
    }
}

/// Contract for A→B: profile and TTL feed initial planning.
pub static CONTRACT_A_TO_B: TransitionContract = TransitionContract {
    transition_name: "A→B",
    input_requirements: &["task_profile", "initial_plan", "ttl"],
    output_requirements: &["refined_plan"],
    failure_conditions: &[
        FailureCondition {
            condition: "incomplete profile",
            retryable: false,
            error_code: "AEON.PHASE_TRANSITION.A_B.001",
        },
        FailureCondition {
            condition: "malformed plan JSON",
            retryable: true,
            error_code: "AEON.PHASE_TRANSITION.A_B.002",
        },
        FailureCondition {
            condition: "invalid ttl",
            retryable: false,
            error_code: "AEON.PHASE_TRANSITION.A_B.003",
        },
    ],
};

/// Contract for B→C: a refined plan with at least one step enters
/// execution.
pub static CONTRACT_B_TO_C: TransitionContract = TransitionContract {
    transition_name: "B→C",
    input_requirements: &["refined_plan"],
    output_requirements: &["execution_results"],
    failure_conditions: &[
        FailureCondition {
            condition: "missing steps",
            retryable: false,
            error_code: "AEON.PHASE_TRANSITION.B_C.001",
        },
        FailureCondition {
            condition: "invalid plan structure",
            retryable: false,
            error_code: "AEON.PHASE_TRANSITION.B_C.002",
        },
    ],
};

/// Contract for C→D: execution and evaluation results feed the adaptive
/// update.
pub static CONTRACT_C_TO_D: TransitionContract = TransitionContract {
    transition_name: "C→D",
    input_requirements: &["execution_results", "evaluation_results"],
    output_requirements: &[],
    failure_conditions: &[FailureCondition {
        condition: "missing execution results",
        retryable: false,
        error_code: "AEON.PHASE_TRANSITION.C_D.001",
    }],
};

/// Contract for D→A/B: the updated profile re-enters the loop.
pub static CONTRACT_D_TO_A_B: TransitionContract = TransitionContract {
    transition_name: "D→A/B",
    input_requirements: &["task_profile", "ttl_remaining"],
    output_requirements: &[],
    failure_conditions: &[
        FailureCondition {
            condition: "invalid ttl",
            retryable: false,
            error_code: "AEON.PHASE_TRANSITION.D_A_B.001",
        },
        FailureCondition {
            condition: "incomplete profile",
            retryable: false,
            error_code: "AEON.PHASE_TRANSITION.D_A_B.002",
        },
    ],
};

/// The four legal phase transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    AToB,
    BToC,
    CToD,
    DToAOrB,
}

impl Transition {
    pub const ALL: [Transition; 4] = [
        Transition::AToB,
        Transition::BToC,
        Transition::CToD,
        Transition::DToAOrB,
    ];

    /// Canonical transition name.
    pub fn name(&self) -> &'static str {
        self.contract().transition_name
    }

    /// Parse a transition name, rejecting anything but the four legal
    /// transitions before any side effect.
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "A→B" | "A->B" => Ok(Self::AToB),
            "B→C" | "B->C" => Ok(Self::BToC),
            "C→D" | "C->D" => Ok(Self::CToD),
            "D→A/B" | "D->A/B" => Ok(Self::DToAOrB),
            other => Err(Error::validation(format!(
                "Invalid transition name: {}",
                other
            ))),
        }
    }

    /// The static contract for this transition.
    pub fn contract(&self) -> &'static TransitionContract {
        match self {
            Self::AToB => &CONTRACT_A_TO_B,
            Self::BToC => &CONTRACT_B_TO_C,
            Self::CToD => &CONTRACT_C_TO_D,
            Self::DToAOrB => &CONTRACT_D_TO_A_B,
        }
    }
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Typed inputs for contract validation, one variant per transition.
#[derive(Debug)]
pub enum TransitionInputs<'a> {
    AToB {
        task_profile: &'a TaskProfile,
        initial_plan: &'a Plan,
        ttl: i64,
    },
    BToC {
        refined_plan: &'a Plan,
    },
    CToD {
        execution_results: &'a [StepExecutionRecord],
        evaluation_results: &'a EvaluationOutcome,
    },
    DToAOrB {
        task_profile: &'a TaskProfile,
        ttl_remaining: i64,
    },
}

impl TransitionInputs<'_> {
    fn transition(&self) -> Transition {
        match self {
            Self::AToB { .. } => Transition::AToB,
            Self::BToC { .. } => Transition::BToC,
            Self::CToD { .. } => Transition::CToD,
            Self::DToAOrB { .. } => Transition::DToAOrB,
        }
    }
}

/// Typed outputs for contract validation, one variant per transition.
#[derive(Debug)]
pub enum TransitionOutputs<'a> {
    AToB { refined_plan: &'a Plan },
    BToC { execution_results: &'a [StepExecutionRecord] },
    CToD,
    DToAOrB,
}

impl TransitionOutputs<'_> {
    fn transition(&self) -> Transition {
        match self {
            Self::AToB { .. } => Transition::AToB,
            Self::BToC { .. } => Transition::BToC,
            Self::CToD => Transition::CToD,
            Self::DToAOrB => Transition::DToAOrB,
        }
    }
}

/// Validate transition inputs against the contract.
pub fn validate_transition_inputs(
    transition: Transition,
    inputs: &TransitionInputs<'_>,
) -> Result<()> {
    if inputs.transition() != transition {
        return Err(Error::validation(format!(
            "inputs for {} supplied to {}",
            inputs.transition(),
            transition
        )));
    }
    let contract = transition.contract();

    match inputs {
        TransitionInputs::AToB {
            task_profile,
            initial_plan,
            ttl,
        } => {
            if let Err(err) = task_profile.validate() {
                return Err(contract.violation("incomplete profile", &err.to_string()));
            }
            if *ttl <= 0 {
                return Err(contract.violation("invalid ttl", &format!("ttl must be > 0, got {}", ttl)));
            }
            if let Err(err) = initial_plan.validate() {
                return Err(contract.violation("malformed plan JSON", &err.to_string()));
            }
        }
        TransitionInputs::BToC { refined_plan } => {
            if refined_plan.steps.is_empty() {
                return Err(contract.violation("missing steps", "refined plan has no steps"));
            }
            if let Err(err) = refined_plan.validate() {
                return Err(contract.violation("invalid plan structure", &err.to_string()));
            }
        }
        TransitionInputs::CToD {
            execution_results, ..
        } => {
            if execution_results.is_empty() {
                return Err(contract.violation(
                    "missing execution results",
                    "no steps were executed this pass",
                ));
            }
        }
        TransitionInputs::DToAOrB {
            task_profile,
            ttl_remaining,
        } => {
            if let Err(err) = task_profile.validate() {
                return Err(contract.violation("incomplete profile", &err.to_string()));
            }
            if *ttl_remaining < 0 {
                return Err(contract.violation(
                    "invalid ttl",
                    &format!("ttl_remaining must be >= 0, got {}", ttl_remaining),
                ));
            }
        }
    }
    Ok(())
}

/// Validate transition outputs against the contract.
pub fn validate_transition_outputs(
    transition: Transition,
    outputs: &TransitionOutputs<'_>,
) -> Result<()> {
    if outputs.transition() != transition {
        return Err(Error::validation(format!(
            "outputs for {} supplied to {}",
            outputs.transition(),
            transition
        )));
    }
    let contract = transition.contract();

    match outputs {
        TransitionOutputs::AToB { refined_plan } => {
            if let Err(err) = refined_plan.validate() {
                return Err(contract.violation("malformed plan JSON", &err.to_string()));
            }
        }
        TransitionOutputs::BToC { .. } => {}
        TransitionOutputs::CToD | TransitionOutputs::DToAOrB => {}
    }
    Ok(())
}

/// Enforce a contract around already-produced outputs: validate inputs,
/// then validate outputs.
pub fn enforce_transition(
    transition: Transition,
    inputs: &TransitionInputs<'_>,
    outputs: &TransitionOutputs<'_>,
) -> Result<()> {
    validate_transition_inputs(transition, inputs)?;
    validate_transition_outputs(transition, outputs)
}

/// Run an operation under a transition contract, retrying a retryable
/// failure up to `max_retries` extra attempts.
pub async fn execute_with_retry<T, F, Fut>(
    operation: F,
    transition: Transition,
    max_retries: usize,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempts = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempts < max_retries => {
                attempts += 1;
                tracing::debug!(
                    transition = transition.name(),
                    attempt = attempts,
                    error = %err,
                    "retrying transition after retryable failure"
                );
            }
            Err(err) => return Err(err),
        }
    }
}
