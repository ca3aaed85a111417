//! Semantic validation: structural checks plus LLM advisory checks.

mod semantic;
mod types;

pub use semantic::SemanticValidator;
pub use types::{
    ArtifactType, IssueSeverity, IssueType, SemanticValidationReport, ValidationIssue,
};
