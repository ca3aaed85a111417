//! Semantic validation data model.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Kind of semantic quality problem detected in an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    Specificity,
    Relevance,
    Consistency,
    Hallucination,
    DoSayMismatch,
}

/// Severity of a validation issue, ordered from Low to Critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        };
        write!(f, "{}", s)
    }
}

/// Kind of artifact a validation report covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    Plan,
    Step,
    ExecutionArtifact,
    CrossPhase,
}

/// A single semantic or structural problem found in an artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub issue_id: String,
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    pub severity: IssueSeverity,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposed_repair: Option<Value>,
}

impl ValidationIssue {
    /// Create an issue with a fresh id.
    pub fn new(
        issue_type: IssueType,
        severity: IssueSeverity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            issue_id: Uuid::new_v4().to_string(),
            issue_type,
            severity,
            description: description.into(),
            location: None,
            proposed_repair: None,
        }
    }

    /// Attach a location hint.
    pub fn with_location(mut self, location: Value) -> Self {
        self.location = Some(location);
        self
    }

    /// Attach a proposed repair.
    pub fn with_proposed_repair(mut self, repair: Value) -> Self {
        self.proposed_repair = Some(repair);
        self
    }
}

/// Report produced by the semantic validator for a single artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticValidationReport {
    pub validation_id: String,
    pub artifact_type: ArtifactType,
    pub issues: Vec<ValidationIssue>,
}

impl SemanticValidationReport {
    /// Create a report with a fresh validation id.
    pub fn new(artifact_type: ArtifactType, issues: Vec<ValidationIssue>) -> Self {
        Self {
            validation_id: Uuid::new_v4().to_string(),
            artifact_type,
            issues,
        }
    }

    /// Empty report for an artifact type.
    pub fn empty(artifact_type: ArtifactType) -> Self {
        Self::new(artifact_type, Vec::new())
    }

    /// Whether any issue was detected.
    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }

    /// Highest severity among detected issues.
    pub fn max_severity(&self) -> Option<IssueSeverity> {
        self.issues.iter().map(|i| i.severity).max()
    }

    /// Whether any issue is at or above the given severity.
    pub fn has_issue_at_least(&self, severity: IssueSeverity) -> bool {
        self.issues.iter().any(|i| i.severity >= severity)
    }

    /// Snapshot as a JSON value for telemetry and prompts.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
