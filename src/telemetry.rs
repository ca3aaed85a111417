//! Structured per-cycle telemetry.
//!
//! One record is appended per executed step, as newline-delimited JSON.
//! Telemetry is observational only: an append failure is logged and
//! swallowed, never altering execution outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use tracing::warn;

use crate::error::{Error, Result};

/// A structured error entry inside a cycle record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
}

impl ErrorRecord {
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
        }
    }

    /// Record for a crate error, tagged with its kind.
    pub fn from_error(err: &Error) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

/// One telemetry record per executed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleRecord {
    /// Ordinal of the executed step within the request (1-based).
    pub step_number: usize,
    /// Snapshot of the plan at execution time ({goal, steps}).
    pub plan_state: Value,
    /// Raw LLM output for the step, when the step ran on the LLM.
    pub llm_output: Option<Value>,
    /// Supervisor repairs performed while executing the step.
    pub supervisor_actions: Vec<Value>,
    /// Tool invocations performed while executing the step.
    pub tool_calls: Vec<Value>,
    /// Budget remaining after the step executed.
    pub ttl_remaining: i64,
    /// Errors encountered while executing the step.
    pub errors: Vec<ErrorRecord>,
    /// When the record was created.
    pub timestamp: DateTime<Utc>,
    /// Request-scoped correlation id.
    pub correlation_id: String,
}

impl CycleRecord {
    /// Create a record stamped with the current time.
    pub fn new(step_number: usize, plan_state: Value, ttl_remaining: i64) -> Self {
        Self {
            step_number,
            plan_state,
            llm_output: None,
            supervisor_actions: Vec::new(),
            tool_calls: Vec::new(),
            ttl_remaining,
            errors: Vec::new(),
            timestamp: Utc::now(),
            correlation_id: String::new(),
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }
}

enum Sink {
    File(Mutex<File>),
    Buffer(Mutex<Vec<CycleRecord>>),
    Null,
}

/// Append-only NDJSON logger for cycle records.
pub struct JsonlLogger {
    sink: Sink,
}

impl JsonlLogger {
    /// Append records to a file, one JSON object per line.
    pub fn to_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| Error::Internal(format!("failed to open telemetry log: {}", e)))?;
        Ok(Self {
            sink: Sink::File(Mutex::new(file)),
        })
    }

    /// Keep records in memory; useful for tests and embedding.
    pub fn buffered() -> Self {
        Self {
            sink: Sink::Buffer(Mutex::new(Vec::new())),
        }
    }

    /// Discard all records.
    pub fn sink() -> Self {
        Self { sink: Sink::Null }
    }

    /// Append a record. Failures are logged and swallowed.
    pub fn append(&self, record: &CycleRecord) {
        match &self.sink {
            Sink::File(file) => {
                let line = match serde_json::to_string(record) {
                    Ok(line) => line,
                    Err(err) => {
                        warn!(error = %err, "telemetry record serialization failed");
                        return;
                    }
                };
                match file.lock() {
                    Ok(mut file) => {
                        if let Err(err) = writeln!(file, "{}", line) {
                            warn!(error = %err, "telemetry append failed");
                        }
                    }
                    Err(err) => warn!(error = %err, "telemetry lock poisoned"),
                }
            }
            Sink::Buffer(buffer) => {
                if let Ok(mut buffer) = buffer.lock() {
                    buffer.push(record.clone());
                }
            }
            Sink::Null => {}
        }
    }

    /// Records captured by a buffered logger; `None` for other sinks.
    pub fn buffered_records(&self) -> Option<Vec<CycleRecord>> {
        match &self.sink {
            Sink::Buffer(buffer) => buffer.lock().ok().map(|b| b.clone()),
            _ => None,
        }
    }
}
