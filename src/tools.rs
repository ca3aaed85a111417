//! Tool registry interface.
//!
//! Tools are external collaborators: the core only needs to list them (for
//! hallucination checks and supervisor repair prompts), look them up, and
//! invoke them. [`InMemoryToolRegistry`] is a closure-backed implementation
//! for embedding and tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Description of a registered tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub output_schema: Value,
}

impl ToolSpec {
    /// Create a spec with empty object schemas.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: serde_json::json!({"type": "object", "properties": {}}),
            output_schema: serde_json::json!({"type": "object", "properties": {}}),
        }
    }

    /// Set the input schema.
    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    /// Set the output schema.
    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = schema;
        self
    }
}

/// Registry of invocable tools.
#[async_trait]
pub trait ToolRegistry: Send + Sync {
    /// All registered tool specs.
    fn list_all(&self) -> Vec<ToolSpec>;

    /// Look up a tool by name.
    fn get(&self, name: &str) -> Option<ToolSpec>;

    /// Invoke a tool with JSON arguments.
    async fn invoke(&self, name: &str, args: Value) -> Result<Value>;
}

type ToolHandler = Arc<dyn Fn(Value) -> Result<Value> + Send + Sync>;

/// Closure-backed registry for embedding and tests.
#[derive(Default)]
pub struct InMemoryToolRegistry {
    tools: HashMap<String, (ToolSpec, ToolHandler)>,
}

impl InMemoryToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool with its handler.
    pub fn register<F>(&mut self, spec: ToolSpec, handler: F)
    where
        F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.tools
            .insert(spec.name.clone(), (spec, Arc::new(handler)));
    }

    /// Builder-style registration.
    pub fn with_tool<F>(mut self, spec: ToolSpec, handler: F) -> Self
    where
        F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.register(spec, handler);
        self
    }
}

#[async_trait]
impl ToolRegistry for InMemoryToolRegistry {
    fn list_all(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.tools.values().map(|(spec, _)| spec.clone()).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    fn get(&self, name: &str) -> Option<ToolSpec> {
        self.tools.get(name).map(|(spec, _)| spec.clone())
    }

    async fn invoke(&self, name: &str, args: Value) -> Result<Value> {
        let (_, handler) = self
            .tools
            .get(name)
            .ok_or_else(|| Error::Tool(format!("unknown tool: {}", name)))?;
        handler(args)
    }
}
