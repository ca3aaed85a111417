//! Key-value memory for step results and cross-step context.
//!
//! Step outputs are stored under the key convention `step_<step_id>_result`
//! and read back during context hydration. Two implementations: an
//! in-process map for defaults and tests, and a SQLite-backed store for
//! persistence within a process lifetime.

mod store;

pub use store::SqliteMemoryStore;

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{Error, Result};

/// Memory key for a step's execution result.
pub fn step_result_key(step_id: &str) -> String {
    format!("step_{}_result", step_id)
}

/// Shared key-value memory consumed by the orchestration core.
pub trait Memory: Send + Sync {
    /// Read a value; `None` when the key was never written.
    fn read(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, overwriting any previous entry.
    fn write(&self, key: &str, value: &str) -> Result<()>;
}

/// Map-backed memory.
#[derive(Default)]
pub struct InMemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Memory for InMemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| Error::Memory(format!("memory lock poisoned: {}", e)))?;
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| Error::Memory(format!("memory lock poisoned: {}", e)))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
