//! LLM adapter interface and provider implementations.
//!
//! The orchestration core consumes a single narrow interface: [`LlmAdapter`]
//! turns a prompt/system-prompt pair into generated text. Provider-specific
//! retry lives in [`retry`]; everything above it treats the adapter as a
//! suspension point that either yields text or a typed [`Error::Llm`].
//!
//! [`Error::Llm`]: crate::error::Error::Llm

mod anthropic;
mod retry;

pub use anthropic::{AdapterConfig, AnthropicAdapter};
pub use retry::call_llm_with_provider_error_handling;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A single generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    pub system_prompt: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

impl GenerateRequest {
    /// Create a request with the core's default generation parameters.
    pub fn new(prompt: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: system_prompt.into(),
            max_tokens: 2048,
            temperature: 0.7,
        }
    }

    /// Set the token ceiling.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Text produced by a generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub text: String,
}

/// LLM adapter consumed by the orchestration core.
///
/// Implementations must be thread-safe; provider failures are raised as
/// [`Error::Llm`](crate::error::Error::Llm) so the retry wrapper can
/// classify them as transient or non-transient.
#[async_trait]
pub trait LlmAdapter: Send + Sync {
    /// Generate text for a prompt.
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse>;
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted adapter for crate-internal tests.

    use super::*;
    use crate::error::Error;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Either text to return or an error message to raise.
    #[derive(Debug, Clone)]
    pub enum ScriptedReply {
        Text(String),
        Failure(String),
    }

    /// Adapter returning scripted replies in order, capturing every request.
    pub struct MockAdapter {
        replies: Mutex<VecDeque<ScriptedReply>>,
        pub requests: Mutex<Vec<GenerateRequest>>,
        /// Reply used when the script runs dry.
        fallback: String,
    }

    impl MockAdapter {
        pub fn new() -> Self {
            Self {
                replies: Mutex::new(VecDeque::new()),
                requests: Mutex::new(Vec::new()),
                fallback: "{}".to_string(),
            }
        }

        pub fn with_replies(replies: Vec<ScriptedReply>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().collect()),
                requests: Mutex::new(Vec::new()),
                fallback: "{}".to_string(),
            }
        }

        /// Adapter that answers every request with the same text.
        pub fn always(text: impl Into<String>) -> Self {
            Self {
                replies: Mutex::new(VecDeque::new()),
                requests: Mutex::new(Vec::new()),
                fallback: text.into(),
            }
        }

        pub fn push_text(&self, text: impl Into<String>) {
            self.replies
                .lock()
                .unwrap()
                .push_back(ScriptedReply::Text(text.into()));
        }

        pub fn push_failure(&self, message: impl Into<String>) {
            self.replies
                .lock()
                .unwrap()
                .push_back(ScriptedReply::Failure(message.into()));
        }

        pub fn call_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        pub fn last_prompt(&self) -> Option<String> {
            self.requests.lock().unwrap().last().map(|r| r.prompt.clone())
        }
    }

    #[async_trait]
    impl LlmAdapter for MockAdapter {
        async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse> {
            self.requests.lock().unwrap().push(request);
            let reply = self.replies.lock().unwrap().pop_front();
            match reply {
                Some(ScriptedReply::Text(text)) => Ok(GenerateResponse { text }),
                Some(ScriptedReply::Failure(message)) => Err(Error::llm(message)),
                None => Ok(GenerateResponse {
                    text: self.fallback.clone(),
                }),
            }
        }
    }
}
