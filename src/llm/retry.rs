//! Provider failure handling for LLM calls.
//!
//! This wrapper is the sole place provider retry is implemented. Transient
//! failures (timeouts, rate limits, 5xx) get exactly one extra attempt;
//! non-transient failures (auth, quota, invalid request) and retry
//! exhaustion surface as non-retryable phase transition errors.

use std::time::Duration;
use tracing::warn;

use crate::error::{Error, Result};

use super::{GenerateRequest, GenerateResponse, LlmAdapter};

/// Pause before the single retry of a transient failure.
const RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Message markers for failures where retrying cannot help.
const NON_TRANSIENT_MARKERS: &[&str] = &[
    "auth",
    "api key",
    "unauthorized",
    "forbidden",
    "permission",
    "quota",
    "billing",
    "invalid request",
    "invalid_request",
    "400",
    "401",
    "403",
];

/// Classify a provider failure message as transient (retryable once).
///
/// Anything not carrying a non-transient marker is treated as transient;
/// unknown provider failures get the benefit of one retry.
pub(crate) fn is_transient(message: &str) -> bool {
    let lowered = message.to_lowercase();
    !NON_TRANSIENT_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

fn provider_error(phase: &str, condition: &str, code_suffix: &str) -> Error {
    Error::phase_transition(
        format!("LLM@{}", phase),
        condition,
        false,
        format!("AEON.LLM_PROVIDER.{}.{}", phase, code_suffix),
    )
}

/// Call the adapter with provider failure classification and bounded retry.
///
/// `phase` tags the calling phase ("A".."D") for error codes and logs.
pub async fn call_llm_with_provider_error_handling(
    adapter: &dyn LlmAdapter,
    request: GenerateRequest,
    phase: &str,
) -> Result<GenerateResponse> {
    match adapter.generate(request.clone()).await {
        Ok(response) => Ok(response),
        Err(Error::Llm(message)) if is_transient(&message) => {
            warn!(phase, error = %message, "transient LLM failure, retrying once");
            tokio::time::sleep(RETRY_BACKOFF).await;
            match adapter.generate(request).await {
                Ok(response) => Ok(response),
                Err(err) => Err(provider_error(
                    phase,
                    &format!("LLM provider retry exhausted: {}", err),
                    "002",
                )),
            }
        }
        Err(Error::Llm(message)) => Err(provider_error(
            phase,
            &format!("non-transient LLM provider failure: {}", message),
            "001",
        )),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::MockAdapter;

    #[test]
    fn test_transient_classification() {
        assert!(is_transient("Network timeout - temporary error"));
        assert!(is_transient("rate limit exceeded (429)"));
        assert!(is_transient("server error: 503 service unavailable"));
        assert!(!is_transient("Invalid API key - authentication failed"));
        assert!(!is_transient("monthly quota exceeded"));
        assert!(!is_transient("400 invalid request body"));
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let adapter = MockAdapter::new();
        adapter.push_text("hello");

        let response =
            call_llm_with_provider_error_handling(&adapter, GenerateRequest::new("p", "s"), "B")
                .await
                .unwrap();
        assert_eq!(response.text, "hello");
        assert_eq!(adapter.call_count(), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_retried_once() {
        let adapter = MockAdapter::new();
        adapter.push_failure("Network timeout - temporary error");
        adapter.push_text("Success after retry");

        let response =
            call_llm_with_provider_error_handling(&adapter, GenerateRequest::new("p", "s"), "B")
                .await
                .unwrap();
        assert_eq!(response.text, "Success after retry");
        assert_eq!(adapter.call_count(), 2);
    }

    #[tokio::test]
    async fn test_non_transient_failure_not_retried() {
        let adapter = MockAdapter::new();
        adapter.push_failure("Invalid API key - authentication failed");

        let err =
            call_llm_with_provider_error_handling(&adapter, GenerateRequest::new("p", "s"), "B")
                .await
                .unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(err.error_code(), Some("AEON.LLM_PROVIDER.B.001"));
        assert_eq!(adapter.call_count(), 1);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_surfaces_non_retryable() {
        let adapter = MockAdapter::new();
        adapter.push_failure("Network timeout - temporary error");
        adapter.push_failure("Network timeout - temporary error");

        let err =
            call_llm_with_provider_error_handling(&adapter, GenerateRequest::new("p", "s"), "C")
                .await
                .unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(err.error_code(), Some("AEON.LLM_PROVIDER.C.002"));
        assert_eq!(adapter.call_count(), 2);
    }
}
