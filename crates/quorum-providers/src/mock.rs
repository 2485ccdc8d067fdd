//! Mock provider adapter for testing.
//!
//! Allows defining canned responses for specific prompts and scripting
//! failures, enabling end-to-end testing of routing, retry, and orchestration
//! flows without real API calls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use quorum_core::{
    CompletionRequest, CompletionResponse, CompletionStream, Error, FinishReason, HealthStatus,
    ProviderAdapter, Result, TokenUsage,
};

fn lock_ignoring_poison<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock adapter that returns pre-defined responses based on prompt patterns.
#[derive(Clone, Default)]
pub struct MockAdapter {
    /// Predefined responses keyed by prompt substring.
    responses: Arc<Mutex<HashMap<String, String>>>,
    /// Default response if no pattern matches.
    default_response: Arc<Mutex<Option<String>>>,
    /// Errors to return, in order, before succeeding.
    scripted_failures: Arc<Mutex<Vec<Error>>>,
    /// Prompt history for verification.
    call_history: Arc<Mutex<Vec<String>>>,
    /// Cost reported per successful call.
    cost_per_call: Arc<Mutex<f64>>,
    /// Whether `health_check` reports healthy.
    healthy: Arc<Mutex<bool>>,
}

impl MockAdapter {
    /// Creates a healthy mock with no canned responses.
    #[must_use]
    pub fn new() -> Self {
        let adapter = Self::default();
        *lock_ignoring_poison(&adapter.healthy) = true;
        adapter
    }

    /// Adds a substring-pattern response.
    #[must_use]
    pub fn with_response(self, pattern: impl Into<String>, response: impl Into<String>) -> Self {
        lock_ignoring_poison(&self.responses).insert(pattern.into(), response.into());
        self
    }

    /// Sets a default response for prompts that match no pattern.
    #[must_use]
    pub fn with_default_response(self, response: impl Into<String>) -> Self {
        *lock_ignoring_poison(&self.default_response) = Some(response.into());
        self
    }

    /// Sets the cost reported by each successful call.
    #[must_use]
    pub fn with_cost_per_call(self, cost: f64) -> Self {
        *lock_ignoring_poison(&self.cost_per_call) = cost;
        self
    }

    /// Scripts errors to be returned by the next calls, in order.
    #[must_use]
    pub fn with_scripted_failures(self, failures: Vec<Error>) -> Self {
        let mut scripted = lock_ignoring_poison(&self.scripted_failures);
        *scripted = failures;
        scripted.reverse(); // pop() yields them in script order
        drop(scripted);
        self
    }

    /// Sets the health flag.
    #[must_use]
    pub fn with_healthy(self, healthy: bool) -> Self {
        *lock_ignoring_poison(&self.healthy) = healthy;
        self
    }

    /// Returns the prompts seen so far.
    #[must_use]
    pub fn call_history(&self) -> Vec<String> {
        lock_ignoring_poison(&self.call_history).clone()
    }

    /// Number of calls made.
    #[must_use]
    pub fn call_count(&self) -> usize {
        lock_ignoring_poison(&self.call_history).len()
    }

    fn respond(&self, request: &CompletionRequest) -> Result<String> {
        lock_ignoring_poison(&self.call_history).push(request.prompt.clone());

        if let Some(failure) = lock_ignoring_poison(&self.scripted_failures).pop() {
            return Err(failure);
        }

        let responses = lock_ignoring_poison(&self.responses);
        for (pattern, response) in responses.iter() {
            if request.prompt.contains(pattern.as_str()) {
                return Ok(response.clone());
            }
        }
        drop(responses);

        lock_ignoring_poison(&self.default_response)
            .clone()
            .ok_or_else(|| {
                Error::InvalidResponse(format!(
                    "mock has no response for prompt: {}",
                    request.prompt
                ))
            })
    }
}

#[async_trait]
impl ProviderAdapter for MockAdapter {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn generate(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        let content = self.respond(request)?;
        let cost = *lock_ignoring_poison(&self.cost_per_call);

        Ok(CompletionResponse {
            usage: TokenUsage {
                input: request.token_estimate() as u64,
                output: (content.len() / 4) as u64,
            },
            content,
            cost,
            finish_reason: FinishReason::Stop,
            provider: "mock".to_owned(),
            latency_ms: 1,
        })
    }

    async fn generate_stream(&self, request: &CompletionRequest) -> Result<CompletionStream> {
        let content = self.respond(request)?;
        let deltas = content
            .as_bytes()
            .chunks(4)
            .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
            .collect();
        Ok(CompletionStream::from_deltas(deltas))
    }

    async fn health_check(&self) -> HealthStatus {
        if *lock_ignoring_poison(&self.healthy) {
            HealthStatus::healthy(1)
        } else {
            HealthStatus::unhealthy()
        }
    }

    fn estimate_cost(&self, _request: &CompletionRequest) -> f64 {
        *lock_ignoring_poison(&self.cost_per_call)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt as _;

    #[tokio::test]
    async fn pattern_and_default_responses() {
        let mock = MockAdapter::new()
            .with_response("design", "use a message queue")
            .with_default_response("ok");

        let matched = mock
            .generate(&CompletionRequest::new("design the system"))
            .await
            .unwrap();
        assert_eq!(matched.content, "use a message queue");

        let fallback = mock
            .generate(&CompletionRequest::new("anything else"))
            .await
            .unwrap();
        assert_eq!(fallback.content, "ok");

        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn no_response_configured_is_an_error() {
        let mock = MockAdapter::new();
        let result = mock.generate(&CompletionRequest::new("hello")).await;
        assert!(matches!(result, Err(Error::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn scripted_failures_run_in_order_then_succeed() {
        let mock = MockAdapter::new()
            .with_default_response("recovered")
            .with_scripted_failures(vec![
                Error::Transient("first".to_owned()),
                Error::RateLimited { retry_after_ms: 10 },
            ]);

        let request = CompletionRequest::new("go");
        assert!(matches!(
            mock.generate(&request).await,
            Err(Error::Transient(_))
        ));
        assert!(matches!(
            mock.generate(&request).await,
            Err(Error::RateLimited { .. })
        ));
        assert_eq!(mock.generate(&request).await.unwrap().content, "recovered");
    }

    #[tokio::test]
    async fn streaming_reassembles_to_full_content() {
        let mock = MockAdapter::new().with_default_response("hello streaming world");
        let mut stream = mock
            .generate_stream(&CompletionRequest::new("hi"))
            .await
            .unwrap();

        let mut collected = String::new();
        while let Some(delta) = stream.next().await {
            collected.push_str(&delta.unwrap());
        }
        assert_eq!(collected, "hello streaming world");
    }

    #[tokio::test]
    async fn health_flag_is_respected() {
        let healthy = MockAdapter::new();
        assert!(healthy.health_check().await.is_healthy);

        let sick = MockAdapter::new().with_healthy(false);
        assert!(!sick.health_check().await.is_healthy);
    }
}
