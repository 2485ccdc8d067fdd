use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;

use quorum_core::{
    CompletionRequest, CompletionResponse, CompletionStream, Error, FinishReason, HealthStatus,
    ProviderAdapter, Result, TokenUsage,
};

use crate::rate_limit::RateLimiter;
use crate::wire::{classify_status, line_delta_stream};

/// Default Ollama server URL.
const OLLAMA_BASE_URL: &str = "http://localhost:11434";
/// Default local model.
const DEFAULT_MODEL: &str = "llama3.1:8b";

/// Local model adapter speaking the Ollama HTTP generate API.
///
/// Local inference is free and private: `estimate_cost` is always zero and no
/// API key is needed.
pub struct OllamaAdapter {
    /// HTTP client for API requests.
    client: Client,
    /// Ollama server URL.
    base_url: String,
    /// Model name to run.
    model: String,
    /// Request-level rate limiter.
    rate_limiter: RateLimiter,
    /// Per-request deadline. Local models can be slow, so this is generous.
    request_timeout: Duration,
}

impl OllamaAdapter {
    /// Creates an adapter for the given local model.
    #[must_use]
    pub fn new(model: String) -> Self {
        Self {
            client: Client::default(),
            base_url: OLLAMA_BASE_URL.to_owned(),
            model,
            rate_limiter: RateLimiter::new(120),
            request_timeout: Duration::from_secs(120),
        }
    }

    /// Overrides the server URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    /// Sets the requests-per-minute ceiling.
    #[must_use]
    pub fn with_rate_limit(mut self, max_requests_per_minute: usize) -> Self {
        self.rate_limiter = RateLimiter::new(max_requests_per_minute);
        self
    }

    /// Sets the per-request deadline.
    #[must_use]
    pub fn with_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    fn build_request(&self, request: &CompletionRequest, stream: bool) -> OllamaGenerateRequest {
        OllamaGenerateRequest {
            model: self.model.clone(),
            prompt: request.prompt.clone(),
            system: (!request.system_prompt.is_empty()).then(|| request.system_prompt.clone()),
            stream,
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        }
    }

    async fn send(&self, payload: &OllamaGenerateRequest) -> Result<reqwest::Response> {
        let future = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(payload)
            .send();

        let deadline_ms = self.request_timeout.as_millis() as u64;
        timeout(self.request_timeout, future)
            .await
            .map_err(|_| Error::Timeout(deadline_ms))?
            .map_err(Error::from)
    }
}

impl Default for OllamaAdapter {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL.to_owned())
    }
}

/// Request payload for the Ollama generate API.
#[derive(Debug, Serialize)]
struct OllamaGenerateRequest {
    /// Model name.
    model: String,
    /// Prompt text.
    prompt: String,
    /// Optional system prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    /// Whether to stream NDJSON chunks.
    stream: bool,
    /// Generation options.
    options: OllamaOptions,
}

/// Generation options.
#[derive(Debug, Serialize)]
struct OllamaOptions {
    /// Sampling temperature.
    temperature: f32,
    /// Completion token ceiling.
    num_predict: usize,
}

/// Response payload from the generate API.
#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    /// Generated text.
    response: String,
    /// Prompt token count.
    #[serde(default)]
    prompt_eval_count: u64,
    /// Completion token count.
    #[serde(default)]
    eval_count: u64,
    /// Whether generation finished.
    #[serde(default)]
    done: bool,
}

fn extract_ndjson_delta(line: &str) -> Option<String> {
    let chunk: OllamaGenerateResponse = serde_json::from_str(line).ok()?;
    (!chunk.response.is_empty()).then_some(chunk.response)
}

#[async_trait]
impl ProviderAdapter for OllamaAdapter {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn generate(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        self.rate_limiter.acquire().await;
        let start = Instant::now();

        let payload = self.build_request(request, false);
        let response = self.send(&payload).await?;

        if !response.status().is_success() {
            return Err(classify_status("ollama", response).await);
        }

        let parsed: OllamaGenerateResponse = response.json().await.map_err(|err| {
            Error::InvalidResponse(format!("ollama response did not parse: {err}"))
        })?;

        Ok(CompletionResponse {
            content: parsed.response,
            usage: TokenUsage {
                input: parsed.prompt_eval_count,
                output: parsed.eval_count,
            },
            cost: 0.0,
            finish_reason: if parsed.done {
                FinishReason::Stop
            } else {
                FinishReason::Length
            },
            provider: format!("ollama/{}", self.model),
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn generate_stream(&self, request: &CompletionRequest) -> Result<CompletionStream> {
        self.rate_limiter.acquire().await;

        let payload = self.build_request(request, true);
        let response = self.send(&payload).await?;

        if !response.status().is_success() {
            return Err(classify_status("ollama", response).await);
        }

        Ok(line_delta_stream("ollama", response, extract_ndjson_delta))
    }

    async fn health_check(&self) -> HealthStatus {
        let start = Instant::now();
        let probe = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await;

        match probe {
            Ok(response) if response.status().is_success() => {
                HealthStatus::healthy(start.elapsed().as_millis() as u64)
            }
            Ok(_) | Err(_) => HealthStatus::unhealthy(),
        }
    }

    fn estimate_cost(&self, _request: &CompletionRequest) -> f64 {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_inference_is_free() {
        let adapter = OllamaAdapter::default();
        let request = CompletionRequest::new("x".repeat(100_000));
        assert!(adapter.estimate_cost(&request).abs() < f64::EPSILON);
    }

    #[test]
    fn ndjson_delta_extraction() {
        let line = r#"{"model":"llama3.1:8b","response":"Hi","done":false}"#;
        assert_eq!(extract_ndjson_delta(line), Some("Hi".to_owned()));

        let tail = r#"{"model":"llama3.1:8b","response":"","done":true,"eval_count":42}"#;
        assert_eq!(extract_ndjson_delta(tail), None);

        assert_eq!(extract_ndjson_delta("not json"), None);
    }

    #[test]
    fn adapter_name() {
        assert_eq!(OllamaAdapter::default().name(), "ollama");
    }
}
