use std::env;
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

/// Anthropic API base URL.
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
/// Anthropic API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// Default model identifier.
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
/// Env var key for the Anthropic API key.
const ENV_ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";

/// Anthropic Messages API adapter.
pub struct AnthropicAdapter {
    /// HTTP client for API requests.
    client: Client,
    /// API key.
    api_key: String,
    /// Model identifier sent on the wire.
    model: String,
    /// Base URL, overridable for tests.
    base_url: String,
    /// Request-level rate limiter.
    rate_limiter: RateLimiter,
    /// Per-request deadline.
    request_timeout: Duration,
    /// Cost per 1k input tokens in USD.
    input_cost_per_1k: f64,
    /// Cost per 1k output tokens in USD.
    output_cost_per_1k: f64,
}

impl AnthropicAdapter {
    /// Creates an adapter from the `ANTHROPIC_API_KEY` environment variable.
    ///
    /// # Errors
    /// Returns [`Error::MissingApiKey`] if the variable is not set.
    pub fn new() -> Result<Self> {
        let api_key = env::var(ENV_ANTHROPIC_API_KEY)
            .map_err(|_| Error::MissingApiKey(ENV_ANTHROPIC_API_KEY.to_owned()))?;
        Self::with_api_key_direct(api_key)
    }

    /// Creates an adapter with an explicit API key.
    ///
    /// # Errors
    /// Returns [`Error::MissingApiKey`] if the key is empty.
    pub fn with_api_key_direct(api_key: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::MissingApiKey(ENV_ANTHROPIC_API_KEY.to_owned()));
        }

        Ok(Self {
            client: Client::default(),
            api_key,
            model: DEFAULT_MODEL.to_owned(),
            base_url: ANTHROPIC_BASE_URL.to_owned(),
            rate_limiter: RateLimiter::new(50),
            request_timeout: Duration::from_secs(30),
            input_cost_per_1k: 0.003,
            output_cost_per_1k: 0.015,
        })
    }

    /// Sets the model to use for generation.
    #[must_use]
    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    /// Overrides the API base URL (testing).
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

    /// Sets token costs per 1k tokens.
    #[must_use]
    pub fn with_costs(mut self, input_per_1k: f64, output_per_1k: f64) -> Self {
        self.input_cost_per_1k = input_per_1k;
        self.output_cost_per_1k = output_per_1k;
        self
    }

    fn build_request(&self, request: &CompletionRequest, stream: bool) -> AnthropicRequest {
        AnthropicRequest {
            model: self.model.clone(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: (!request.system_prompt.is_empty()).then(|| request.system_prompt.clone()),
            messages: vec![AnthropicMessage {
                role: "user".to_owned(),
                content: request.prompt.clone(),
            }],
            stream,
        }
    }

    async fn send(&self, payload: &AnthropicRequest) -> Result<reqwest::Response> {
        let future = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(payload)
            .send();

        let deadline_ms = self.request_timeout.as_millis() as u64;
        timeout(self.request_timeout, future)
            .await
            .map_err(|_| Error::Timeout(deadline_ms))?
            .map_err(Error::from)
    }
}

/// Request payload for the Anthropic Messages API.
#[derive(Debug, Serialize)]
struct AnthropicRequest {
    /// Model identifier.
    model: String,
    /// Completion token ceiling.
    max_tokens: usize,
    /// Sampling temperature.
    temperature: f32,
    /// Optional system prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    /// Conversation messages.
    messages: Vec<AnthropicMessage>,
    /// Whether to stream the response.
    stream: bool,
}

/// A message in the Anthropic conversation format.
#[derive(Debug, Serialize)]
struct AnthropicMessage {
    /// Author role.
    role: String,
    /// Message text.
    content: String,
}

/// Response payload from the Messages API.
#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    /// Content blocks of the completion.
    content: Vec<AnthropicContentBlock>,
    /// Token accounting.
    usage: AnthropicUsage,
    /// Why generation stopped.
    stop_reason: Option<String>,
}

/// A single content block in the response.
#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    /// Text of the block, absent for non-text blocks.
    #[serde(default)]
    text: String,
}

/// Token usage reported by Anthropic.
#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    /// Prompt tokens.
    input_tokens: u64,
    /// Completion tokens.
    output_tokens: u64,
}

/// One server-sent event on the streaming wire.
#[derive(Debug, Deserialize)]
struct AnthropicStreamEvent {
    /// Event type tag.
    #[serde(rename = "type")]
    event_type: String,
    /// Delta payload for `content_block_delta` events.
    #[serde(default)]
    delta: Option<AnthropicStreamDelta>,
}

/// Delta payload inside a stream event.
#[derive(Debug, Deserialize)]
struct AnthropicStreamDelta {
    /// Text fragment.
    #[serde(default)]
    text: String,
}

fn extract_sse_delta(line: &str) -> Option<String> {
    let data = line.strip_prefix("data: ")?;
    let event: AnthropicStreamEvent = serde_json::from_str(data).ok()?;
    if event.event_type != "content_block_delta" {
        return None;
    }
    let delta = event.delta?;
    (!delta.text.is_empty()).then_some(delta.text)
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn generate(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        self.rate_limiter.acquire().await;
        let start = Instant::now();

        let payload = self.build_request(request, false);
        let response = self.send(&payload).await?;

        if !response.status().is_success() {
            return Err(classify_status("anthropic", response).await);
        }

        let parsed: AnthropicResponse = response.json().await.map_err(|err| {
            Error::InvalidResponse(format!("anthropic response did not parse: {err}"))
        })?;

        let content = parsed
            .content
            .iter()
            .map(|block| block.text.as_str())
            .collect::<String>();
        if content.is_empty() {
            return Err(Error::InvalidResponse(
                "anthropic returned no text content".to_owned(),
            ));
        }

        let usage = TokenUsage {
            input: parsed.usage.input_tokens,
            output: parsed.usage.output_tokens,
        };
        let cost = (usage.input as f64 / 1000.0) * self.input_cost_per_1k
            + (usage.output as f64 / 1000.0) * self.output_cost_per_1k;
        let finish_reason = match parsed.stop_reason.as_deref() {
            Some("max_tokens") => FinishReason::Length,
            Some(_) | None => FinishReason::Stop,
        };

        Ok(CompletionResponse {
            content,
            usage,
            cost,
            finish_reason,
            provider: format!("anthropic/{}", self.model),
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn generate_stream(&self, request: &CompletionRequest) -> Result<CompletionStream> {
        self.rate_limiter.acquire().await;

        let payload = self.build_request(request, true);
        let response = self.send(&payload).await?;

        if !response.status().is_success() {
            return Err(classify_status("anthropic", response).await);
        }

        Ok(line_delta_stream("anthropic", response, extract_sse_delta))
    }

    async fn health_check(&self) -> HealthStatus {
        let start = Instant::now();
        let probe = self
            .client
            .get(format!("{}/v1/models", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .send()
            .await;

        match probe {
            Ok(response) if response.status().is_success() => {
                HealthStatus::healthy(start.elapsed().as_millis() as u64)
            }
            Ok(_) | Err(_) => HealthStatus::unhealthy(),
        }
    }

    fn estimate_cost(&self, request: &CompletionRequest) -> f64 {
        let input_tokens = request.token_estimate() as f64;
        // Assume roughly half the token budget gets used on output.
        let output_tokens = request.max_tokens as f64 / 2.0;
        (input_tokens / 1000.0) * self.input_cost_per_1k
            + (output_tokens / 1000.0) * self.output_cost_per_1k
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_adapter() -> AnthropicAdapter {
        AnthropicAdapter::with_api_key_direct("test_key".to_owned()).unwrap()
    }

    #[test]
    fn rejects_empty_api_key() {
        assert!(AnthropicAdapter::with_api_key_direct(String::new()).is_err());
    }

    #[test]
    fn adapter_name_and_defaults() {
        let adapter = test_adapter();
        assert_eq!(adapter.name(), "anthropic");
        assert_eq!(adapter.model, DEFAULT_MODEL);
    }

    #[test]
    fn cost_estimation_scales_with_prompt() {
        let adapter = test_adapter();
        let short = CompletionRequest::new("hi").with_max_tokens(100);
        let long = CompletionRequest::new("x".repeat(40_000)).with_max_tokens(100);
        assert!(adapter.estimate_cost(&long) > adapter.estimate_cost(&short));
    }

    #[test]
    fn system_prompt_is_omitted_when_empty() {
        let adapter = test_adapter();
        let payload = adapter.build_request(&CompletionRequest::new("hello"), false);
        assert!(payload.system.is_none());

        let payload = adapter.build_request(
            &CompletionRequest::new("hello").with_system_prompt("be brief"),
            false,
        );
        assert_eq!(payload.system.as_deref(), Some("be brief"));
    }

    #[test]
    fn stream_delta_extraction() {
        let line = r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hel"}}"#;
        assert_eq!(extract_sse_delta(line), Some("Hel".to_owned()));

        let stop = r#"data: {"type":"message_stop"}"#;
        assert_eq!(extract_sse_delta(stop), None);

        assert_eq!(extract_sse_delta("event: message_delta"), None);
    }
}
