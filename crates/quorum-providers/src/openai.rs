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

/// OpenAI API base URL.
const OPENAI_BASE_URL: &str = "https://api.openai.com";
/// Default model identifier.
const DEFAULT_MODEL: &str = "gpt-4o";
/// Env var key for the OpenAI API key.
const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";

/// OpenAI Chat Completions API adapter.
pub struct OpenAiAdapter {
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

impl OpenAiAdapter {
    /// Creates an adapter from the `OPENAI_API_KEY` environment variable.
    ///
    /// # Errors
    /// Returns [`Error::MissingApiKey`] if the variable is not set.
    pub fn new() -> Result<Self> {
        let api_key = env::var(ENV_OPENAI_API_KEY)
            .map_err(|_| Error::MissingApiKey(ENV_OPENAI_API_KEY.to_owned()))?;
        Self::with_api_key_direct(api_key)
    }

    /// Creates an adapter with an explicit API key.
    ///
    /// # Errors
    /// Returns [`Error::MissingApiKey`] if the key is empty.
    pub fn with_api_key_direct(api_key: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::MissingApiKey(ENV_OPENAI_API_KEY.to_owned()));
        }

        Ok(Self {
            client: Client::default(),
            api_key,
            model: DEFAULT_MODEL.to_owned(),
            base_url: OPENAI_BASE_URL.to_owned(),
            rate_limiter: RateLimiter::new(60),
            request_timeout: Duration::from_secs(30),
            input_cost_per_1k: 0.0025,
            output_cost_per_1k: 0.01,
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

    fn build_request(&self, request: &CompletionRequest, stream: bool) -> OpenAiRequest {
        let mut messages = Vec::new();
        if !request.system_prompt.is_empty() {
            messages.push(OpenAiMessage {
                role: "system".to_owned(),
                content: request.system_prompt.clone(),
            });
        }
        messages.push(OpenAiMessage {
            role: "user".to_owned(),
            content: request.prompt.clone(),
        });

        OpenAiRequest {
            model: self.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream,
        }
    }

    async fn send(&self, payload: &OpenAiRequest) -> Result<reqwest::Response> {
        let future = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(payload)
            .send();

        let deadline_ms = self.request_timeout.as_millis() as u64;
        timeout(self.request_timeout, future)
            .await
            .map_err(|_| Error::Timeout(deadline_ms))?
            .map_err(Error::from)
    }
}

/// Request payload for the Chat Completions API.
#[derive(Debug, Serialize)]
struct OpenAiRequest {
    /// Model identifier.
    model: String,
    /// Conversation messages.
    messages: Vec<OpenAiMessage>,
    /// Completion token ceiling.
    max_tokens: usize,
    /// Sampling temperature.
    temperature: f32,
    /// Whether to stream the response.
    stream: bool,
}

/// A chat message.
#[derive(Debug, Serialize)]
struct OpenAiMessage {
    /// Author role.
    role: String,
    /// Message text.
    content: String,
}

/// Response payload from the Chat Completions API.
#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    /// Candidate completions.
    choices: Vec<OpenAiChoice>,
    /// Token accounting.
    usage: OpenAiUsage,
}

/// A single completion choice.
#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    /// Generated message.
    message: OpenAiResponseMessage,
    /// Why generation stopped.
    finish_reason: Option<String>,
}

/// Response message containing the generated text.
#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    /// Generated text content.
    #[serde(default)]
    content: String,
}

/// Token usage reported by OpenAI.
#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    /// Prompt tokens.
    prompt_tokens: u64,
    /// Completion tokens.
    completion_tokens: u64,
}

/// One streaming chunk on the SSE wire.
#[derive(Debug, Deserialize)]
struct OpenAiStreamChunk {
    /// Candidate deltas.
    choices: Vec<OpenAiStreamChoice>,
}

/// A delta choice in a streaming chunk.
#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    /// Delta payload.
    delta: OpenAiStreamDelta,
}

/// Delta payload with the text fragment.
#[derive(Debug, Deserialize)]
struct OpenAiStreamDelta {
    /// Text fragment, absent on role/stop chunks.
    #[serde(default)]
    content: Option<String>,
}

fn extract_sse_delta(line: &str) -> Option<String> {
    let data = line.strip_prefix("data: ")?;
    if data == "[DONE]" {
        return None;
    }
    let chunk: OpenAiStreamChunk = serde_json::from_str(data).ok()?;
    let delta = chunk.choices.first()?.delta.content.clone()?;
    (!delta.is_empty()).then_some(delta)
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn generate(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        self.rate_limiter.acquire().await;
        let start = Instant::now();

        let payload = self.build_request(request, false);
        let response = self.send(&payload).await?;

        if !response.status().is_success() {
            return Err(classify_status("openai", response).await);
        }

        let parsed: OpenAiResponse = response.json().await.map_err(|err| {
            Error::InvalidResponse(format!("openai response did not parse: {err}"))
        })?;

        let choice = parsed
            .choices
            .first()
            .ok_or_else(|| Error::InvalidResponse("openai returned no choices".to_owned()))?;

        let usage = TokenUsage {
            input: parsed.usage.prompt_tokens,
            output: parsed.usage.completion_tokens,
        };
        let cost = (usage.input as f64 / 1000.0) * self.input_cost_per_1k
            + (usage.output as f64 / 1000.0) * self.output_cost_per_1k;
        let finish_reason = match choice.finish_reason.as_deref() {
            Some("length") => FinishReason::Length,
            Some("content_filter") => FinishReason::ContentFilter,
            Some(_) | None => FinishReason::Stop,
        };

        Ok(CompletionResponse {
            content: choice.message.content.clone(),
            usage,
            cost,
            finish_reason,
            provider: format!("openai/{}", self.model),
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn generate_stream(&self, request: &CompletionRequest) -> Result<CompletionStream> {
        self.rate_limiter.acquire().await;

        let payload = self.build_request(request, true);
        let response = self.send(&payload).await?;

        if !response.status().is_success() {
            return Err(classify_status("openai", response).await);
        }

        Ok(line_delta_stream("openai", response, extract_sse_delta))
    }

    async fn health_check(&self) -> HealthStatus {
        let start = Instant::now();
        let probe = self
            .client
            .get(format!("{}/v1/models", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
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
        let output_tokens = request.max_tokens as f64 / 2.0;
        (input_tokens / 1000.0) * self.input_cost_per_1k
            + (output_tokens / 1000.0) * self.output_cost_per_1k
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_adapter() -> OpenAiAdapter {
        OpenAiAdapter::with_api_key_direct("test_key".to_owned()).unwrap()
    }

    #[test]
    fn rejects_empty_api_key() {
        assert!(OpenAiAdapter::with_api_key_direct(String::new()).is_err());
    }

    #[test]
    fn system_prompt_becomes_leading_message() {
        let adapter = test_adapter();
        let payload = adapter.build_request(
            &CompletionRequest::new("write tests").with_system_prompt("you are QA"),
            false,
        );
        assert_eq!(payload.messages.len(), 2);
        assert_eq!(payload.messages[0].role, "system");
        assert_eq!(payload.messages[1].role, "user");
    }

    #[test]
    fn stream_delta_extraction_handles_done_sentinel() {
        let line = r#"data: {"choices":[{"delta":{"content":"wor"}}]}"#;
        assert_eq!(extract_sse_delta(line), Some("wor".to_owned()));

        assert_eq!(extract_sse_delta("data: [DONE]"), None);
        assert_eq!(
            extract_sse_delta(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            None
        );
    }
}
