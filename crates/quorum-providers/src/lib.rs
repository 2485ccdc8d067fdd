//! Provider adapters for external LLM services.
//!
//! Each adapter normalizes one vendor's wire protocol into the shared
//! [`quorum_core::CompletionResponse`] shape and error taxonomy, and enforces
//! request-level rate limiting with a sliding 60-second window.

/// Anthropic Messages API adapter.
pub mod anthropic;
/// Mock adapter for testing.
pub mod mock;
/// Local Ollama adapter.
pub mod ollama;
/// OpenAI Chat Completions adapter.
pub mod openai;
/// Sliding-window rate limiting.
pub mod rate_limit;

mod wire;

pub use anthropic::AnthropicAdapter;
pub use mock::MockAdapter;
pub use ollama::OllamaAdapter;
pub use openai::OpenAiAdapter;
pub use rate_limit::RateLimiter;
