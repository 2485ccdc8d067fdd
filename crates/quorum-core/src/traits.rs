use async_trait::async_trait;

use crate::{CompletionRequest, CompletionResponse, CompletionStream, HealthStatus, Result};

/// Uniform interface to one LLM backend.
///
/// Adapters translate vendor-specific wire formats and error codes into the
/// shared [`CompletionResponse`] shape and error taxonomy, and enforce their
/// own request-level rate limiting.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Returns the unique identifier for this provider.
    fn name(&self) -> &'static str;

    /// Issues a completion request.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Auth`] on credential rejection,
    /// [`crate::Error::RateLimited`] when the vendor throttles us,
    /// [`crate::Error::Transient`] on 5xx/network failures, and
    /// [`crate::Error::Timeout`] when the call exceeds its deadline.
    async fn generate(&self, request: &CompletionRequest) -> Result<CompletionResponse>;

    /// Issues a streaming completion request, yielding text deltas.
    ///
    /// The returned stream is finite and non-restartable; dropping it closes
    /// the underlying connection.
    async fn generate_stream(&self, request: &CompletionRequest) -> Result<CompletionStream>;

    /// Probes the backend and reports health with probe latency.
    async fn health_check(&self) -> HealthStatus;

    /// Estimates the cost in USD for the given request.
    fn estimate_cost(&self, request: &CompletionRequest) -> f64;
}
