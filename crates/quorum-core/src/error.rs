use core::result::Result as CoreResult;
use std::io::Error as IoError;

use reqwest::Error as ReqwestError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;
use toml::de::Error as TomlError;

/// Result type for core operations.
pub type Result<T> = CoreResult<T, Error>;

/// Errors that can occur across the routing and orchestration core.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// An HTTP request failed at the transport level.
    #[error("HTTP request failed: {0}")]
    Request(#[from] ReqwestError),

    /// JSON serialization or deserialization failed.
    #[error("JSON serialization error: {0}")]
    Json(#[from] SerdeJsonError),

    /// TOML deserialization failed.
    #[error("TOML deserialization error: {0}")]
    Toml(#[from] TomlError),

    /// Configuration is invalid or missing. Fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Required API key was not found for an enabled provider.
    #[error("API key not found: {0}")]
    MissingApiKey(String),

    /// The requested model is not present in the catalog.
    #[error("Model not found in catalog: {0}")]
    ModelNotFound(String),

    /// The privacy-first strategy found no enabled local model.
    ///
    /// This is a hard failure: silently routing to a cloud model would
    /// violate the privacy constraint, so it is never swallowed.
    #[error("No enabled local model available for privacy-first routing")]
    NoLocalModel,

    /// Provider rejected our credentials. Fatal for that provider until an
    /// external health check clears it.
    #[error("Provider authentication failed: {0}")]
    Auth(String),

    /// Provider-side rate limit was hit.
    #[error("Rate limit exceeded, retry after {retry_after_ms}ms")]
    RateLimited {
        /// Suggested wait before retrying, from the provider when available.
        retry_after_ms: u64,
    },

    /// A transient provider or network failure that may succeed on retry.
    #[error("Transient provider error: {0}")]
    Transient(String),

    /// A provider call exceeded its deadline.
    #[error("Timeout after {0}ms")]
    Timeout(u64),

    /// Provider returned a response the adapter could not interpret.
    #[error("Invalid response from provider: {0}")]
    InvalidResponse(String),

    /// Delivering a message to another agent failed.
    #[error("Agent communication error: {0}")]
    AgentCommunication(String),

    /// A delegated task did not report back within its deadline.
    #[error("Task timed out: {0}")]
    TaskTimeout(String),

    /// A general error not covered by other variants.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Determines whether this error may succeed if retried.
    ///
    /// Rate limits, timeouts, and transport-level failures are transient;
    /// everything else either needs operator attention or a different model.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Request(_) | Self::RateLimited { .. } | Self::Transient(_) | Self::Timeout(_)
        )
    }

    /// Determines whether this error is fatal for its source.
    ///
    /// Fatal errors are configuration and credential problems that no amount
    /// of retrying fixes.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::MissingApiKey(_) | Self::Auth(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let error = Error::Config("bad catalog".to_owned());
        assert_eq!(error.to_string(), "Configuration error: bad catalog");

        let error = Error::MissingApiKey("ANTHROPIC_API_KEY".to_owned());
        assert_eq!(error.to_string(), "API key not found: ANTHROPIC_API_KEY");

        let error = Error::Timeout(30_000);
        assert_eq!(error.to_string(), "Timeout after 30000ms");
    }

    #[test]
    fn retryable_classification() {
        assert!(Error::Transient("connection reset".to_owned()).is_retryable());
        assert!(Error::RateLimited { retry_after_ms: 500 }.is_retryable());
        assert!(Error::Timeout(1000).is_retryable());

        assert!(!Error::Auth("bad key".to_owned()).is_retryable());
        assert!(!Error::NoLocalModel.is_retryable());
        assert!(!Error::ModelNotFound("claude-opus".to_owned()).is_retryable());
    }

    #[test]
    fn fatal_classification() {
        assert!(Error::Config("unparsable".to_owned()).is_fatal());
        assert!(Error::MissingApiKey("OPENAI_API_KEY".to_owned()).is_fatal());
        assert!(Error::Auth("401".to_owned()).is_fatal());

        assert!(!Error::Transient("flaky".to_owned()).is_fatal());
        assert!(!Error::NoLocalModel.is_fatal());
    }

    #[test]
    fn from_json_error() {
        let json_error = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let error: Error = json_error.into();
        assert!(matches!(error, Error::Json(_)));
    }
}
