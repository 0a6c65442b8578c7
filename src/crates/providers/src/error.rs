//! Error types for capability adapters.

use thiserror::Error;

/// Result type for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Errors that can occur when calling a generative provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// HTTP transport failure.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider rate-limited us (429).
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Transient server-side failure (5xx).
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The call exceeded its deadline.
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Non-retryable provider refusal: spend cap, content policy, bad auth.
    #[error("Provider fatal: {0}")]
    Fatal(String),

    /// The provider answered with something we cannot use.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Adapter misconfiguration (missing key, bad base URL).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Retries exhausted; wraps the last transient error's message.
    #[error("Retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

impl ProviderError {
    /// True for errors that may succeed on retry: network failures, 429s
    /// and transient 5xx. Everything else is final.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Http(e) => !matches!(e.status(), Some(s) if s.is_client_error()),
            ProviderError::RateLimited(_)
            | ProviderError::ServiceUnavailable(_)
            | ProviderError::Timeout(_) => true,
            _ => false,
        }
    }

    /// Collapse a retry-exhausted transient error into its fatal form.
    pub fn into_final(self, attempts: u32) -> ProviderError {
        if self.is_retryable() {
            ProviderError::RetriesExhausted {
                attempts,
                last_error: self.to_string(),
            }
        } else {
            self
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::InvalidResponse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ProviderError::RateLimited("429".into()).is_retryable());
        assert!(ProviderError::ServiceUnavailable("503".into()).is_retryable());
        assert!(ProviderError::Timeout("deadline".into()).is_retryable());
        assert!(!ProviderError::Fatal("quota_exceeded".into()).is_retryable());
        assert!(!ProviderError::InvalidResponse("bad json".into()).is_retryable());
        assert!(!ProviderError::Config("no key".into()).is_retryable());
    }

    #[test]
    fn test_into_final_wraps_transient_only() {
        let wrapped = ProviderError::Timeout("slow".into()).into_final(3);
        assert!(matches!(wrapped, ProviderError::RetriesExhausted { attempts: 3, .. }));
        assert!(!wrapped.is_retryable());

        let fatal = ProviderError::Fatal("content policy".into()).into_final(3);
        assert!(matches!(fatal, ProviderError::Fatal(_)));
    }
}
