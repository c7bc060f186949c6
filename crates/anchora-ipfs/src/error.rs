//! Pinning client error types.

/// Errors from pinning service calls.
#[derive(Debug, thiserror::Error)]
pub enum IpfsError {
    /// Transient failure: transport error, timeout, 5xx, or rate-limit
    /// response. Safe to retry.
    #[error("transient pinning failure calling {endpoint}: {reason}")]
    Retryable {
        /// The endpoint that failed.
        endpoint: String,
        /// Transport or status detail.
        reason: String,
    },

    /// The service rejected the request; retrying cannot help.
    #[error("pinning service rejected {endpoint}: HTTP {status}: {body}")]
    Permanent {
        /// The endpoint that rejected the call.
        endpoint: String,
        /// HTTP status code.
        status: u16,
        /// Response body excerpt.
        body: String,
    },

    /// The response body did not match the expected shape.
    #[error("failed to deserialize response from {endpoint}: {reason}")]
    Deserialization {
        /// The endpoint whose response was malformed.
        endpoint: String,
        /// Parser detail.
        reason: String,
    },

    /// Client construction or configuration failure.
    #[error("pinning client configuration error: {0}")]
    Config(String),
}

impl IpfsError {
    /// Whether the shared backoff policy should retry this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable { .. })
    }
}
