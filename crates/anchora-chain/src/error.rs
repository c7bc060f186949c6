//! Chain client error types.

/// Errors from anchor contract operations.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// A state-changing call was attempted without a signing key.
    #[error("no signing account configured: {operation} requires a private key")]
    NoSigner {
        /// The operation that needed a signer.
        operation: &'static str,
    },

    /// Transport-level failure (connection, timeout, 5xx). Safe to retry.
    #[error("chain transport failure during {operation}: {reason}")]
    Transport {
        /// The operation in flight.
        operation: String,
        /// Transport detail.
        reason: String,
    },

    /// The node or contract rejected the call; retrying cannot help.
    #[error("chain rejected {operation}: {reason}")]
    Reverted {
        /// The rejected operation.
        operation: String,
        /// Revert or rejection detail.
        reason: String,
    },

    /// Locally malformed input or undecodable on-chain data.
    #[error("malformed data in {operation}: {reason}")]
    Malformed {
        /// The operation with bad data.
        operation: String,
        /// What failed to parse or decode.
        reason: String,
    },

    /// Client construction or configuration failure.
    #[error("chain client configuration error: {0}")]
    Config(String),
}

impl ChainError {
    /// Whether the shared backoff policy should retry this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}
