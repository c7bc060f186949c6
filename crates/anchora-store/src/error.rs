//! Persistence layer error type.

use thiserror::Error;

/// Errors from repository operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database round-trip failure.
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    /// A persisted row decoded to an impossible domain state.
    #[error("corrupt row: {0}")]
    Corrupt(#[from] anchora_core::StateError),
}
