//! Error types shared across the pipeline crates.

use thiserror::Error;

/// Error during canonical serialization of an invoice.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// Line numbers must be unique within an invoice.
    #[error("duplicate line number {line_number} in invoice {invoice_id}")]
    DuplicateLineNumber {
        /// Invoice whose lines are malformed.
        invoice_id: i64,
        /// The repeated line number.
        line_number: i32,
    },

    /// A line row belongs to a different invoice than the one being
    /// canonicalized.
    #[error("line {line_id} belongs to invoice {actual}, not invoice {expected}")]
    ForeignLine {
        /// The offending line row.
        line_id: i64,
        /// Invoice the line claims to belong to.
        actual: i64,
        /// Invoice being canonicalized.
        expected: i64,
    },

    /// JSON serialization failed.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

/// Error in status state machine transitions.
#[derive(Error, Debug)]
pub enum StateError {
    /// Attempted an invalid status transition.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        /// Current status name.
        from: String,
        /// Attempted target status name.
        to: String,
    },

    /// A persisted status code is not part of the pinned encoding.
    #[error("unknown {entity} status code {code}")]
    UnknownCode {
        /// Entity family the code belongs to ("invoice" or "batch").
        entity: &'static str,
        /// The unrecognized persisted code.
        code: i32,
    },
}
