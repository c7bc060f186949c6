//! # anchora-ipfs — Pinning Gateway Client
//!
//! HTTP client for a Pinata-compatible pinning service: pin JSON documents,
//! fetch them back through the public gateway, and query pin status.
//!
//! ## Back-pressure
//!
//! Every call first takes a ticket from a token bucket sized to the
//! configured per-minute rate. The bucket replenishes continuously, so a
//! burst never outruns the budget and a cancelled caller consumes nothing.
//!
//! ## Failure taxonomy
//!
//! Transport errors, timeouts, 5xx and 429 responses are
//! [`IpfsError::Retryable`] and run under the shared backoff policy; any
//! other 4xx is [`IpfsError::Permanent`] and returns immediately.

pub mod client;
pub mod error;

pub use client::{PinataClient, PinataConfig};
pub use error::IpfsError;
