//! # anchora-core — Domain Model and Canonical Byte Production
//!
//! Shared vocabulary of the anchoring pipeline: the invoice and batch
//! records, their status state machines, the canonical JSON serializer that
//! feeds digest computation, and the reusable retry policy used by every
//! network-facing crate.
//!
//! ## Canonical bytes
//!
//! All content attestation flows through [`CanonicalBytes`]: the only
//! constructor applies the full canonicalization pipeline (fixed key order,
//! fixed-scale decimal strings, millisecond-precision UTC timestamps) before
//! compact serialization, so a digest can never be computed over bytes that
//! took a different path.
//!
//! ## Two hash functions
//!
//! SHA-256 (this crate) attests canonical content (`immutable_hash`,
//! `cid_hash`). The Keccak-256 tree the EVM contract verifies lives in
//! `anchora-merkle`. The two are never interchangeable.

pub mod canonical;
pub mod digest;
pub mod error;
pub mod model;
pub mod retry;
pub mod status;

pub use canonical::CanonicalBytes;
pub use error::{CanonicalizationError, StateError};
pub use model::{ContactInfo, Invoice, InvoiceBatch, InvoiceLine};
pub use retry::RetryPolicy;
pub use status::{BatchStatus, InvoiceStatus};
