//! # anchora-chain — EVM Anchor Contract Client
//!
//! JSON-RPC client for the invoice anchoring contract. Sends
//! `anchorBatch` transactions, reads receipts and block heights to count
//! confirmations, runs the read-only `verifyInvoiceByCID` check, and
//! fetches anchored batch metadata.
//!
//! ## Signing
//!
//! Transactions are signed with a locally-held private key bound to the
//! configured chain id. Without a key the client still serves every read
//! path; state-changing operations fail with [`ChainError::NoSigner`].
//!
//! ## Send discipline
//!
//! Gas estimation and price reads run under the shared backoff policy, but
//! a transaction is sent exactly once per claimed batch: a failed send
//! becomes a failed batch, never a re-signed duplicate.

pub mod client;
pub mod error;

pub use client::{confirmation_depth, AnchoredBatch, ChainClient, ChainClientConfig, TxReceipt};
pub use error::ChainError;
