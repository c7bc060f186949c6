//! SHA-256 digest helpers for content attestation.
//!
//! These digests audit canonical content and CIDs; they are unrelated to the
//! Keccak-256 hashing of the Merkle tree the chain verifies.

use sha2::{Digest, Sha256};

/// SHA-256 of raw bytes, rendered as lowercase hex without a prefix.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// The `cid_hash` of an invoice: SHA-256 over the CID string's UTF-8 bytes.
pub fn cid_hash(cid: &str) -> String {
    sha256_hex(cid.as_bytes())
}
