//! # Merkle Engine — Sorted-Leaf Keccak-256 Trees
//!
//! Builds the binary tree a batch of invoice CIDs is anchored under and the
//! per-leaf proofs that let a single invoice be verified against the root.
//!
//! ## Construction
//!
//! 1. Leaves (raw CID strings) are sorted lexicographically, so the tree is
//!    independent of insertion order.
//! 2. Each leaf hashes as `Keccak256(utf8(leaf))`.
//! 3. Levels build bottom-up; an odd level duplicates its last node. Each
//!    pair hashes as `Keccak256(min(a,b) || max(a,b))` under unsigned
//!    byte-wise comparison. This is the sorted-pair form OpenZeppelin's
//!    `MerkleProof.verify` expects, which is what the on-chain contract
//!    runs.
//! 4. A proof records the sibling at every level walking up from the leaf.
//!
//! Hashes render as `0x` + lowercase hex. Roots compare case-insensitively
//! in [`verify_proof`].

use std::collections::BTreeMap;

use sha3::{Digest, Keccak256};
use thiserror::Error;

/// Errors from Merkle tree construction and verification.
#[derive(Debug, Error)]
pub enum MerkleError {
    /// A tree needs at least one leaf.
    #[error("cannot build a merkle tree from an empty leaf set")]
    EmptyInput,

    /// A hash string is not 32 bytes of hex.
    #[error("malformed node hash {value:?}: {reason}")]
    MalformedHash {
        /// The offending string.
        value: String,
        /// What was wrong with it.
        reason: String,
    },
}

/// A built tree: root, deterministic leaf ordering, and one proof per leaf.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// `0x`-prefixed root hash.
    pub root: String,
    /// The input leaves in canonical (lexicographic) order.
    pub sorted_leaves: Vec<String>,
    /// Proof per original leaf string; each entry is the bottom-up list of
    /// `0x`-prefixed sibling hashes.
    pub proofs: BTreeMap<String, Vec<String>>,
    /// Number of levels above the leaves; equals every proof's length.
    pub depth: usize,
}

/// Keccak-256 of a leaf's UTF-8 bytes.
pub fn leaf_hash(leaf: &str) -> [u8; 32] {
    keccak(leaf.as_bytes())
}

/// Build the tree for a non-empty set of leaf strings.
///
/// A single leaf yields `root == leaf_hash(leaf)` with an empty proof.
pub fn build_tree(leaves: &[String]) -> Result<MerkleTree, MerkleError> {
    if leaves.is_empty() {
        return Err(MerkleError::EmptyInput);
    }

    let mut sorted_leaves = leaves.to_vec();
    sorted_leaves.sort();

    // Levels below the root, each padded to even length by duplicating its
    // last node; the duplicate also appears in the lone node's proof.
    let mut padded_levels: Vec<Vec<[u8; 32]>> = Vec::new();
    let mut current: Vec<[u8; 32]> = sorted_leaves.iter().map(|l| leaf_hash(l)).collect();
    while current.len() > 1 {
        if current.len() % 2 == 1 {
            current.push(current[current.len() - 1]);
        }
        padded_levels.push(current.clone());
        current = current.chunks(2).map(|pair| pair_hash(pair[0], pair[1])).collect();
    }

    let root = to_hex(&current[0]);
    let depth = padded_levels.len();

    let mut proofs = BTreeMap::new();
    for (leaf_index, leaf) in sorted_leaves.iter().enumerate() {
        let mut proof = Vec::with_capacity(depth);
        let mut index = leaf_index;
        for level in &padded_levels {
            let sibling = index ^ 1;
            if sibling < level.len() {
                proof.push(to_hex(&level[sibling]));
            }
            index /= 2;
        }
        proofs.insert(leaf.clone(), proof);
    }

    Ok(MerkleTree {
        root,
        sorted_leaves,
        proofs,
        depth,
    })
}

/// Recompute the root from `leaf` and `proof` and compare against `root`
/// (case-insensitive, `0x` prefix optional on both sides).
///
/// Malformed proof elements verify as `false` rather than erroring: a proof
/// that cannot be decoded cannot demonstrate inclusion.
pub fn verify_proof(leaf: &str, proof: &[String], root: &str) -> bool {
    let mut node = leaf_hash(leaf);
    for element in proof {
        let Ok(sibling) = from_hex(element) else {
            return false;
        };
        node = pair_hash(node, sibling);
    }
    strip_prefix(&to_hex(&node)).eq_ignore_ascii_case(strip_prefix(root))
}

fn keccak(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(bytes);
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Hash a pair with the smaller value first (unsigned byte-wise order).
fn pair_hash(a: [u8; 32], b: [u8; 32]) -> [u8; 32] {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut input = [0u8; 64];
    input[..32].copy_from_slice(&lo);
    input[32..].copy_from_slice(&hi);
    keccak(&input)
}

fn to_hex(hash: &[u8; 32]) -> String {
    format!("0x{}", hex::encode(hash))
}

fn from_hex(value: &str) -> Result<[u8; 32], MerkleError> {
    let stripped = strip_prefix(value);
    let bytes = hex::decode(stripped).map_err(|e| MerkleError::MalformedHash {
        value: value.to_string(),
        reason: e.to_string(),
    })?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| MerkleError::MalformedHash {
            value: value.to_string(),
            reason: format!("expected 32 bytes, got {len}"),
        })
}

fn strip_prefix(value: &str) -> &str {
    value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")).unwrap_or(value)
}
