//! # Hashing Utilities
//!
//! Every digest in Attest is SHA-256, rendered as lower-case hex. Block
//! hashes, transaction leaves, Merkle nodes and proof-of-work targets all
//! flow through this module so there is exactly one definition of "the hash
//! of a value".
//!
//! ## Hashing structured values
//!
//! [`hash_value`] never hashes a struct's in-memory layout or its derived
//! serde output directly. It hashes the [canonical JSON](super::canonical)
//! form, whose object keys are always sorted. Two processes, two builds, or
//! two field orderings of the same record produce the same digest.
//!
//! ## Merkle roots
//!
//! [`merkle_root`] commits an ordered transaction list to a single digest.
//! Leaves are `hash_value(tx)`; parents are `sha256_hex(left ‖ right)` over
//! the concatenated hex strings. Odd levels duplicate their last node. The
//! empty list maps to the empty-string sentinel, which is what the genesis
//! block carries.

use serde::Serialize;
use sha2::{Digest, Sha256};

use super::canonical::{canonical_json, CanonicalError};

/// Length of a hex-encoded SHA-256 digest.
pub const HASH_HEX_LENGTH: usize = 64;

/// Merkle root of an empty transaction list.
pub const EMPTY_MERKLE_ROOT: &str = "";

/// Compute the SHA-256 hash of the input data.
///
/// # Example
///
/// ```
/// use attest_protocol::crypto::sha256;
///
/// let hash = sha256(b"attest");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// SHA-256 as a lower-case hex string. This is the digest format stored in
/// blocks, certificates and transfer records.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Hash any serializable value through its canonical JSON form.
///
/// # Example
///
/// ```
/// use attest_protocol::crypto::hash_value;
/// use serde_json::json;
///
/// let a = hash_value(&json!({ "title": "A", "body": "B" })).unwrap();
/// let b = hash_value(&json!({ "body": "B", "title": "A" })).unwrap();
/// assert_eq!(a, b);
/// ```
pub fn hash_value<T: Serialize + ?Sized>(value: &T) -> Result<String, CanonicalError> {
    Ok(sha256_hex(&canonical_json(value)?))
}

/// Compute the Merkle root of an ordered list of serializable items.
///
/// Returns [`EMPTY_MERKLE_ROOT`] for an empty list. With a single item the
/// root is that item's leaf hash. Order matters: swapping two distinct
/// items changes the root, so transaction order inside a block is part of
/// what the block commits to.
///
/// A parent is `hash_value` of the two child digests concatenated as one
/// string, so it covers the JSON string form (quotes included).
pub fn merkle_root<T: Serialize>(items: &[T]) -> Result<String, CanonicalError> {
    if items.is_empty() {
        return Ok(EMPTY_MERKLE_ROOT.to_string());
    }

    let mut level = items
        .iter()
        .map(hash_value)
        .collect::<Result<Vec<_>, _>>()?;

    while level.len() > 1 {
        let mut next_level = Vec::with_capacity((level.len() + 1) / 2);
        for pair in level.chunks(2) {
            let left = &pair[0];
            // Odd level: the last node is paired with itself.
            let right = pair.get(1).unwrap_or(left);
            next_level.push(hash_value(&format!("{left}{right}"))?);
        }
        level = next_level;
    }

    Ok(level.swap_remove(0))
}
