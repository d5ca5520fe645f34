//! # Cryptographic Primitives for Attest
//!
//! Everything security-related in the ledger flows through here:
//!
//! - **SHA-256** over a canonical JSON encoding for block hashes, Merkle
//!   leaves and proof-of-work.
//! - **Ed25519** for every signature an actor produces.
//!
//! Everything here is a thin, type-safe wrapper around audited
//! implementations (`sha2`, `ed25519-dalek`).

pub mod canonical;
pub mod hash;
pub mod keys;
pub mod signatures;

pub use canonical::{canonical_json, CanonicalError};
pub use hash::{hash_value, merkle_root, sha256, sha256_hex, EMPTY_MERKLE_ROOT};
pub use keys::{KeyError, Keypair, PublicKey, Signature};
pub use signatures::{sign, sign_value, verify, verify_hex, verify_value};
