//! # Digital Signatures
//!
//! Ed25519 signing and verification for everything an actor attests to:
//! content transactions, block hashes, certificates and copyright transfers.
//!
//! Structured payloads are always signed in their canonical JSON form
//! ([`sign_value`] / [`verify_value`]), so the signer and the verifier agree
//! on the exact bytes without sharing a struct definition.
//!
//! Verification returns `bool`. Audits never need to know *why* a
//! signature failed, only that it did.

use serde::Serialize;

use super::canonical::{canonical_json, CanonicalError};
use super::keys::{Keypair, PublicKey, Signature};

/// Sign raw message bytes.
///
/// # Example
///
/// ```
/// use attest_protocol::crypto::{sign, verify, Keypair};
///
/// let keypair = Keypair::generate();
/// let signature = sign(&keypair, b"content-id");
/// assert!(verify(&keypair.public_key(), b"content-id", &signature));
/// ```
pub fn sign(keypair: &Keypair, message: &[u8]) -> Signature {
    keypair.sign(message)
}

/// Verify a signature over raw message bytes.
pub fn verify(public_key: &PublicKey, message: &[u8], signature: &Signature) -> bool {
    public_key.verify(message, signature)
}

/// Sign the canonical JSON encoding of `value`.
pub fn sign_value<T: Serialize + ?Sized>(
    keypair: &Keypair,
    value: &T,
) -> Result<Signature, CanonicalError> {
    Ok(keypair.sign(&canonical_json(value)?))
}

/// Verify a signature over the canonical JSON encoding of `value`.
pub fn verify_value<T: Serialize + ?Sized>(
    public_key: &PublicKey,
    value: &T,
    signature: &Signature,
) -> bool {
    match canonical_json(value) {
        Ok(bytes) => public_key.verify(&bytes, signature),
        Err(_) => false,
    }
}

/// Verify a hex-encoded signature, the form stored in ledger records.
pub fn verify_hex(public_key: &PublicKey, message: &[u8], signature_hex: &str) -> bool {
    match Signature::from_hex(signature_hex) {
        Ok(sig) => public_key.verify(message, &sig),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sign_and_verify() {
        let kp = Keypair::generate();
        let sig = sign(&kp, b"hello, world");
        assert!(verify(&kp.public_key(), b"hello, world", &sig));
    }

    #[test]
    fn test_wrong_key_fails() {
        let kp1 = Keypair::generate();
        let kp2 = Keypair::generate();
        let sig = sign(&kp1, b"test message");
        assert!(!verify(&kp2.public_key(), b"test message", &sig));
    }

    #[test]
    fn sign_value_is_field_order_independent() {
        let kp = Keypair::generate();
        let sig = sign_value(&kp, &json!({ "content_id": "c", "permissions": ["read"] })).unwrap();
        assert!(verify_value(
            &kp.public_key(),
            &json!({ "permissions": ["read"], "content_id": "c" }),
            &sig
        ));
    }

    #[test]
    fn verify_value_detects_changes() {
        let kp = Keypair::generate();
        let sig = sign_value(&kp, &json!({ "permissions": ["read"] })).unwrap();
        assert!(!verify_value(
            &kp.public_key(),
            &json!({ "permissions": ["read", "write"] }),
            &sig
        ));
    }

    #[test]
    fn verify_hex_rejects_garbage() {
        let kp = Keypair::generate();
        let sig = sign(&kp, b"m");
        assert!(verify_hex(&kp.public_key(), b"m", &sig.to_hex()));
        assert!(!verify_hex(&kp.public_key(), b"m", "zz"));
        assert!(!verify_hex(&kp.public_key(), b"m", ""));
    }
}
