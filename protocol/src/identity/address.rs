//! # Actor Addresses
//!
//! An Attest address is the Bech32 encoding of an actor's raw Ed25519
//! public key:
//!
//! ```text
//! public_key (32 bytes)
//!     -> Bech32("attest", public_key) -> attest1qw508d6qe...
//! ```
//!
//! Encoding the key itself rather than a digest of it makes every address
//! self-certifying: anyone holding a block, certificate or transfer can
//! recover the verifying key from the `from`/`issuer` field alone, with no
//! key directory to consult.

use bech32::{Bech32, Hrp};
use thiserror::Error;

use crate::config::ADDRESS_HRP;
use crate::crypto::keys::PublicKey;

/// Errors that can occur while parsing an address.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// The string is not valid Bech32 (bad charset, checksum, mixed case).
    #[error("bech32 decode error: {0}")]
    Bech32Decode(String),

    /// The decoded address has an unexpected human-readable prefix.
    #[error("invalid HRP: expected '{expected}', got '{got}'")]
    InvalidHrp {
        /// The expected HRP.
        expected: String,
        /// The HRP that was actually found.
        got: String,
    },

    /// The payload is not a 32-byte Ed25519 point.
    #[error("address payload is not a valid Ed25519 public key")]
    InvalidPublicKey,

    /// Encoding failed. Only reachable if the HRP constant is malformed.
    #[error("bech32 encode error: {0}")]
    Bech32Encode(String),
}

fn hrp() -> Result<Hrp, AddressError> {
    Hrp::parse(ADDRESS_HRP).map_err(|e| AddressError::Bech32Encode(e.to_string()))
}

/// Encode a public key as an `attest1...` address.
pub fn encode_address(public_key: &PublicKey) -> Result<String, AddressError> {
    bech32::encode::<Bech32>(hrp()?, public_key.as_bytes())
        .map_err(|e| AddressError::Bech32Encode(e.to_string()))
}

/// Encode a public key as an address.
///
/// Encoding a 32-byte payload under a constant, valid HRP cannot fail; the
/// empty string is returned in that unreachable case so callers stay total.
pub fn address_from_public_key(public_key: &PublicKey) -> String {
    encode_address(public_key).unwrap_or_default()
}

/// Recover the verifying key from an address.
///
/// # Examples
///
/// ```
/// use attest_protocol::crypto::Keypair;
/// use attest_protocol::identity::{address_from_public_key, public_key_from_address};
///
/// let kp = Keypair::generate();
/// let address = address_from_public_key(&kp.public_key());
/// assert!(address.starts_with("attest1"));
/// assert_eq!(public_key_from_address(&address).unwrap(), kp.public_key());
/// ```
pub fn public_key_from_address(address: &str) -> Result<PublicKey, AddressError> {
    let (decoded_hrp, data) =
        bech32::decode(address).map_err(|e| AddressError::Bech32Decode(e.to_string()))?;

    if decoded_hrp != hrp()? {
        return Err(AddressError::InvalidHrp {
            expected: ADDRESS_HRP.to_string(),
            got: decoded_hrp.to_string(),
        });
    }

    PublicKey::try_from_slice(&data).map_err(|_| AddressError::InvalidPublicKey)
}

/// True when `address` parses as an Attest address.
pub fn is_valid_address(address: &str) -> bool {
    public_key_from_address(address).is_ok()
}
