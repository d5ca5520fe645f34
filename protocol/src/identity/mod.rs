//! # Identity Module
//!
//! Every actor in Attest is identified by an Ed25519 keypair. The ledger only
//! ever sees two things derived from it:
//!
//! 1. **Address**: Bech32-encoded public key with the `attest` HRP. This is
//!    what appears in `from`, `issuer`, `owner` and transfer fields.
//! 2. **IdentityProvider**: the signing boundary. Whoever holds the private
//!    key implements it; the core asks it for signatures.
//!
//! Bech32 (not Bech32m) is used because the payload is a raw key, not a
//! witness program.

pub mod address;
pub mod provider;

pub use address::{
    address_from_public_key, encode_address, is_valid_address, public_key_from_address,
    AddressError,
};
pub use provider::{IdentityError, IdentityProvider, LocalIdentity};
