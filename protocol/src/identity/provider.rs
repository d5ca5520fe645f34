//! The signing boundary between the ledger and whoever holds actor keys.
//!
//! The ledger and registries never touch private key material directly.
//! They ask an [`IdentityProvider`] for an address and a signature, which
//! lets a wallet, an HSM bridge or a test fixture stand in for the actor.

use std::fmt;
use std::fs;
use std::path::Path;

use crate::crypto::keys::{KeyError, Keypair, PublicKey, Signature};

use super::address::address_from_public_key;

/// Supplies an actor's address and signing capability.
///
/// Implementations must be consistent: `current_address()` must be the
/// address of `public_key()`, and `sign` must produce signatures that
/// verify under that key. Records signed by an inconsistent provider fail
/// verification.
pub trait IdentityProvider: Send + Sync {
    /// The actor's `attest1...` address.
    fn current_address(&self) -> String;

    /// The actor's verifying key.
    fn public_key(&self) -> PublicKey;

    /// Sign `payload` with the actor's private key.
    fn sign(&self, payload: &[u8]) -> Signature;
}

/// An in-process identity backed by an Ed25519 keypair.
#[derive(Clone)]
pub struct LocalIdentity {
    keypair: Keypair,
    address: String,
}

impl LocalIdentity {
    pub fn new(keypair: Keypair) -> Self {
        let address = address_from_public_key(&keypair.public_key());
        Self { keypair, address }
    }

    /// A fresh random identity.
    pub fn generate() -> Self {
        Self::new(Keypair::generate())
    }

    /// Load the hex secret key written by `attest-node init`.
    pub fn from_key_file(path: impl AsRef<Path>) -> Result<Self, IdentityError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| IdentityError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(Keypair::from_hex(&contents)?))
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }
}

impl IdentityProvider for LocalIdentity {
    fn current_address(&self) -> String {
        self.address.clone()
    }

    fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    fn sign(&self, payload: &[u8]) -> Signature {
        self.keypair.sign(payload)
    }
}

impl fmt::Debug for LocalIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LocalIdentity({})", self.address)
    }
}

/// Failure to load an identity from disk.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("failed to read key file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error(transparent)]
    Key(#[from] KeyError),
}
