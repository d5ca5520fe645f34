//! # Attest Registries
//!
//! Records that sit on top of the content ledger and reference its blocks
//! by id:
//!
//! - **Certificates**: time-bounded access grants (read, write, license,
//!   distribute, verify) issued and signed by an actor over one piece of
//!   content. Revocation is terminal; expiry is derived from the clock.
//! - **Copyrights**: one ownership record per piece of content, with an
//!   append-only, signed transfer history.
//!
//! ## Design Principles
//!
//! 1. Nothing references content the ledger does not hold.
//! 2. State transitions are explicit enum variants, never boolean flags.
//! 3. Every record is persisted before the call that created it returns.
//! 4. Verification answers `true` or `false` and never errors.

pub mod certificate;
pub mod copyright;
mod store;

use attest_protocol::crypto::CanonicalError;
use attest_protocol::ledger::StoreError;
use thiserror::Error;

pub use certificate::{
    CertificateRegistry, CertificateState, CertificateStatus, DigitalCertificate, Permission,
};
pub use copyright::{
    CopyrightRecord, CopyrightRegistration, CopyrightRegistry, CopyrightTransfer, LicenseType,
};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Caller-supplied data was rejected before any state changed.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The referenced record or ledger content does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// What was looked up: `content`, `certificate` or `copyright`.
        kind: &'static str,
        id: String,
    },

    /// A copyright record already exists for this content.
    #[error("copyright already registered for content {content_id}")]
    Duplicate { content_id: String },

    /// The acting identity is not the record's current owner.
    #[error("unauthorized: owner is {expected}, caller is {actual}")]
    Unauthorized { expected: String, actual: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

impl RegistryError {
    pub(crate) fn not_found(kind: &'static str, id: &str) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

impl From<StoreError> for RegistryError {
    fn from(e: StoreError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<sled::Error> for RegistryError {
    fn from(e: sled::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<bincode::Error> for RegistryError {
    fn from(e: bincode::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<CanonicalError> for RegistryError {
    fn from(e: CanonicalError) -> Self {
        Self::Serialization(e.to_string())
    }
}
