//! # Certificate Registry
//!
//! Access certificates grant an owner a set of permissions over one piece of
//! ledger content. The lifecycle is:
//!
//! 1. **Issue**: the issuer signs `{content_id, permissions}`; status is
//!    `active`, with an optional expiry.
//! 2. **Verify**: active, unexpired and correctly signed.
//! 3. **Revoke**: `active` becomes `revoked`. Terminal.
//!
//! "Expired" is never stored. It is derived from the clock at the moment of
//! the question, see [`CertificateState`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use attest_protocol::crypto::canonical_json;
use attest_protocol::crypto::verify_hex;
use attest_protocol::identity::{is_valid_address, public_key_from_address, IdentityProvider};
use attest_protocol::ledger::{Ledger, LedgerStore};
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::store::RecordTree;
use crate::{RegistryError, RegistryResult};

const TREE_NAME: &str = "certificates";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// What a certificate allows its owner to do with the content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Read,
    Write,
    License,
    Distribute,
    Verify,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Permission::Read => "read",
            Permission::Write => "write",
            Permission::License => "license",
            Permission::Distribute => "distribute",
            Permission::Verify => "verify",
        })
    }
}

/// The stored status. Only one transition exists: `Active` to `Revoked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificateStatus {
    Active,
    Revoked,
}

impl fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CertificateStatus::Active => write!(f, "active"),
            CertificateStatus::Revoked => write!(f, "revoked"),
        }
    }
}

/// Status as seen at a particular instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificateState {
    Active,
    Expired,
    Revoked,
}

impl CertificateState {
    /// Revocation wins over expiry.
    pub fn derive(
        status: CertificateStatus,
        expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        match status {
            CertificateStatus::Revoked => CertificateState::Revoked,
            CertificateStatus::Active => match expires_at {
                Some(exp) if now > exp => CertificateState::Expired,
                _ => CertificateState::Active,
            },
        }
    }
}

/// A signed access grant over ledger content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigitalCertificate {
    /// `cert-<uuid>`.
    pub id: String,
    pub content_id: String,
    /// Address of the signing actor.
    pub issuer: String,
    /// Address of the grantee.
    pub owner: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub permissions: Vec<Permission>,
    /// Hex Ed25519 signature by `issuer` over the canonical grant.
    pub signature: String,
    pub status: CertificateStatus,
}

/// The signed part of a certificate.
#[derive(Serialize)]
struct Grant<'a> {
    content_id: &'a str,
    permissions: &'a [Permission],
}

impl DigitalCertificate {
    pub fn state_at(&self, now: DateTime<Utc>) -> CertificateState {
        CertificateState::derive(self.status, self.expires_at, now)
    }

    /// Whether `signature` is the issuer's over `{content_id, permissions}`.
    pub fn signature_is_valid(&self) -> bool {
        let Ok(public_key) = public_key_from_address(&self.issuer) else {
            return false;
        };
        let Ok(payload) = canonical_json(&Grant {
            content_id: &self.content_id,
            permissions: &self.permissions,
        }) else {
            return false;
        };
        verify_hex(&public_key, &payload, &self.signature)
    }

    pub fn grants(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Issues, verifies and revokes certificates over a shared [`Ledger`].
pub struct CertificateRegistry {
    ledger: Arc<Ledger>,
    certificates: RwLock<HashMap<String, DigitalCertificate>>,
    writer: Mutex<()>,
    tree: Option<RecordTree>,
}

impl CertificateRegistry {
    /// An in-memory registry.
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self {
            ledger,
            certificates: RwLock::new(HashMap::new()),
            writer: Mutex::new(()),
            tree: None,
        }
    }

    /// A registry persisted in the `certificates` tree of `store`, loading
    /// whatever is already there.
    pub fn open(ledger: Arc<Ledger>, store: &LedgerStore) -> RegistryResult<Self> {
        let tree = RecordTree::open(store, TREE_NAME)?;
        let loaded: Vec<DigitalCertificate> = tree.load_all()?;
        info!(count = loaded.len(), "certificates loaded");

        Ok(Self {
            ledger,
            certificates: RwLock::new(loaded.into_iter().map(|c| (c.id.clone(), c)).collect()),
            writer: Mutex::new(()),
            tree: Some(tree),
        })
    }

    /// Issue a certificate over `content_id`.
    ///
    /// `ttl` may be negative, producing a certificate that is already
    /// expired. `None` means it never expires.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::NotFound`] if the ledger has no such content.
    /// - [`RegistryError::Validation`] for an empty or repeated permission
    ///   list, or an owner that is not a valid address.
    pub fn issue_certificate(
        &self,
        content_id: &str,
        permissions: Vec<Permission>,
        issuer: &dyn IdentityProvider,
        owner: &str,
        ttl: Option<Duration>,
    ) -> RegistryResult<DigitalCertificate> {
        validate_permissions(&permissions)?;
        if !is_valid_address(owner) {
            return Err(RegistryError::Validation(format!(
                "owner '{owner}' is not a valid address"
            )));
        }
        if !self.ledger.contains(content_id) {
            return Err(RegistryError::not_found("content", content_id));
        }

        let payload = canonical_json(&Grant {
            content_id,
            permissions: &permissions,
        })?;
        let issued_at = Utc::now();
        let expires_at = match ttl {
            Some(ttl) => Some(issued_at.checked_add_signed(ttl).ok_or_else(|| {
                RegistryError::Validation("ttl is out of range".into())
            })?),
            None => None,
        };

        let cert = DigitalCertificate {
            id: format!("cert-{}", Uuid::new_v4()),
            content_id: content_id.to_string(),
            issuer: issuer.current_address(),
            owner: owner.to_string(),
            issued_at,
            expires_at,
            permissions,
            signature: issuer.sign(&payload).to_hex(),
            status: CertificateStatus::Active,
        };

        let _writer = self.writer.lock();
        self.persist(&cert)?;
        self.certificates.write().insert(cert.id.clone(), cert.clone());

        info!(
            id = %cert.id,
            content_id = %cert.content_id,
            owner = %cert.owner,
            expires_at = ?cert.expires_at,
            "certificate issued"
        );
        Ok(cert)
    }

    /// True only for an active, unexpired certificate with a valid issuer
    /// signature. Unknown ids are simply false.
    pub fn verify_certificate(&self, id: &str) -> bool {
        self.verify_certificate_at(id, Utc::now())
    }

    pub fn verify_certificate_at(&self, id: &str, now: DateTime<Utc>) -> bool {
        match self.get_certificate(id) {
            Some(cert) => {
                cert.state_at(now) == CertificateState::Active && cert.signature_is_valid()
            }
            None => false,
        }
    }

    /// Move an active certificate to `revoked`.
    ///
    /// Revoking a certificate that is already revoked or already expired
    /// changes nothing and succeeds. Returns the certificate as stored and
    /// whether this call performed the transition.
    pub fn revoke_certificate(&self, id: &str) -> RegistryResult<(DigitalCertificate, bool)> {
        let _writer = self.writer.lock();
        let mut cert = self
            .get_certificate(id)
            .ok_or_else(|| RegistryError::not_found("certificate", id))?;

        if cert.state_at(Utc::now()) != CertificateState::Active {
            return Ok((cert, false));
        }

        cert.status = CertificateStatus::Revoked;
        self.persist(&cert)?;
        self.certificates.write().insert(cert.id.clone(), cert.clone());

        info!(id = %cert.id, content_id = %cert.content_id, "certificate revoked");
        Ok((cert, true))
    }

    pub fn get_certificate(&self, id: &str) -> Option<DigitalCertificate> {
        self.certificates.read().get(id).cloned()
    }

    /// Every certificate over `content_id`, oldest first.
    pub fn certificates_for_content(&self, content_id: &str) -> Vec<DigitalCertificate> {
        let mut certs: Vec<DigitalCertificate> = self
            .certificates
            .read()
            .values()
            .filter(|c| c.content_id == content_id)
            .cloned()
            .collect();
        certs.sort_by(|a, b| a.issued_at.cmp(&b.issued_at).then_with(|| a.id.cmp(&b.id)));
        certs
    }

    /// Derived status at `now`, or `None` for unknown ids.
    pub fn status_of(&self, id: &str, now: DateTime<Utc>) -> Option<CertificateState> {
        self.get_certificate(id).map(|c| c.state_at(now))
    }

    pub fn len(&self) -> usize {
        self.certificates.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn persist(&self, cert: &DigitalCertificate) -> RegistryResult<()> {
        match &self.tree {
            Some(tree) => tree.put(&cert.id, cert),
            None => Ok(()),
        }
    }
}

fn validate_permissions(permissions: &[Permission]) -> RegistryResult<()> {
    if permissions.is_empty() {
        return Err(RegistryError::Validation(
            "at least one permission is required".into(),
        ));
    }
    let mut seen = permissions.to_vec();
    seen.sort_unstable();
    seen.dedup();
    if seen.len() != permissions.len() {
        return Err(RegistryError::Validation(
            "permissions must not repeat".into(),
        ));
    }
    Ok(())
}
