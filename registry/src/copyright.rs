//! # Copyright Registry
//!
//! One ownership record per piece of ledger content, plus the history of
//! every change of hands:
//!
//! ```text
//! register ──► owner = original_owner
//!                │
//!   transfer ────┤ from = owner, signed by from, strictly later timestamp
//!                ▼
//!              owner = to
//! ```
//!
//! The history is append-only. At any point `owner` equals the `to` of the
//! last transfer, or `original_owner` when nothing has been transferred.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use attest_protocol::config::{DEFAULT_JURISDICTION, DEFAULT_TRANSFER_TERMS, MAX_ROYALTY_BPS};
use attest_protocol::crypto::{canonical_json, verify_hex};
use attest_protocol::identity::{is_valid_address, public_key_from_address, IdentityProvider};
use attest_protocol::ledger::{Ledger, LedgerStore};
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::store::RecordTree;
use crate::{RegistryError, RegistryResult};

const TREE_NAME: &str = "copyrights";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LicenseType {
    AllRightsReserved,
    CreativeCommons,
    PublicDomain,
    /// Requires `license_terms`.
    Custom,
}

impl fmt::Display for LicenseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LicenseType::AllRightsReserved => write!(f, "all-rights-reserved"),
            LicenseType::CreativeCommons => write!(f, "creative-commons"),
            LicenseType::PublicDomain => write!(f, "public-domain"),
            LicenseType::Custom => write!(f, "custom"),
        }
    }
}

/// What a caller supplies to register a copyright.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyrightRegistration {
    pub content_id: String,
    pub owner: String,
    pub license_type: LicenseType,
    /// Two-letter code. Defaults to `KR`.
    #[serde(default)]
    pub jurisdiction: Option<String>,
    #[serde(default)]
    pub license_terms: Option<String>,
    /// Royalty in basis points, at most 10 000.
    #[serde(default)]
    pub royalty_rate_bps: Option<u32>,
}

impl CopyrightRegistration {
    pub fn new(
        content_id: impl Into<String>,
        owner: impl Into<String>,
        license_type: LicenseType,
    ) -> Self {
        Self {
            content_id: content_id.into(),
            owner: owner.into(),
            license_type,
            jurisdiction: None,
            license_terms: None,
            royalty_rate_bps: None,
        }
    }

    pub fn with_terms(mut self, terms: impl Into<String>) -> Self {
        self.license_terms = Some(terms.into());
        self
    }

    pub fn with_jurisdiction(mut self, code: impl Into<String>) -> Self {
        self.jurisdiction = Some(code.into());
        self
    }

    pub fn with_royalty_bps(mut self, bps: u32) -> Self {
        self.royalty_rate_bps = Some(bps);
        self
    }
}

/// One change of ownership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyrightTransfer {
    /// `transfer-<uuid>`.
    pub id: String,
    pub from: String,
    pub to: String,
    pub timestamp: DateTime<Utc>,
    /// Price in micro-units, if the transfer was a sale.
    pub price: Option<u64>,
    pub terms: String,
    /// Hex Ed25519 signature by `from`.
    pub signature: String,
}

/// The signed part of a transfer. Binding the record id stops a transfer
/// signature from being replayed onto another record.
#[derive(Serialize)]
struct TransferPayload<'a> {
    copyright_id: &'a str,
    id: &'a str,
    from: &'a str,
    to: &'a str,
    timestamp: &'a DateTime<Utc>,
    price: Option<u64>,
    terms: &'a str,
}

impl CopyrightTransfer {
    fn payload(&self, copyright_id: &str) -> RegistryResult<Vec<u8>> {
        Ok(canonical_json(&TransferPayload {
            copyright_id,
            id: &self.id,
            from: &self.from,
            to: &self.to,
            timestamp: &self.timestamp,
            price: self.price,
            terms: &self.terms,
        })?)
    }

    fn signature_is_valid(&self, copyright_id: &str) -> bool {
        let Ok(public_key) = public_key_from_address(&self.from) else {
            return false;
        };
        match self.payload(copyright_id) {
            Ok(payload) => verify_hex(&public_key, &payload, &self.signature),
            Err(_) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyrightRecord {
    /// `copyright-<uuid>`.
    pub id: String,
    pub content_id: String,
    pub owner: String,
    pub original_owner: String,
    pub registered_at: DateTime<Utc>,
    pub jurisdiction: String,
    pub license_type: LicenseType,
    pub license_terms: Option<String>,
    pub royalty_rate_bps: Option<u32>,
    pub transfer_history: Vec<CopyrightTransfer>,
}

impl CopyrightRecord {
    /// Owner implied by the history alone.
    pub fn derived_owner(&self) -> &str {
        self.transfer_history
            .last()
            .map(|t| t.to.as_str())
            .unwrap_or(self.original_owner.as_str())
    }

    fn last_event_at(&self) -> DateTime<Utc> {
        self.transfer_history
            .last()
            .map(|t| t.timestamp)
            .unwrap_or(self.registered_at)
    }

    /// Every transfer signed by its `from`, chained from the previous owner,
    /// strictly later than what came before, and `owner` consistent with
    /// the end of the chain.
    pub fn history_is_valid(&self) -> bool {
        let mut owner = self.original_owner.as_str();
        let mut last = self.registered_at;
        for t in &self.transfer_history {
            if t.from != owner || t.timestamp <= last || !t.signature_is_valid(&self.id) {
                return false;
            }
            owner = t.to.as_str();
            last = t.timestamp;
        }
        self.owner == owner
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Records {
    by_id: HashMap<String, CopyrightRecord>,
    by_content: HashMap<String, String>,
}

impl Records {
    fn insert(&mut self, record: CopyrightRecord) {
        self.by_content
            .insert(record.content_id.clone(), record.id.clone());
        self.by_id.insert(record.id.clone(), record);
    }
}

/// Registers and transfers copyrights over a shared [`Ledger`].
pub struct CopyrightRegistry {
    ledger: Arc<Ledger>,
    records: RwLock<Records>,
    writer: Mutex<()>,
    tree: Option<RecordTree>,
}

impl CopyrightRegistry {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self {
            ledger,
            records: RwLock::new(Records::default()),
            writer: Mutex::new(()),
            tree: None,
        }
    }

    /// A registry persisted in the `copyrights` tree of `store`.
    pub fn open(ledger: Arc<Ledger>, store: &LedgerStore) -> RegistryResult<Self> {
        let tree = RecordTree::open(store, TREE_NAME)?;
        let mut records = Records::default();
        for record in tree.load_all::<CopyrightRecord>()? {
            records.insert(record);
        }
        info!(count = records.by_id.len(), "copyrights loaded");

        Ok(Self {
            ledger,
            records: RwLock::new(records),
            writer: Mutex::new(()),
            tree: Some(tree),
        })
    }

    /// Record `registration.owner` as the copyright holder of
    /// `registration.content_id`.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::NotFound`] if the ledger has no such content.
    /// - [`RegistryError::Duplicate`] if the content already has a record.
    /// - [`RegistryError::Validation`] for a bad owner address, jurisdiction,
    ///   royalty, or `custom` licensing without terms.
    pub fn register_copyright(
        &self,
        registration: CopyrightRegistration,
    ) -> RegistryResult<CopyrightRecord> {
        let jurisdiction = validate_registration(&registration)?;
        if !self.ledger.contains(&registration.content_id) {
            return Err(RegistryError::not_found("content", &registration.content_id));
        }

        let _writer = self.writer.lock();
        if self
            .records
            .read()
            .by_content
            .contains_key(&registration.content_id)
        {
            return Err(RegistryError::Duplicate {
                content_id: registration.content_id,
            });
        }

        let record = CopyrightRecord {
            id: format!("copyright-{}", Uuid::new_v4()),
            content_id: registration.content_id,
            owner: registration.owner.clone(),
            original_owner: registration.owner,
            registered_at: Utc::now(),
            jurisdiction,
            license_type: registration.license_type,
            license_terms: registration.license_terms,
            royalty_rate_bps: registration.royalty_rate_bps,
            transfer_history: Vec::new(),
        };

        self.persist(&record)?;
        self.records.write().insert(record.clone());

        info!(
            id = %record.id,
            content_id = %record.content_id,
            owner = %record.owner,
            license = %record.license_type,
            "copyright registered"
        );
        Ok(record)
    }

    /// Transfer ownership of `copyright_id` from `current_owner` to `to`.
    ///
    /// The transfer is signed by `current_owner` and stamped strictly after
    /// the previous event in the record's history. `terms` defaults to the
    /// standard transfer terms.
    pub fn transfer_copyright(
        &self,
        copyright_id: &str,
        current_owner: &dyn IdentityProvider,
        to: &str,
        price: Option<u64>,
        terms: Option<&str>,
    ) -> RegistryResult<CopyrightTransfer> {
        if !is_valid_address(to) {
            return Err(RegistryError::Validation(format!(
                "recipient '{to}' is not a valid address"
            )));
        }

        let _writer = self.writer.lock();
        let mut record = self
            .get_copyright(copyright_id)
            .ok_or_else(|| RegistryError::not_found("copyright", copyright_id))?;

        let caller = current_owner.current_address();
        if caller != record.owner {
            return Err(RegistryError::Unauthorized {
                expected: record.owner,
                actual: caller,
            });
        }
        if to == record.owner {
            return Err(RegistryError::Validation(
                "recipient already owns this copyright".into(),
            ));
        }

        let timestamp = Utc::now().max(record.last_event_at() + Duration::microseconds(1));
        let mut transfer = CopyrightTransfer {
            id: format!("transfer-{}", Uuid::new_v4()),
            from: caller,
            to: to.to_string(),
            timestamp,
            price,
            terms: terms.unwrap_or(DEFAULT_TRANSFER_TERMS).to_string(),
            signature: String::new(),
        };
        transfer.signature = current_owner.sign(&transfer.payload(&record.id)?).to_hex();

        record.transfer_history.push(transfer.clone());
        record.owner = transfer.to.clone();

        self.persist(&record)?;
        self.records.write().insert(record.clone());

        info!(
            id = %record.id,
            transfer = %transfer.id,
            from = %transfer.from,
            to = %transfer.to,
            "copyright transferred"
        );
        Ok(transfer)
    }

    pub fn get_copyright(&self, id: &str) -> Option<CopyrightRecord> {
        self.records.read().by_id.get(id).cloned()
    }

    pub fn copyright_for_content(&self, content_id: &str) -> Option<CopyrightRecord> {
        let records = self.records.read();
        records
            .by_content
            .get(content_id)
            .and_then(|id| records.by_id.get(id))
            .cloned()
    }

    /// False for unknown ids or a history that does not check out.
    pub fn verify_copyright(&self, id: &str) -> bool {
        self.get_copyright(id)
            .is_some_and(|record| record.history_is_valid())
    }

    pub fn len(&self) -> usize {
        self.records.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn persist(&self, record: &CopyrightRecord) -> RegistryResult<()> {
        match &self.tree {
            Some(tree) => tree.put(&record.id, record),
            None => Ok(()),
        }
    }
}

/// Returns the normalized jurisdiction code.
fn validate_registration(reg: &CopyrightRegistration) -> RegistryResult<String> {
    if !is_valid_address(&reg.owner) {
        return Err(RegistryError::Validation(format!(
            "owner '{}' is not a valid address",
            reg.owner
        )));
    }

    let jurisdiction = reg
        .jurisdiction
        .as_deref()
        .map(str::trim)
        .filter(|j| !j.is_empty())
        .unwrap_or(DEFAULT_JURISDICTION);
    if jurisdiction.len() != 2 || !jurisdiction.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(RegistryError::Validation(format!(
            "jurisdiction '{jurisdiction}' is not a two-letter code"
        )));
    }

    if reg.license_type == LicenseType::Custom
        && reg
            .license_terms
            .as_deref()
            .map_or(true, |t| t.trim().is_empty())
    {
        return Err(RegistryError::Validation(
            "custom licensing requires license terms".into(),
        ));
    }

    if let Some(bps) = reg.royalty_rate_bps {
        if bps > MAX_ROYALTY_BPS {
            return Err(RegistryError::Validation(format!(
                "royalty {bps} bps exceeds {MAX_ROYALTY_BPS}"
            )));
        }
    }

    Ok(jurisdiction.to_ascii_uppercase())
}
