//! Transaction construction via the builder pattern.
//!
//! The builder does not sign; that happens in [`super::signing`]. This keeps
//! construction testable without key material.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::types::TransactionType;
use crate::crypto::canonical::{canonical_json, CanonicalError};

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// A ledger transaction, embedded in exactly one block.
///
/// `signature` is the hex Ed25519 signature of the `from` actor over
/// [`Transaction::signable_bytes`]; empty while unsigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// `tx-<uuid>`.
    pub id: String,

    #[serde(rename = "type")]
    pub tx_type: TransactionType,

    /// Address of the actor that signed the transaction.
    pub from: String,

    /// Counterparty address, for transfers and licences.
    pub to: Option<String>,

    /// Unix milliseconds.
    pub timestamp: u64,

    /// Type-specific payload. For `create`/`update` this is the block content.
    pub data: Value,

    pub signature: String,

    /// Fee in micro-units.
    pub fee: u64,
}

/// Every field except `signature`, borrowed.
#[derive(Serialize)]
struct Signable<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    tx_type: TransactionType,
    from: &'a str,
    to: &'a Option<String>,
    timestamp: u64,
    data: &'a Value,
    fee: u64,
}

impl Transaction {
    /// Canonical JSON of the transaction without its signature. This is
    /// what the `from` actor signs.
    pub fn signable_bytes(&self) -> Result<Vec<u8>, CanonicalError> {
        canonical_json(&Signable {
            id: &self.id,
            tx_type: self.tx_type,
            from: &self.from,
            to: &self.to,
            timestamp: self.timestamp,
            data: &self.data,
            fee: self.fee,
        })
    }

    pub fn is_signed(&self) -> bool {
        !self.signature.is_empty()
    }
}

// ---------------------------------------------------------------------------
// TransactionBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for unsigned [`Transaction`]s.
///
/// ```
/// use attest_protocol::transaction::{TransactionBuilder, TransactionType};
/// use serde_json::json;
///
/// let tx = TransactionBuilder::new(TransactionType::Create)
///     .from("attest1...")
///     .data(json!({ "title": "A", "body": "B" }))
///     .fee(1_000)
///     .build();
/// assert!(tx.id.starts_with("tx-"));
/// assert!(!tx.is_signed());
/// ```
///
/// `id` defaults to a fresh `tx-<uuid>` and `timestamp` to the current UTC
/// time. Both can be overridden.
pub struct TransactionBuilder {
    id: Option<String>,
    tx_type: TransactionType,
    from: String,
    to: Option<String>,
    timestamp: Option<u64>,
    data: Value,
    fee: u64,
}

impl TransactionBuilder {
    pub fn new(tx_type: TransactionType) -> Self {
        Self {
            id: None,
            tx_type,
            from: String::new(),
            to: None,
            timestamp: None,
            data: Value::Null,
            fee: 0,
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn from(mut self, address: impl Into<String>) -> Self {
        self.from = address.into();
        self
    }

    pub fn to(mut self, address: impl Into<String>) -> Self {
        self.to = Some(address.into());
        self
    }

    /// Sets the timestamp explicitly (Unix milliseconds).
    pub fn timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn fee(mut self, fee: u64) -> Self {
        self.fee = fee;
        self
    }

    /// Consumes the builder and produces an unsigned [`Transaction`].
    pub fn build(self) -> Transaction {
        Transaction {
            id: self.id.unwrap_or_else(|| format!("tx-{}", Uuid::new_v4())),
            tx_type: self.tx_type,
            from: self.from,
            to: self.to,
            timestamp: self
                .timestamp
                .unwrap_or_else(|| Utc::now().timestamp_millis() as u64),
            data: self.data,
            signature: String::new(),
            fee: self.fee,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_tx() -> Transaction {
        TransactionBuilder::new(TransactionType::Transfer)
            .id("tx-fixed")
            .from("attest1aaaa")
            .to("attest1bbbb")
            .timestamp(1_700_000_000_000)
            .data(json!({ "content_id": "block-1" }))
            .fee(10)
            .build()
    }

    #[test]
    fn builder_sets_fields() {
        let tx = sample_tx();
        assert_eq!(tx.id, "tx-fixed");
        assert_eq!(tx.tx_type, TransactionType::Transfer);
        assert_eq!(tx.to.as_deref(), Some("attest1bbbb"));
        assert_eq!(tx.fee, 10);
        assert!(!tx.is_signed());
    }

    #[test]
    fn default_id_and_timestamp() {
        let tx = TransactionBuilder::new(TransactionType::Verify).build();
        assert!(tx.id.starts_with("tx-"));
        assert!(tx.timestamp > 0);
        assert_eq!(tx.to, None);
    }

    #[test]
    fn signable_bytes_exclude_signature() {
        let mut tx = sample_tx();
        let before = tx.signable_bytes().unwrap();
        tx.signature = "ab".repeat(64);
        assert_eq!(tx.signable_bytes().unwrap(), before);
    }

    #[test]
    fn signable_bytes_cover_every_other_field() {
        let base = sample_tx().signable_bytes().unwrap();

        let mut tx = sample_tx();
        tx.fee = 11;
        assert_ne!(tx.signable_bytes().unwrap(), base);

        let mut tx = sample_tx();
        tx.data = json!({ "content_id": "block-2" });
        assert_ne!(tx.signable_bytes().unwrap(), base);

        let mut tx = sample_tx();
        tx.to = None;
        assert_ne!(tx.signable_bytes().unwrap(), base);
    }

    #[test]
    fn wire_form_uses_type_key() {
        let v = serde_json::to_value(sample_tx()).unwrap();
        assert_eq!(v["type"], "transfer");
        assert!(v.get("tx_type").is_none());
    }
}
