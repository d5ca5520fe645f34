//! # Block Structure
//!
//! A block commits one piece of registered content to the ledger.
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │  id              block-<uuid> ("genesis" once)   │
//! │  previous_hash   hash of the preceding block     │
//! │  timestamp       Unix ms                          │
//! │  content         {title, body, author, metadata} │
//! │  merkle_root     root over transactions          │
//! │  transactions    [create | update]               │
//! │  difficulty      leading hex zeros required      │
//! │  nonce           proof-of-work solution          │
//! ├──────────────────────────────────────────────────┤
//! │  hash            H(everything above)             │
//! │  signature       creator's Ed25519 over `hash`   │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! `hash` and `signature` are excluded from the hashed body. The signature
//! signs the hash, not the other way around.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::{
    GENESIS_AUTHOR, GENESIS_BODY, GENESIS_DIFFICULTY, GENESIS_HASH, GENESIS_ID,
    GENESIS_TIMESTAMP_MS, GENESIS_TITLE, ORIGINAL_ID_KEY,
};
use crate::crypto::canonical::CanonicalError;
use crate::crypto::hash::{merkle_root, EMPTY_MERKLE_ROOT};
use crate::crypto::signatures::verify_hex;
use crate::identity::public_key_from_address;
use crate::miner::{hash_with_nonce, meets_difficulty};
use crate::transaction::{verify_transaction, Transaction};

// ---------------------------------------------------------------------------
// BlockContent
// ---------------------------------------------------------------------------

/// The registered content a block carries.
///
/// `metadata` is an open JSON map because it is user content. The one key
/// the ledger itself reads, `originalId`, goes through
/// [`original_id`](Self::original_id).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockContent {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl BlockContent {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            author: String::new(),
            metadata: Map::new(),
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Id of the block this content revises, if it is a revision.
    pub fn original_id(&self) -> Option<&str> {
        self.metadata.get(ORIGINAL_ID_KEY).and_then(Value::as_str)
    }
}

// ---------------------------------------------------------------------------
// BlockTemplate
// ---------------------------------------------------------------------------

/// A block before mining: every hashed field except the nonce.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BlockTemplate {
    pub id: String,
    pub previous_hash: String,
    pub timestamp: u64,
    pub content: BlockContent,
    pub merkle_root: String,
    pub transactions: Vec<Transaction>,
    pub difficulty: u32,
}

// ---------------------------------------------------------------------------
// Block
// ---------------------------------------------------------------------------

/// A sealed ledger block. Immutable once appended.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    pub hash: String,
    pub previous_hash: String,
    /// Unix milliseconds.
    pub timestamp: u64,
    pub content: BlockContent,
    /// Hex Ed25519 signature over `hash`. Empty for genesis.
    pub signature: String,
    pub nonce: u64,
    pub difficulty: u32,
    pub merkle_root: String,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// The fixed first block of every ledger.
    ///
    /// Its hash is the all-zero sentinel, not a digest of its contents, so
    /// genesis is recognised by equality with this value.
    pub fn genesis() -> Self {
        let mut metadata = Map::new();
        metadata.insert("type".to_string(), Value::from("genesis"));

        Block {
            id: GENESIS_ID.to_string(),
            hash: GENESIS_HASH.to_string(),
            previous_hash: String::new(),
            timestamp: GENESIS_TIMESTAMP_MS,
            content: BlockContent {
                title: GENESIS_TITLE.to_string(),
                body: GENESIS_BODY.to_string(),
                author: GENESIS_AUTHOR.to_string(),
                metadata,
            },
            signature: String::new(),
            nonce: 0,
            difficulty: GENESIS_DIFFICULTY,
            merkle_root: EMPTY_MERKLE_ROOT.to_string(),
            transactions: Vec::new(),
        }
    }

    /// Combine a mined template with its proof and the creator's signature.
    pub fn seal(template: BlockTemplate, nonce: u64, hash: String, signature: String) -> Self {
        Block {
            id: template.id,
            hash,
            previous_hash: template.previous_hash,
            timestamp: template.timestamp,
            content: template.content,
            signature,
            nonce,
            difficulty: template.difficulty,
            merkle_root: template.merkle_root,
            transactions: template.transactions,
        }
    }

    pub fn is_genesis(&self) -> bool {
        *self == Self::genesis()
    }

    /// The hashed body of this block, without nonce, hash or signature.
    pub fn template(&self) -> BlockTemplate {
        BlockTemplate {
            id: self.id.clone(),
            previous_hash: self.previous_hash.clone(),
            timestamp: self.timestamp,
            content: self.content.clone(),
            merkle_root: self.merkle_root.clone(),
            transactions: self.transactions.clone(),
            difficulty: self.difficulty,
        }
    }

    /// Recompute the hash from the block's current fields.
    pub fn compute_hash(&self) -> Result<String, CanonicalError> {
        hash_with_nonce(&self.template(), self.nonce)
    }

    /// Address of the actor that created the block: the `from` of its
    /// first transaction.
    pub fn creator(&self) -> Option<&str> {
        self.transactions.first().map(|tx| tx.from.as_str())
    }

    /// Checks that need nothing but the block itself: hash, proof-of-work,
    /// Merkle root, transaction signatures and the creator's signature over
    /// the hash. Chain linkage is the ledger's job.
    ///
    /// Genesis passes iff it is exactly the canonical genesis block.
    pub fn verify_intrinsic(&self) -> bool {
        if self.id == GENESIS_ID || self.previous_hash.is_empty() {
            return self.is_genesis();
        }
        self.hash_is_valid()
            && meets_difficulty(&self.hash, self.difficulty)
            && self.merkle_root_is_valid()
            && self.signatures_are_valid()
    }

    fn hash_is_valid(&self) -> bool {
        matches!(self.compute_hash(), Ok(h) if h == self.hash)
    }

    fn merkle_root_is_valid(&self) -> bool {
        matches!(merkle_root(&self.transactions), Ok(root) if root == self.merkle_root)
    }

    fn signatures_are_valid(&self) -> bool {
        let Some(creator) = self.creator() else {
            return false;
        };
        let Ok(public_key) = public_key_from_address(creator) else {
            return false;
        };
        self.transactions.iter().all(verify_transaction)
            && verify_hex(&public_key, self.hash.as_bytes(), &self.signature)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
