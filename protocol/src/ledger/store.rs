//! # LedgerStore: Persistent Storage
//!
//! sled-backed durability for the ledger and its registries.
//!
//! | Tree        | Key              | Value          |
//! |-------------|------------------|----------------|
//! | `blocks`    | `height` (8B BE) | `json(Block)`  |
//! | `block_ids` | block id (UTF-8) | `height` (8B BE) |
//! | `metadata`  | key (UTF-8)      | value (bytes)  |
//!
//! Heights are big-endian so sled's lexicographic order is chain order.
//! Blocks are stored as JSON because content metadata and transaction data
//! are free-form JSON values, which bincode cannot round-trip.
//!
//! Registries open their own trees through [`LedgerStore::open_tree`].
//!
//! A block and its index entries are written in one transaction across the
//! three trees, then flushed: a block that `put_block` acknowledged survives
//! a crash, and a failed write leaves nothing behind. Loading stops at the
//! recorded tip, so a block is only visible once its tip entry is.

use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};
use std::path::Path;

use super::block::Block;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("corrupt store: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Key in `metadata` holding the tip height.
const META_TIP_HEIGHT: &[u8] = b"tip_height";

// ---------------------------------------------------------------------------
// LedgerStore
// ---------------------------------------------------------------------------

/// Cheap to clone; clones share the same database.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    db: Db,
    blocks: Tree,
    block_ids: Tree,
    metadata: Tree,
}

impl LedgerStore {
    /// Open or create a store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// An in-memory store removed on drop. For tests.
    pub fn open_temporary() -> StoreResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> StoreResult<Self> {
        Ok(Self {
            blocks: db.open_tree("blocks")?,
            block_ids: db.open_tree("block_ids")?,
            metadata: db.open_tree("metadata")?,
            db,
        })
    }

    /// Open (or create) a named tree in the same database.
    pub fn open_tree(&self, name: &str) -> StoreResult<Tree> {
        Ok(self.db.open_tree(name)?)
    }

    // -- Blocks -------------------------------------------------------------

    /// Persist `block` at `height` as the new tip and flush.
    pub fn put_block(&self, height: u64, block: &Block) -> StoreResult<()> {
        let key = height.to_be_bytes();
        let bytes =
            serde_json::to_vec(block).map_err(|e| StoreError::Serialization(e.to_string()))?;

        (&self.blocks, &self.block_ids, &self.metadata)
            .transaction(|(blocks, block_ids, metadata)| {
                blocks.insert(&key[..], bytes.as_slice())?;
                block_ids.insert(block.id.as_bytes(), &key[..])?;
                metadata.insert(META_TIP_HEIGHT, &key[..])?;
                Ok::<_, ConflictableTransactionError<StoreError>>(())
            })
            .map_err(|e| match e {
                TransactionError::Abort(e) => e,
                TransactionError::Storage(e) => StoreError::Sled(e),
            })?;
        self.db.flush()?;
        Ok(())
    }

    pub fn get_block(&self, height: u64) -> StoreResult<Option<Block>> {
        match self.blocks.get(height.to_be_bytes())? {
            Some(bytes) => Ok(Some(decode_block(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn get_block_by_id(&self, id: &str) -> StoreResult<Option<Block>> {
        match self.block_ids.get(id.as_bytes())? {
            Some(height_bytes) => self.get_block(decode_height(&height_bytes)?),
            None => Ok(None),
        }
    }

    /// Every stored block up to the recorded tip, in height order.
    pub fn load_blocks(&self) -> StoreResult<Vec<Block>> {
        let Some(tip) = self.tip_height()? else {
            return Ok(Vec::new());
        };
        let mut blocks = Vec::new();
        for entry in self.blocks.range(..=tip.to_be_bytes()) {
            let (_key, value) = entry?;
            blocks.push(decode_block(&value)?);
        }
        Ok(blocks)
    }

    pub fn tip_height(&self) -> StoreResult<Option<u64>> {
        match self.metadata.get(META_TIP_HEIGHT)? {
            Some(bytes) => Ok(Some(decode_height(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Raw access for integrity tooling and tests that simulate on-disk
    /// corruption.
    pub fn overwrite_raw_block(&self, height: u64, bytes: Vec<u8>) -> StoreResult<()> {
        self.blocks.insert(height.to_be_bytes(), bytes)?;
        self.db.flush()?;
        Ok(())
    }

    pub fn raw_block(&self, height: u64) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.blocks.get(height.to_be_bytes())?.map(|v| v.to_vec()))
    }

    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

fn decode_block(bytes: &[u8]) -> StoreResult<Block> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode_height(bytes: &[u8]) -> StoreResult<u64> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StoreError::Corrupt("invalid height bytes".to_string()))?;
    Ok(u64::from_be_bytes(arr))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
