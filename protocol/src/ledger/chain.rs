//! The ledger: an append-only, hash-linked chain of mined blocks with a
//! single writer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use super::block::{Block, BlockContent, BlockTemplate};
use super::store::LedgerStore;
use crate::config::{LedgerConfig, CREATE_TX_FEE, MAX_TITLE_LENGTH, ORIGINAL_ID_KEY};
use crate::crypto::canonical::canonical_json;
use crate::crypto::hash::merkle_root;
use crate::error::{LedgerError, LedgerResult};
use crate::identity::IdentityProvider;
use crate::miner::mine_with_timeout;
use crate::transaction::{sign_transaction, TransactionBuilder, TransactionType};

// ---------------------------------------------------------------------------
// Chain state
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ChainState {
    blocks: Vec<Arc<Block>>,
    by_id: HashMap<String, usize>,
}

impl ChainState {
    fn from_blocks(blocks: Vec<Block>) -> Self {
        let mut state = Self::default();
        for block in blocks {
            state.push(Arc::new(block));
        }
        state
    }

    fn push(&mut self, block: Arc<Block>) {
        self.by_id.insert(block.id.clone(), self.blocks.len());
        self.blocks.push(block);
    }
}

// ---------------------------------------------------------------------------
// Chain report
// ---------------------------------------------------------------------------

/// Why a block failed the chain audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// Position 0 is not the canonical genesis block.
    NotGenesis,
    /// Hash, proof-of-work, Merkle root or signature check failed.
    Integrity,
    /// `previous_hash` does not match the block before it.
    BrokenLink,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockFault {
    pub height: usize,
    pub id: String,
    pub kind: FaultKind,
}

/// Result of auditing every block in the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainReport {
    pub valid: bool,
    pub length: usize,
    pub tip_hash: String,
    pub faults: Vec<BlockFault>,
}

impl ChainReport {
    /// The lowest-height fault, where the damage starts.
    pub fn first_fault(&self) -> Option<&BlockFault> {
        self.faults.first()
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Tamper-evident content ledger.
///
/// Appends are serialized by an async writer lock held across mining, so
/// the chain is strictly linear. Reads snapshot the chain under a short
/// read lock and never wait for mining.
pub struct Ledger {
    config: LedgerConfig,
    state: RwLock<ChainState>,
    writer: Mutex<()>,
    store: Option<LedgerStore>,
}

impl Ledger {
    /// An in-memory ledger holding only genesis.
    pub fn new(config: LedgerConfig) -> LedgerResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: RwLock::new(ChainState::from_blocks(vec![Block::genesis()])),
            writer: Mutex::new(()),
            store: None,
        })
    }

    /// Load the chain persisted in `store`, writing genesis into an empty
    /// store.
    ///
    /// A stored chain that fails verification is still opened, with a
    /// warning, so that audits can report the damage.
    pub fn open(store: LedgerStore, config: LedgerConfig) -> LedgerResult<Self> {
        config.validate()?;

        let mut blocks = store.load_blocks()?;
        if blocks.is_empty() {
            let genesis = Block::genesis();
            store.put_block(0, &genesis)?;
            blocks.push(genesis);
        }

        let ledger = Self {
            config,
            state: RwLock::new(ChainState::from_blocks(blocks)),
            writer: Mutex::new(()),
            store: Some(store),
        };

        let report = ledger.chain_report();
        if report.valid {
            info!(length = report.length, tip = %report.tip_hash, "ledger loaded");
        } else {
            warn!(
                length = report.length,
                faults = report.faults.len(),
                first_fault = ?report.first_fault(),
                "stored chain failed verification"
            );
        }
        Ok(ledger)
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn store(&self) -> Option<&LedgerStore> {
        self.store.as_ref()
    }

    // -- Writes -------------------------------------------------------------

    /// Register `content` as a new block created by `actor`.
    ///
    /// Fails with `Validation` for empty or oversized content and with
    /// `MiningTimeout` when no nonce is found in time. On any failure the
    /// chain is unchanged. Dropping the returned future stops mining and
    /// appends nothing.
    pub async fn create_block(
        &self,
        content: BlockContent,
        actor: &dyn IdentityProvider,
    ) -> LedgerResult<Block> {
        self.append(content, actor, TransactionType::Create).await
    }

    /// Register a revision of `original_id`. The new block's metadata
    /// carries `originalId`, so [`get_history`](Self::get_history) on the
    /// original returns both.
    pub async fn create_revision(
        &self,
        original_id: &str,
        mut content: BlockContent,
        actor: &dyn IdentityProvider,
    ) -> LedgerResult<Block> {
        if !self.contains(original_id) {
            return Err(LedgerError::NotFound(format!("block {original_id}")));
        }
        content
            .metadata
            .insert(ORIGINAL_ID_KEY.to_string(), Value::from(original_id));
        self.append(content, actor, TransactionType::Update).await
    }

    async fn append(
        &self,
        mut content: BlockContent,
        actor: &dyn IdentityProvider,
        tx_type: TransactionType,
    ) -> LedgerResult<Block> {
        if content.author.trim().is_empty() {
            content.author = actor.current_address();
        }
        self.validate_content(&content)?;

        let _writer = self.writer.lock().await;
        let tip = self.tip_arc();

        let mut tx = TransactionBuilder::new(tx_type)
            .data(serde_json::to_value(&content).map_err(|e| {
                LedgerError::Serialization(e.to_string())
            })?)
            .fee(CREATE_TX_FEE)
            .build();
        sign_transaction(&mut tx, actor)?;
        let transactions = vec![tx];

        let template = BlockTemplate {
            id: format!("block-{}", Uuid::new_v4()),
            previous_hash: tip.hash.clone(),
            timestamp: (Utc::now().timestamp_millis() as u64).max(tip.timestamp),
            content,
            merkle_root: merkle_root(&transactions)?,
            transactions,
            difficulty: self.config.difficulty,
        };

        let started = Instant::now();
        let proof = mine_with_timeout(&template, self.config.difficulty, self.config.mining_timeout)
            .await
            .map_err(|e| {
                warn!(id = %template.id, error = %e, "mining failed");
                LedgerError::from(e)
            })?;

        let signature = actor.sign(proof.hash.as_bytes()).to_hex();
        let block = Block::seal(template, proof.nonce, proof.hash, signature);

        if !block.verify_intrinsic() {
            return Err(LedgerError::Validation(
                "identity provider signature does not match its address".into(),
            ));
        }

        let height = self.len() as u64;
        if let Some(store) = &self.store {
            store.put_block(height, &block)?;
        }
        self.state.write().push(Arc::new(block.clone()));

        info!(
            id = %block.id,
            height,
            hash = %block.hash,
            nonce = block.nonce,
            attempts = proof.attempts,
            mining_ms = started.elapsed().as_millis() as u64,
            "block appended"
        );
        Ok(block)
    }

    fn validate_content(&self, content: &BlockContent) -> LedgerResult<()> {
        if content.title.trim().is_empty() {
            return Err(LedgerError::Validation("title must not be empty".into()));
        }
        if content.title.chars().count() > MAX_TITLE_LENGTH {
            return Err(LedgerError::Validation(format!(
                "title exceeds {MAX_TITLE_LENGTH} characters"
            )));
        }
        if content.body.trim().is_empty() {
            return Err(LedgerError::Validation("body must not be empty".into()));
        }
        let size = canonical_json(content)?.len();
        if size > self.config.max_content_bytes {
            return Err(LedgerError::Validation(format!(
                "content is {size} bytes, limit is {}",
                self.config.max_content_bytes
            )));
        }
        Ok(())
    }

    // -- Verification -------------------------------------------------------

    /// Full check of a single block against this chain. Never errors.
    pub fn verify_block(&self, block: &Block) -> bool {
        if block.is_genesis() {
            return true;
        }
        if !block.verify_intrinsic() {
            return false;
        }
        let snapshot = self.snapshot();
        snapshot.iter().any(|b| b.hash == block.previous_hash)
    }

    /// Every block verifies, the chain starts at genesis, and each block
    /// links to the one before it by position.
    pub fn verify_chain(&self) -> bool {
        self.chain_report().valid
    }

    /// Audit the whole chain, collecting every fault instead of stopping at
    /// the first.
    pub fn chain_report(&self) -> ChainReport {
        let snapshot = self.snapshot();
        let mut faults = Vec::new();

        for (height, block) in snapshot.iter().enumerate() {
            let fault = |kind| BlockFault {
                height,
                id: block.id.clone(),
                kind,
            };
            if height == 0 {
                if !block.is_genesis() {
                    faults.push(fault(FaultKind::NotGenesis));
                }
                continue;
            }
            if !block.verify_intrinsic() {
                faults.push(fault(FaultKind::Integrity));
            } else if block.previous_hash != snapshot[height - 1].hash {
                faults.push(fault(FaultKind::BrokenLink));
            }
        }

        ChainReport {
            valid: faults.is_empty() && !snapshot.is_empty(),
            length: snapshot.len(),
            tip_hash: snapshot.last().map(|b| b.hash.clone()).unwrap_or_default(),
            faults,
        }
    }

    /// False for unknown ids, otherwise [`verify_block`](Self::verify_block).
    pub fn verify_content(&self, content_id: &str) -> bool {
        match self.get_arc(content_id) {
            Some(block) => self.verify_block(&block),
            None => false,
        }
    }

    // -- Reads --------------------------------------------------------------

    /// The block and all of its revisions, oldest first.
    pub fn get_history(&self, content_id: &str) -> Vec<Block> {
        let mut history: Vec<Block> = self
            .snapshot()
            .iter()
            .filter(|b| b.id == content_id || b.content.original_id() == Some(content_id))
            .map(|b| Block::clone(b))
            .collect();
        history.sort_by_key(|b| b.timestamp);
        history
    }

    pub fn get_block(&self, id: &str) -> Option<Block> {
        self.get_arc(id).map(|b| Block::clone(&b))
    }

    /// Position of block `id` in the chain; genesis is 0.
    pub fn height_of(&self, id: &str) -> Option<usize> {
        self.state.read().by_id.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state.read().by_id.contains_key(id)
    }

    pub fn tip(&self) -> Block {
        Block::clone(&self.tip_arc())
    }

    pub fn len(&self) -> usize {
        self.state.read().blocks.len()
    }

    /// Never true: a ledger always holds genesis.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A copy of every block in chain order.
    pub fn blocks(&self) -> Vec<Block> {
        self.snapshot().iter().map(|b| Block::clone(b)).collect()
    }

    fn snapshot(&self) -> Vec<Arc<Block>> {
        self.state.read().blocks.clone()
    }

    fn get_arc(&self, id: &str) -> Option<Arc<Block>> {
        let state = self.state.read();
        state.by_id.get(id).map(|&i| Arc::clone(&state.blocks[i]))
    }

    fn tip_arc(&self) -> Arc<Block> {
        let state = self.state.read();
        match state.blocks.last() {
            Some(b) => Arc::clone(b),
            None => Arc::new(Block::genesis()),
        }
    }
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("config", &self.config)
            .field("length", &self.len())
            .field("persistent", &self.store.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GENESIS_HASH;
    use crate::identity::LocalIdentity;
    use std::time::Duration;

    fn ledger() -> Ledger {
        Ledger::new(LedgerConfig::with_difficulty(1)).unwrap()
    }

    fn content(title: &str) -> BlockContent {
        BlockContent::new(title, "body text")
    }

    /// Replace the block at `height` in memory, bypassing every check.
    fn tamper(ledger: &Ledger, height: usize, f: impl FnOnce(&mut Block)) {
        let mut state = ledger.state.write();
        let mut block = Block::clone(&state.blocks[height]);
        f(&mut block);
        state.blocks[height] = Arc::new(block);
    }

    #[test]
    fn new_ledger_holds_genesis() {
        let l = ledger();
        assert_eq!(l.len(), 1);
        assert!(l.tip().is_genesis());
        assert!(l.verify_chain());
        assert!(l.verify_content("genesis"));
    }

    #[test]
    fn invalid_config_rejected() {
        assert!(Ledger::new(LedgerConfig::with_difficulty(65)).is_err());
    }

    #[tokio::test]
    async fn create_block_links_to_genesis() {
        let l = ledger();
        let actor = LocalIdentity::generate();
        let block = l.create_block(content("A"), &actor).await.unwrap();

        assert_eq!(block.previous_hash, GENESIS_HASH);
        assert!(block.id.starts_with("block-"));
        assert!(block.hash.starts_with('0'));
        assert_eq!(block.transactions.len(), 1);
        assert_eq!(block.transactions[0].tx_type, TransactionType::Create);
        assert_eq!(block.transactions[0].fee, CREATE_TX_FEE);
        assert!(l.verify_content(&block.id));
        assert!(l.verify_chain());
        assert_eq!(l.len(), 2);
    }

    #[tokio::test]
    async fn blank_author_defaults_to_actor() {
        let l = ledger();
        let actor = LocalIdentity::generate();
        let block = l.create_block(content("A"), &actor).await.unwrap();
        assert_eq!(block.content.author, actor.current_address());

        let named = l
            .create_block(content("B").with_author("Jane"), &actor)
            .await
            .unwrap();
        assert_eq!(named.content.author, "Jane");
    }

    #[tokio::test]
    async fn empty_content_rejected_without_appending() {
        let l = ledger();
        let actor = LocalIdentity::generate();
        let err = l
            .create_block(BlockContent::new("  ", "body"), &actor)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        let err = l
            .create_block(BlockContent::new("title", ""), &actor)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert_eq!(l.len(), 1);
    }

    #[tokio::test]
    async fn oversized_content_rejected() {
        let cfg = LedgerConfig {
            max_content_bytes: 64,
            ..LedgerConfig::with_difficulty(1)
        };
        let l = Ledger::new(cfg).unwrap();
        let err = l
            .create_block(BlockContent::new("t", "x".repeat(100)), &LocalIdentity::generate())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[tokio::test]
    async fn mining_timeout_leaves_chain_untouched() {
        let cfg = LedgerConfig {
            mining_timeout: Duration::from_millis(20),
            ..LedgerConfig::with_difficulty(40)
        };
        let l = Ledger::new(cfg).unwrap();
        let err = l
            .create_block(content("A"), &LocalIdentity::generate())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::MiningTimeout { difficulty: 40, .. }));
        assert_eq!(l.len(), 1);
        assert!(l.verify_chain());
    }

    #[tokio::test]
    async fn corrupted_body_detected() {
        let l = ledger();
        let block = l
            .create_block(content("A"), &LocalIdentity::generate())
            .await
            .unwrap();
        tamper(&l, 1, |b| b.content.body = "forged".into());

        assert!(!l.verify_content(&block.id));
        let report = l.chain_report();
        assert!(!report.valid);
        assert_eq!(report.first_fault().unwrap().kind, FaultKind::Integrity);
    }

    #[tokio::test]
    async fn spliced_foreign_block_breaks_chain() {
        let l = ledger();
        let actor = LocalIdentity::generate();
        l.create_block(content("A"), &actor).await.unwrap();
        l.create_block(content("B"), &actor).await.unwrap();

        // A valid block from a different ledger: intrinsically fine, but its
        // parent is not the block before it here.
        let other = ledger();
        other.create_block(content("X"), &actor).await.unwrap();
        let foreign = other.create_block(content("Y"), &actor).await.unwrap();
        assert!(foreign.verify_intrinsic());

        tamper(&l, 2, |b| *b = foreign.clone());
        let report = l.chain_report();
        assert!(!report.valid);
        assert_eq!(report.faults[0].height, 2);
        assert_eq!(report.faults[0].kind, FaultKind::BrokenLink);
        assert!(!l.verify_chain());
    }

    #[tokio::test]
    async fn verify_block_requires_a_local_parent() {
        let l = ledger();
        let actor = LocalIdentity::generate();
        let own = l.create_block(content("A"), &actor).await.unwrap();

        let other = ledger();
        other.create_block(content("X"), &actor).await.unwrap();
        let foreign = other.create_block(content("Y"), &actor).await.unwrap();

        assert!(foreign.verify_intrinsic());
        assert!(other.verify_block(&foreign));
        assert!(!l.verify_block(&foreign));
        assert!(l.verify_block(&own));
        assert_eq!(l.height_of(&own.id), Some(1));
        assert_eq!(l.height_of(&foreign.id), None);
    }

    #[tokio::test]
    async fn replaced_genesis_detected() {
        let l = ledger();
        tamper(&l, 0, |b| b.content.title = "Not Genesis".into());
        assert_eq!(l.chain_report().faults[0].kind, FaultKind::NotGenesis);
    }

    #[test]
    fn unknown_content_is_unverified() {
        assert!(!ledger().verify_content("block-missing"));
    }

    #[tokio::test]
    async fn revisions_form_history() {
        let l = ledger();
        let actor = LocalIdentity::generate();
        let original = l.create_block(content("v1"), &actor).await.unwrap();
        let rev = l
            .create_revision(&original.id, content("v2"), &actor)
            .await
            .unwrap();

        assert_eq!(rev.content.original_id(), Some(original.id.as_str()));
        assert_eq!(rev.transactions[0].tx_type, TransactionType::Update);

        let history = l.get_history(&original.id);
        let ids: Vec<&str> = history.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec![original.id.as_str(), rev.id.as_str()]);
        assert!(history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test]
    async fn revision_of_unknown_block_is_not_found() {
        let err = ledger()
            .create_revision("block-nope", content("v2"), &LocalIdentity::generate())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }

    #[test]
    fn history_of_unknown_id_is_empty() {
        assert!(ledger().get_history("block-nope").is_empty());
    }

    #[tokio::test]
    async fn concurrent_appends_stay_linear() {
        let l = Arc::new(ledger());
        let actor = Arc::new(LocalIdentity::generate());

        let (a, b) = tokio::join!(
            {
                let (l, actor) = (Arc::clone(&l), Arc::clone(&actor));
                async move { l.create_block(content("one"), actor.as_ref()).await }
            },
            {
                let (l, actor) = (Arc::clone(&l), Arc::clone(&actor));
                async move { l.create_block(content("two"), actor.as_ref()).await }
            }
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(l.len(), 3);
        assert_ne!(a.previous_hash, b.previous_hash);
        assert!(l.verify_chain());
    }

    #[tokio::test]
    async fn persisted_ledger_reloads() {
        let store = LedgerStore::open_temporary().unwrap();
        let l = Ledger::open(store.clone(), LedgerConfig::with_difficulty(1)).unwrap();
        let block = l
            .create_block(content("A"), &LocalIdentity::generate())
            .await
            .unwrap();

        let reopened = Ledger::open(store, LedgerConfig::with_difficulty(1)).unwrap();
        assert_eq!(reopened.blocks(), l.blocks());
        assert!(reopened.verify_content(&block.id));
    }
}
