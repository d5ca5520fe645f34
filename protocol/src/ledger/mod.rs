//! # Ledger Module
//!
//! The append-only content ledger and its persistence.
//!
//! ```text
//! block.rs: Block, BlockContent, BlockTemplate, genesis, intrinsic checks
//! chain.rs: Ledger: create/revise, verify, history, chain audit
//! store.rs: LedgerStore over sled
//! ```
//!
//! ## Data Flow
//!
//! ```text
//! BlockContent → create tx → Merkle root → template → mine → sign → store → append
//! ```
//!
//! Nothing is appended until the block is mined, signed and flushed to the
//! store, so a failure at any step leaves the chain exactly as it was.

pub mod block;
pub mod chain;
pub mod store;

pub use block::{Block, BlockContent, BlockTemplate};
pub use chain::{BlockFault, ChainReport, FaultKind, Ledger};
pub use store::{LedgerStore, StoreError, StoreResult};
