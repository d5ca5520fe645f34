//! # Protocol Configuration & Constants
//!
//! Every magic number in Attest lives here. The genesis constants in
//! particular are part of the ledger's identity: change one and every
//! existing chain stops verifying.

use std::time::Duration;

use crate::error::LedgerError;

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// The full protocol version string.
pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Bech32 human-readable prefix for actor addresses.
pub const ADDRESS_HRP: &str = "attest";

// ---------------------------------------------------------------------------
// Genesis
// ---------------------------------------------------------------------------

/// Id of the fixed first block.
pub const GENESIS_ID: &str = "genesis";

/// The genesis hash sentinel: 64 zero hex digits. It is not the hash of the
/// genesis contents; genesis is recognised by equality, not by rehashing.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// 2025-01-01T00:00:00Z in Unix milliseconds.
pub const GENESIS_TIMESTAMP_MS: u64 = 1_735_689_600_000;

pub const GENESIS_TITLE: &str = "Genesis Block";
pub const GENESIS_BODY: &str = "The first block in the blockchain";
pub const GENESIS_AUTHOR: &str = "System";

/// Difficulty recorded on the genesis block.
pub const GENESIS_DIFFICULTY: u32 = 4;

// ---------------------------------------------------------------------------
// Proof of Work
// ---------------------------------------------------------------------------

/// Leading hex zeros required of every mined block hash by default.
/// Around 65k hash attempts on average.
pub const DEFAULT_DIFFICULTY: u32 = 4;

/// A SHA-256 hex digest has 64 characters; more leading zeros is impossible.
pub const MAX_DIFFICULTY: u32 = 64;

/// Wall-clock budget for mining one block before `create_block` gives up.
pub const DEFAULT_MINING_TIMEOUT: Duration = Duration::from_secs(30);

/// How many nonces the miner tries between checks of its cancellation flag.
pub const CANCEL_POLL_INTERVAL: u64 = 1_024;

// ---------------------------------------------------------------------------
// Content & Transactions
// ---------------------------------------------------------------------------

/// Maximum canonical size of a block's content (title + body + metadata).
pub const MAX_CONTENT_BYTES: usize = 256 * 1024;

/// Maximum length of a content title, in characters.
pub const MAX_TITLE_LENGTH: usize = 512;

/// Fee attached to `create` transactions, in micro-units (0.001).
pub const CREATE_TX_FEE: u64 = 1_000;

/// Metadata key linking a revision block back to the block it revises.
pub const ORIGINAL_ID_KEY: &str = "originalId";

// ---------------------------------------------------------------------------
// Registries
// ---------------------------------------------------------------------------

/// Certificate lifetime when the caller does not pick one: 365 days.
pub const DEFAULT_CERTIFICATE_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Jurisdiction recorded for copyright registrations that do not name one.
pub const DEFAULT_JURISDICTION: &str = "KR";

/// Terms attached to a copyright transfer.
pub const DEFAULT_TRANSFER_TERMS: &str = "Standard transfer terms";

/// Royalty rates are basis points; 10 000 bps is 100%.
pub const MAX_ROYALTY_BPS: u32 = 10_000;

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Default HTTP API port.
pub const DEFAULT_RPC_PORT: u16 = 9841;

/// Default metrics (Prometheus) port.
pub const DEFAULT_METRICS_PORT: u16 = 9842;

// ---------------------------------------------------------------------------
// LedgerConfig
// ---------------------------------------------------------------------------

/// Tunables for a [`Ledger`](crate::ledger::Ledger) instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Leading hex zeros required of new block hashes.
    pub difficulty: u32,

    /// Wall-clock budget for mining a single block.
    pub mining_timeout: Duration,

    /// Maximum canonical size of block content.
    pub max_content_bytes: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            difficulty: DEFAULT_DIFFICULTY,
            mining_timeout: DEFAULT_MINING_TIMEOUT,
            max_content_bytes: MAX_CONTENT_BYTES,
        }
    }
}

impl LedgerConfig {
    /// Config with a specific difficulty and defaults elsewhere.
    pub fn with_difficulty(difficulty: u32) -> Self {
        Self {
            difficulty,
            ..Self::default()
        }
    }

    /// Reject configurations the miner could never satisfy.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.difficulty > MAX_DIFFICULTY {
            return Err(LedgerError::Validation(format!(
                "difficulty {} exceeds maximum {}",
                self.difficulty, MAX_DIFFICULTY
            )));
        }
        if self.mining_timeout.is_zero() {
            return Err(LedgerError::Validation(
                "mining timeout must be positive".into(),
            ));
        }
        if self.max_content_bytes == 0 {
            return Err(LedgerError::Validation(
                "max content size must be positive".into(),
            ));
        }
        Ok(())
    }
}
