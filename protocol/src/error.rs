//! Error type for ledger operations.
//!
//! Only mutating operations return these. Verification and lookup paths
//! answer `false` or `None` instead of erroring.

use crate::crypto::CanonicalError;
use crate::ledger::store::StoreError;
use crate::miner::MiningError;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Caller-supplied data was rejected before any state changed.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// No nonce meeting the difficulty was found within the mining timeout.
    /// The chain is unchanged.
    #[error("mining timed out at difficulty {difficulty} after {elapsed_ms} ms")]
    MiningTimeout { difficulty: u32, elapsed_ms: u64 },

    /// Mining stopped for a reason other than the timeout.
    #[error("mining aborted: {0}")]
    MiningAborted(String),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

impl From<CanonicalError> for LedgerError {
    fn from(e: CanonicalError) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<MiningError> for LedgerError {
    fn from(e: MiningError) -> Self {
        match e {
            MiningError::Timeout {
                difficulty,
                elapsed_ms,
            } => Self::MiningTimeout {
                difficulty,
                elapsed_ms,
            },
            MiningError::InvalidDifficulty { .. } => Self::Validation(e.to_string()),
            MiningError::Serialization(msg) => Self::Serialization(msg),
            other => Self::MiningAborted(other.to_string()),
        }
    }
}
