//! # Proof-of-Work Miner
//!
//! Finds a nonce such that the canonical hash of `template ∪ {nonce}` starts
//! with `difficulty` hex zeros. The search is deterministic: it starts at
//! nonce 0 and counts up, so the same template always yields the same proof.
//!
//! Three entry points, from pure to managed:
//!
//! - [`mine`] searches until it succeeds.
//! - [`mine_bounded`] adds an attempt budget and a shared cancellation flag.
//! - [`mine_with_timeout`] runs `mine_bounded` on tokio's blocking pool and
//!   stops it when the timeout fires or the future is dropped.
//!
//! The template is serialized once. Canonical JSON emits object keys in
//! sorted order, so the bytes before and after the `"nonce"` member never
//! change between attempts; only the decimal nonce in the middle does.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::{CANCEL_POLL_INTERVAL, MAX_DIFFICULTY};
use crate::crypto::canonical::{canonical_value, CanonicalError};
use crate::crypto::hash::hash_value;

/// Object key the nonce is stored under.
pub const NONCE_KEY: &str = "nonce";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum MiningError {
    #[error("difficulty {difficulty} exceeds the maximum of 64")]
    InvalidDifficulty { difficulty: u32 },

    #[error("no valid nonce at difficulty {difficulty} within {elapsed_ms} ms")]
    Timeout { difficulty: u32, elapsed_ms: u64 },

    #[error("mining cancelled after {attempts} attempts")]
    Cancelled { attempts: u64 },

    #[error("attempt budget exhausted after {attempts} attempts")]
    Exhausted { attempts: u64 },

    #[error("template serialization failed: {0}")]
    Serialization(String),
}

impl From<CanonicalError> for MiningError {
    fn from(e: CanonicalError) -> Self {
        Self::Serialization(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A successful search result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinedProof {
    pub nonce: u64,
    /// Canonical hash of the template with `nonce` inserted.
    pub hash: String,
    /// Number of nonces hashed, including the winning one.
    pub attempts: u64,
}

/// Limits on a bounded search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MiningBudget {
    /// Give up after this many hashes. `None` means unlimited.
    pub max_attempts: Option<u64>,
}

impl MiningBudget {
    pub fn unlimited() -> Self {
        Self { max_attempts: None }
    }

    pub fn attempts(max_attempts: u64) -> Self {
        Self {
            max_attempts: Some(max_attempts),
        }
    }
}

/// A template pre-encoded around its nonce slot.
#[derive(Debug, Clone)]
pub struct PreparedTemplate {
    prefix: Vec<u8>,
    suffix: Vec<u8>,
}

impl PreparedTemplate {
    /// Encode `template`, which must serialize to a JSON object. Any existing
    /// `nonce` member is replaced.
    pub fn new<T: Serialize + ?Sized>(template: &T) -> Result<Self, MiningError> {
        let Value::Object(map) = canonical_value(template)? else {
            return Err(MiningError::Serialization(
                "mining template must be a JSON object".into(),
            ));
        };

        let mut before = Vec::new();
        let mut after = Vec::new();
        for (key, value) in map {
            if key == NONCE_KEY {
                continue;
            }
            let mut member = serde_json::to_vec(&key).map_err(CanonicalError::from)?;
            member.push(b':');
            member.extend(serde_json::to_vec(&value).map_err(CanonicalError::from)?);
            if key.as_str() < NONCE_KEY {
                before.push(member);
            } else {
                after.push(member);
            }
        }

        let mut prefix = b"{".to_vec();
        for member in before {
            prefix.extend(member);
            prefix.push(b',');
        }
        prefix.extend(b"\"nonce\":");

        let mut suffix = Vec::new();
        for member in after {
            suffix.push(b',');
            suffix.extend(member);
        }
        suffix.push(b'}');

        Ok(Self { prefix, suffix })
    }

    /// Hash of the template with `nonce` inserted, lower-case hex.
    pub fn hash_with_nonce(&self, nonce: u64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.prefix);
        hasher.update(nonce.to_string().as_bytes());
        hasher.update(&self.suffix);
        hex::encode(hasher.finalize())
    }
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// True when `hash` begins with `difficulty` `'0'` characters.
pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    let d = difficulty as usize;
    hash.len() >= d && hash.bytes().take(d).all(|b| b == b'0')
}

/// Reference hash of `template ∪ {nonce}` through the general canonical
/// encoder. Block verification uses this path; mining uses the prepared one.
pub fn hash_with_nonce<T: Serialize + ?Sized>(
    template: &T,
    nonce: u64,
) -> Result<String, CanonicalError> {
    let mut value = canonical_value(template)?;
    if let Value::Object(map) = &mut value {
        map.insert(NONCE_KEY.to_string(), Value::from(nonce));
    }
    hash_value(&value)
}

fn check_difficulty(difficulty: u32) -> Result<(), MiningError> {
    if difficulty > MAX_DIFFICULTY {
        return Err(MiningError::InvalidDifficulty { difficulty });
    }
    Ok(())
}

/// Search from nonce 0 until the difficulty is met.
///
/// # Examples
///
/// ```
/// use attest_protocol::miner::{meets_difficulty, mine};
/// use serde_json::json;
///
/// let proof = mine(&json!({ "title": "A" }), 1).unwrap();
/// assert!(meets_difficulty(&proof.hash, 1));
/// ```
pub fn mine<T: Serialize + ?Sized>(
    template: &T,
    difficulty: u32,
) -> Result<MinedProof, MiningError> {
    mine_bounded(
        template,
        difficulty,
        MiningBudget::unlimited(),
        &AtomicBool::new(false),
    )
}

/// Budgeted, cancellable search. `cancel` is polled every
/// [`CANCEL_POLL_INTERVAL`] attempts.
pub fn mine_bounded<T: Serialize + ?Sized>(
    template: &T,
    difficulty: u32,
    budget: MiningBudget,
    cancel: &AtomicBool,
) -> Result<MinedProof, MiningError> {
    check_difficulty(difficulty)?;
    let prepared = PreparedTemplate::new(template)?;
    search(&prepared, difficulty, budget, cancel)
}

fn search(
    prepared: &PreparedTemplate,
    difficulty: u32,
    budget: MiningBudget,
    cancel: &AtomicBool,
) -> Result<MinedProof, MiningError> {
    let started = Instant::now();
    let mut attempts: u64 = 0;

    for nonce in 0..=u64::MAX {
        if attempts % CANCEL_POLL_INTERVAL == 0 && cancel.load(Ordering::Relaxed) {
            return Err(MiningError::Cancelled { attempts });
        }
        if budget.max_attempts.is_some_and(|max| attempts >= max) {
            return Err(MiningError::Exhausted { attempts });
        }

        let hash = prepared.hash_with_nonce(nonce);
        attempts += 1;

        if meets_difficulty(&hash, difficulty) {
            debug!(
                difficulty,
                nonce,
                attempts,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "nonce found"
            );
            return Ok(MinedProof {
                nonce,
                hash,
                attempts,
            });
        }
    }

    Err(MiningError::Exhausted { attempts })
}

/// Raises the flag when dropped, so an abandoned search stops.
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// Mine on the blocking pool, giving up after `timeout`.
///
/// The template is encoded before the search starts, so `T` does not need
/// to be `Send`. Dropping the returned future cancels the search.
pub async fn mine_with_timeout<T: Serialize + ?Sized>(
    template: &T,
    difficulty: u32,
    timeout: Duration,
) -> Result<MinedProof, MiningError> {
    check_difficulty(difficulty)?;
    let prepared = PreparedTemplate::new(template)?;

    let cancel = Arc::new(AtomicBool::new(false));
    let guard = CancelOnDrop(Arc::clone(&cancel));
    let started = Instant::now();

    let handle = tokio::task::spawn_blocking(move || {
        search(&prepared, difficulty, MiningBudget::unlimited(), &cancel)
    });

    let outcome = match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(MiningError::Serialization(format!(
            "mining task failed: {join_err}"
        ))),
        Err(_) => Err(MiningError::Timeout {
            difficulty,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }),
    };

    drop(guard);
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn template() -> Value {
        json!({
            "id": "block-1",
            "previous_hash": "00ab",
            "timestamp": 1_700_000_000_000u64,
            "content": { "title": "A", "body": "B", "metadata": { "z": 1, "a": 2 } },
            "transactions": [],
            "merkle_root": "",
            "difficulty": 2
        })
    }

    #[test]
    fn meets_difficulty_counts_leading_zeros() {
        assert!(meets_difficulty("00ab", 2));
        assert!(!meets_difficulty("0a0b", 2));
        assert!(meets_difficulty("anything", 0));
        assert!(!meets_difficulty("00", 3));
    }

    #[test]
    fn prepared_hash_matches_reference_encoder() {
        let prepared = PreparedTemplate::new(&template()).unwrap();
        for nonce in [0u64, 1, 42, 1_000_000, u64::MAX] {
            assert_eq!(
                prepared.hash_with_nonce(nonce),
                hash_with_nonce(&template(), nonce).unwrap()
            );
        }
    }

    #[test]
    fn prepared_hash_with_keys_only_after_nonce() {
        let t = json!({ "zeta": true });
        let prepared = PreparedTemplate::new(&t).unwrap();
        assert_eq!(prepared.hash_with_nonce(7), hash_with_nonce(&t, 7).unwrap());
    }

    #[test]
    fn existing_nonce_member_is_replaced() {
        let t = json!({ "nonce": 99, "a": 1 });
        let prepared = PreparedTemplate::new(&t).unwrap();
        assert_eq!(prepared.hash_with_nonce(3), hash_with_nonce(&t, 3).unwrap());
    }

    #[test]
    fn non_object_template_rejected() {
        assert!(matches!(
            PreparedTemplate::new(&json!([1, 2])),
            Err(MiningError::Serialization(_))
        ));
    }

    #[test]
    fn mine_meets_difficulty_and_is_deterministic() {
        let a = mine(&template(), 2).unwrap();
        let b = mine(&template(), 2).unwrap();
        assert!(meets_difficulty(&a.hash, 2));
        assert_eq!(a, b);
        assert_eq!(a.attempts, a.nonce + 1);
        assert_eq!(a.hash, hash_with_nonce(&template(), a.nonce).unwrap());
    }

    #[test]
    fn difficulty_zero_takes_first_nonce() {
        let proof = mine(&template(), 0).unwrap();
        assert_eq!(proof.nonce, 0);
        assert_eq!(proof.attempts, 1);
    }

    #[test]
    fn excessive_difficulty_rejected() {
        assert_eq!(
            mine(&template(), MAX_DIFFICULTY + 1),
            Err(MiningError::InvalidDifficulty {
                difficulty: MAX_DIFFICULTY + 1
            })
        );
    }

    #[test]
    fn budget_exhaustion() {
        // 16 leading zeros will not turn up in 10 attempts.
        let cancel = AtomicBool::new(false);
        let result = mine_bounded(&template(), 16, MiningBudget::attempts(10), &cancel);
        assert_eq!(result, Err(MiningError::Exhausted { attempts: 10 }));
    }

    #[test]
    fn pre_cancelled_search_stops_immediately() {
        let cancel = AtomicBool::new(true);
        let result = mine_bounded(&template(), 16, MiningBudget::unlimited(), &cancel);
        assert_eq!(result, Err(MiningError::Cancelled { attempts: 0 }));
    }

    #[tokio::test]
    async fn timeout_is_reported() {
        let result = mine_with_timeout(&template(), 40, Duration::from_millis(50)).await;
        assert!(matches!(
            result,
            Err(MiningError::Timeout { difficulty: 40, .. })
        ));
    }

    #[tokio::test]
    async fn easy_search_finishes_within_timeout() {
        let proof = mine_with_timeout(&template(), 1, Duration::from_secs(10))
            .await
            .unwrap();
        assert!(meets_difficulty(&proof.hash, 1));
    }
}
