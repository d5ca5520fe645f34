//! Canonical JSON encoding for deterministic hashing and signing.
//!
//! - Object keys are emitted in ascending byte order, at every depth.
//! - No insignificant whitespace.
//! - Numbers use serde_json's shortest round-trip form.
//!
//! The sort is done explicitly rather than relying on `serde_json::Map`
//! being a `BTreeMap`: any crate in the dependency graph enabling
//! serde_json's `preserve_order` feature would otherwise silently change
//! every hash in the ledger.

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// The value could not be represented as JSON (non-string map keys,
/// non-finite floats, failing custom `Serialize` impls).
#[derive(Debug, Error)]
#[error("canonical encoding failed: {0}")]
pub struct CanonicalError(String);

impl From<serde_json::Error> for CanonicalError {
    fn from(e: serde_json::Error) -> Self {
        Self(e.to_string())
    }
}

/// Encode `value` to canonical JSON bytes.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CanonicalError> {
    let value = canonical_value(value)?;
    Ok(serde_json::to_vec(&value)?)
}

/// Convert `value` to a [`Value`] whose objects are key-sorted.
pub fn canonical_value<T: Serialize + ?Sized>(value: &T) -> Result<Value, CanonicalError> {
    Ok(sort_keys(serde_json::to_value(value)?))
}

/// Re-insert object members in sorted key order, recursively.
pub(crate) fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::with_capacity(entries.len());
            for (k, v) in entries {
                sorted.insert(k, sort_keys(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}
