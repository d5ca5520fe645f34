//! Core transaction enums.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// TransactionType
// ---------------------------------------------------------------------------

/// What a ledger transaction records.
///
/// Serialized lower-case (`"create"`, `"update"`, ...) because the name is
/// part of the hashed block body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// First registration of a piece of content.
    Create,
    /// A revision of previously registered content.
    Update,
    /// A change of ownership.
    Transfer,
    /// A licence grant.
    License,
    /// An attestation that content was checked.
    Verify,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Transfer => "transfer",
            Self::License => "license",
            Self::Verify => "verify",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
