//! # Transaction Module
//!
//! Every block commits its content through transactions: a `create` for a
//! first registration, an `update` for a revision. The block's Merkle root
//! is computed over them.
//!
//! ```text
//! types.rs: TransactionType
//! builder.rs: Transaction and the fluent TransactionBuilder
//! signing.rs: signing through an IdentityProvider, signature checks
//! ```
//!
//! Transactions are immutable once embedded in a block; the block hash
//! covers them in full.

pub mod builder;
pub mod signing;
pub mod types;

pub use builder::{Transaction, TransactionBuilder};
pub use signing::{sign_transaction, verify_transaction};
pub use types::TransactionType;
