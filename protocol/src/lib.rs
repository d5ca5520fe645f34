// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Attest Core Library
//!
//! A tamper-evident, append-only ledger for content authentication. Each
//! piece of registered content becomes a proof-of-work block, hash-linked to
//! the one before it and signed by the actor who registered it. Anyone with
//! the chain can check that nothing was rewritten after the fact.
//!
//! ## Architecture
//!
//! - **crypto**: Canonical JSON, SHA-256, Merkle roots, Ed25519.
//! - **identity**: Bech32 addresses and the `IdentityProvider` signing boundary.
//! - **transaction**: The records a block commits to.
//! - **miner**: Deterministic, cancellable proof-of-work search.
//! - **ledger**: Blocks, the chain itself, and sled persistence.
//! - **config**: Protocol constants and `LedgerConfig`.
//!
//! Certificates and copyright records live in the `attest-registry` crate and
//! reference ledger blocks by id.
//!
//! ## Design Philosophy
//!
//! 1. One writer per ledger. No forks, no consensus, no peers.
//! 2. Verification never errors. It answers `true` or `false`.
//! 3. Nothing is appended until it is mined, signed and durable.

pub mod config;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod miner;
pub mod transaction;

pub use config::LedgerConfig;
pub use error::{LedgerError, LedgerResult};
pub use identity::{IdentityProvider, LocalIdentity};
pub use ledger::{Block, BlockContent, Ledger, LedgerStore};
