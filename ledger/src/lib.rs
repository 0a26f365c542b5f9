// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Tessera Ledger — Core Library
//!
//! The beating heart of Tessera: a permissioned ledger for divisible,
//! multi-owner digital assets, built around one uncompromising rule —
//! every output is spent at most once, no matter who races whom.
//!
//! Tessera takes a pragmatic stance: Ed25519 for signatures (because
//! we're not barbarians), SHA3-256 for content addressing (because ids
//! outlive implementations), and a storage contract small enough that
//! any engine with atomic check-and-set can sit underneath.
//!
//! ## Architecture
//!
//! The crate is split into modules that mirror the actual concerns of a
//! ledger database:
//!
//! - **crypto** — Keys, hashing, and the condition/fulfillment model.
//!   Don't roll your own.
//! - **transaction** — CREATE/TRANSFER/COMPOSE/DECOMPOSE value objects,
//!   canonical serialization, schema validation, building, signing.
//! - **fastquery** — Read-optimized ownership and spend-status lookups.
//! - **validation** — The five-stage pipeline that decides VALID or
//!   INVALID, and nothing in between.
//! - **storage** — The pluggable gateway contract plus two engines:
//!   sled on disk, memory for tests and caches.
//! - **consensus** — The state the ordering layer hands us and the
//!   begin/deliver/end/commit lifecycle it drives.
//! - **config** — Protocol constants and the explicit storage layout
//!   configuration. No global state, ever.
//!
//! ## Design Philosophy
//!
//! 1. Validation is pure: no hidden state, re-entrant, parallel-safe.
//! 2. The storage insert is the sole arbiter of spend uniqueness;
//!    advisory checks only narrow the race window.
//! 3. Deterministic rejections are never retried. Retrying an invalid
//!    transaction cannot change the verdict.
//! 4. If it touches value, it has tests. Plural.

pub mod config;
pub mod consensus;
pub mod crypto;
pub mod fastquery;
pub mod storage;
pub mod transaction;
pub mod validation;

pub use config::StorageConfig;
pub use consensus::{Block, CommitLifecycle, Election, PreCommitState, ValidatorEntry, ValidatorSet};
pub use crypto::{TesseraKeypair, TesseraPublicKey};
pub use fastquery::FastQuery;
pub use storage::{MemoryStore, StorageError, StorageGateway, TesseraDB};
pub use transaction::{
    sign_transaction, Operation, SchemaError, Transaction, TransactionBuilder, TransactionLink,
};
pub use validation::{ValidationError, Validator};
