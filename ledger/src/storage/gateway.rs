//! The backend-agnostic storage contract.
//!
//! [`StorageGateway`] is the seam between the ledger core and whatever
//! engine persists it. The validator and FastQuery depend only on this
//! trait, behind `Arc<dyn StorageGateway>`; swapping engines is a
//! construction-time decision, not a code change.
//!
//! The contract's heart is `store_transactions`: atomic per call, and the
//! **sole arbiter of spend uniqueness**. Advisory double-spend checks run
//! during validation, but two validations can race past each other; the
//! engine's insert-if-absent on the spend index is what actually keeps
//! every output spent at most once. An engine that cannot provide
//! read-then-conditionally-insert as a single atomic step cannot back
//! this ledger.

use thiserror::Error;

use crate::consensus::{Block, Election, PreCommitState, ValidatorSet};
use crate::crypto::TesseraPublicKey;
use crate::transaction::{Transaction, TransactionLink};

// ---------------------------------------------------------------------------
// StorageError
// ---------------------------------------------------------------------------

/// Failures surfaced by a storage engine.
///
/// `CriticalDoubleSpend` is the severe one: a conflicting spend reached
/// the commit boundary, meaning it slipped past advisory validation.
/// Engines must detect it atomically and callers must never retry it.
/// Everything else is operational and may be retried by the caller with
/// backoff; the gateway itself never retries.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error(
        "write-time conflict: output {link} is already spent by transaction {spender}; \
         the conflict escaped advisory validation and requires operator attention"
    )]
    CriticalDoubleSpend {
        link: TransactionLink,
        spender: String,
    },

    #[error("block height must strictly increase: latest {latest}, attempted {attempted}")]
    NonMonotonicHeight { latest: u64, attempted: u64 },

    #[error("refusing to store a transaction without an id")]
    MissingTransactionId,

    #[error("stored record failed to (de)serialize: {0}")]
    Serialization(String),

    #[error("storage backend failure: {0}")]
    Backend(#[from] sled::Error),
}

// ---------------------------------------------------------------------------
// StorageGateway
// ---------------------------------------------------------------------------

/// Contract every storage engine must satisfy.
///
/// Implementations must be safe to share across threads; all methods take
/// `&self` and interior synchronization is the engine's problem.
pub trait StorageGateway: Send + Sync {
    /// Durably record a batch of validated transactions.
    ///
    /// Per call, all-or-nothing: every transaction body, every output
    /// ownership index entry, and one spend-index entry per input land
    /// together, or none do. Recording a spend-index key that already
    /// exists — whether from committed state, an earlier transaction in
    /// this batch, or a concurrent caller — aborts the whole call with
    /// [`StorageError::CriticalDoubleSpend`] and leaves prior state
    /// untouched.
    fn store_transactions(&self, transactions: &[Transaction]) -> Result<(), StorageError>;

    /// Point lookup of a committed transaction.
    fn get_transaction(&self, id: &str) -> Result<Option<Transaction>, StorageError>;

    /// The committed transaction that spent `(transaction_id,
    /// output_index)`, or `None` if the output is unspent or unknown.
    fn get_spent(
        &self,
        transaction_id: &str,
        output_index: u32,
    ) -> Result<Option<Transaction>, StorageError>;

    /// Every output ever addressed to `public_key`, in insertion order of
    /// creation. Stable across calls absent new writes.
    fn get_outputs_by_public_key(
        &self,
        public_key: &TesseraPublicKey,
    ) -> Result<Vec<TransactionLink>, StorageError>;

    /// Append block metadata. Heights must strictly increase across
    /// successful calls; a stale or duplicate height fails with
    /// [`StorageError::NonMonotonicHeight`].
    fn store_block(&self, block: &Block) -> Result<(), StorageError>;

    /// The block at exactly `height`, if any.
    fn get_block(&self, height: u64) -> Result<Option<Block>, StorageError>;

    /// The block with the greatest committed height.
    fn get_latest_block(&self) -> Result<Option<Block>, StorageError>;

    /// Store a validator set keyed by its effective height.
    /// Last-writer-wins per height.
    fn store_validator_set(&self, set: &ValidatorSet) -> Result<(), StorageError>;

    /// The validator set effective at or before `height`; the latest
    /// stored set when `height` is `None`.
    fn get_validator_set(&self, height: Option<u64>)
        -> Result<Option<ValidatorSet>, StorageError>;

    /// Store or update an election record. Last-writer-wins per id.
    fn store_election(&self, election: &Election) -> Result<(), StorageError>;

    /// Point lookup of an election record.
    fn get_election(&self, election_id: &str) -> Result<Option<Election>, StorageError>;

    /// Overwrite the pre-commit breadcrumb.
    fn store_pre_commit_state(&self, state: &PreCommitState) -> Result<(), StorageError>;

    /// The current pre-commit breadcrumb, if one was ever written.
    fn get_pre_commit_state(&self) -> Result<Option<PreCommitState>, StorageError>;
}

/// Canonical spend-index key for an output. Shared by engines so the
/// on-disk layout and the in-memory layout agree on what "the same
/// output" means.
pub(crate) fn spend_key(transaction_id: &str, output_index: u32) -> String {
    format!("{transaction_id}:{output_index}")
}
