//! # Consensus-Facing State & Commit Lifecycle
//!
//! The ordering layer is an external collaborator: it decides which
//! transactions land in which block and at what height. This module holds
//! the state it hands us — blocks, validator sets, election records — and
//! the [`CommitLifecycle`] state machine that walks a block from
//! begin-block through deliver, end-block, and commit.
//!
//! Nothing here assigns order. Height is a monotonically increasing token
//! we receive, persist, and hash into the app-hash chain; disagreeing
//! with it is not an option this side of the wire.

pub mod lifecycle;

pub use lifecycle::{CommitLifecycle, LifecycleError};

use serde::{Deserialize, Serialize};

use crate::crypto::TesseraPublicKey;

// ---------------------------------------------------------------------------
// Block
// ---------------------------------------------------------------------------

/// The unit of commit ordering.
///
/// `app_hash` chains each block to its predecessor through the delivered
/// transaction ids; `height` is assigned by the ordering layer and stored
/// verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub app_hash: String,
    pub height: u64,
    pub transaction_ids: Vec<String>,
}

// ---------------------------------------------------------------------------
// Validator set
// ---------------------------------------------------------------------------

/// One member of a validator set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorEntry {
    pub public_key: TesseraPublicKey,
    pub voting_power: u64,
}

/// The validator set effective from `height` onward, until a later set is
/// stored. Reads resolve to the newest set at or before the queried
/// height.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSet {
    pub height: u64,
    pub validators: Vec<ValidatorEntry>,
}

// ---------------------------------------------------------------------------
// Election
// ---------------------------------------------------------------------------

/// Minimal persisted election state.
///
/// The voting protocol itself lives with the consensus layer; the ledger
/// only records which elections exist and whether they have concluded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Election {
    pub election_id: String,
    pub height: u64,
    pub is_concluded: bool,
}

// ---------------------------------------------------------------------------
// Pre-commit state
// ---------------------------------------------------------------------------

/// Crash-recovery breadcrumb written at end-block: the height and
/// transaction ids about to be committed. If the process dies between
/// end-block and commit, recovery compares this against the latest block
/// instead of guessing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreCommitState {
    pub height: u64,
    pub transaction_ids: Vec<String>,
}
