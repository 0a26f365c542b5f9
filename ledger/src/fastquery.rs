//! # FastQuery — Read-Optimized Ownership & Spend Lookups
//!
//! The read side of the ledger: who owns what, and what has already been
//! spent, answered from the storage engine's indexes without ever
//! rescanning the transaction log.
//!
//! FastQuery holds no state and no locks of its own. It reflects exactly
//! what the gateway has durably committed — a transaction that never
//! survives validation never shows up here — and leaves concurrency
//! correctness to the gateway's write-time conflict detection. Two reads
//! with no intervening writes always agree.

use std::sync::Arc;

use crate::crypto::TesseraPublicKey;
use crate::storage::{StorageError, StorageGateway};
use crate::transaction::{Transaction, TransactionLink};

/// Read-optimized projections over a storage gateway.
///
/// Cheap to clone; it is one `Arc` deep.
#[derive(Clone)]
pub struct FastQuery {
    store: Arc<dyn StorageGateway>,
}

impl FastQuery {
    pub fn new(store: Arc<dyn StorageGateway>) -> Self {
        Self { store }
    }

    /// Every output ever addressed to `public_key`, spent or not, in
    /// insertion order of creation.
    pub fn get_outputs_by_public_key(
        &self,
        public_key: &TesseraPublicKey,
    ) -> Result<Vec<TransactionLink>, StorageError> {
        self.store.get_outputs_by_public_key(public_key)
    }

    /// The committed transaction that spent the given output, or `None`
    /// if it is unspent or does not exist.
    pub fn get_spent(
        &self,
        transaction_id: &str,
        output_index: u32,
    ) -> Result<Option<Transaction>, StorageError> {
        self.store.get_spent(transaction_id, output_index)
    }

    /// The subset of `links` that a committed transaction has spent.
    ///
    /// Together with [`filter_unspent_outputs`](Self::filter_unspent_outputs)
    /// this partitions the input: no overlap, union equals the input set.
    pub fn filter_spent_outputs(
        &self,
        links: &[TransactionLink],
    ) -> Result<Vec<TransactionLink>, StorageError> {
        self.partition(links, true)
    }

    /// The subset of `links` no committed transaction has spent.
    pub fn filter_unspent_outputs(
        &self,
        links: &[TransactionLink],
    ) -> Result<Vec<TransactionLink>, StorageError> {
        self.partition(links, false)
    }

    /// Outputs addressed to `public_key`, optionally narrowed to spent
    /// (`Some(true)`), unspent (`Some(false)`), or all (`None`).
    pub fn get_outputs_filtered(
        &self,
        public_key: &TesseraPublicKey,
        spent: Option<bool>,
    ) -> Result<Vec<TransactionLink>, StorageError> {
        let outputs = self.get_outputs_by_public_key(public_key)?;
        match spent {
            None => Ok(outputs),
            Some(want_spent) => self.partition(&outputs, want_spent),
        }
    }

    fn partition(
        &self,
        links: &[TransactionLink],
        keep_spent: bool,
    ) -> Result<Vec<TransactionLink>, StorageError> {
        let mut kept = Vec::new();
        for link in links {
            let is_spent = self
                .store
                .get_spent(&link.transaction_id, link.output_index)?
                .is_some();
            if is_spent == keep_spent {
                kept.push(link.clone());
            }
        }
        Ok(kept)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
