//! In-memory storage engine.
//!
//! `MemoryStore` is the executable reference implementation of the
//! [`StorageGateway`] contract: every map it keeps mirrors one table of
//! the persistent layout, and every atomicity requirement is met with one
//! `parking_lot::RwLock` around the whole state. It backs the bulk of the
//! test suite and any deployment that treats the ledger as a cache in
//! front of an authoritative replica.
//!
//! The write path is check-then-mutate under a single write lock: nothing
//! is inserted until every spend key in the batch is known to be free, so
//! a failed call leaves the store byte-identical to before.

use std::collections::{BTreeMap, HashMap, HashSet};

use parking_lot::RwLock;

use super::gateway::{spend_key, StorageGateway, StorageError};
use crate::consensus::{Block, Election, PreCommitState, ValidatorSet};
use crate::crypto::TesseraPublicKey;
use crate::transaction::{Transaction, TransactionLink};

#[derive(Default)]
struct Inner {
    /// Committed transactions by id.
    transactions: HashMap<String, Transaction>,
    /// Ownership index: owner base58 -> links in insertion order.
    outputs: HashMap<String, Vec<TransactionLink>>,
    /// Spend index: spend key -> spender transaction id.
    spends: HashMap<String, String>,
    /// Blocks by height; BTreeMap so "latest" is the last entry.
    blocks: BTreeMap<u64, Block>,
    /// Validator sets by effective height.
    validator_sets: BTreeMap<u64, ValidatorSet>,
    /// Elections by id.
    elections: HashMap<String, Election>,
    pre_commit: Option<PreCommitState>,
}

/// Thread-safe in-memory [`StorageGateway`] engine.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageGateway for MemoryStore {
    fn store_transactions(&self, transactions: &[Transaction]) -> Result<(), StorageError> {
        let mut inner = self.inner.write();

        // Phase one: verify, touching nothing. The write lock makes the
        // whole call one atomic check-and-set against concurrent callers.
        let mut batch_spends: HashMap<String, (&TransactionLink, &str)> = HashMap::new();
        for tx in transactions {
            let id = tx.id.as_deref().ok_or(StorageError::MissingTransactionId)?;
            for link in tx.spent_links() {
                let key = spend_key(&link.transaction_id, link.output_index);
                let existing = inner
                    .spends
                    .get(&key)
                    .map(String::as_str)
                    .or_else(|| batch_spends.get(&key).map(|(_, spender)| *spender));
                if let Some(spender) = existing {
                    return Err(StorageError::CriticalDoubleSpend {
                        link: link.clone(),
                        spender: spender.to_string(),
                    });
                }
                batch_spends.insert(key, (link, id));
            }
        }

        // Phase two: mutate. Nothing below can fail.
        for tx in transactions {
            let id = tx.id.clone().unwrap_or_default();
            for link in tx.spent_links() {
                let key = spend_key(&link.transaction_id, link.output_index);
                inner.spends.insert(key, id.clone());
            }
            for (index, output) in tx.outputs.iter().enumerate() {
                let link = TransactionLink::new(id.clone(), index as u32);
                let mut seen = HashSet::new();
                for pk in &output.public_keys {
                    if seen.insert(pk.to_base58()) {
                        inner
                            .outputs
                            .entry(pk.to_base58())
                            .or_default()
                            .push(link.clone());
                    }
                }
            }
            inner.transactions.insert(id, tx.clone());
        }
        Ok(())
    }

    fn get_transaction(&self, id: &str) -> Result<Option<Transaction>, StorageError> {
        Ok(self.inner.read().transactions.get(id).cloned())
    }

    fn get_spent(
        &self,
        transaction_id: &str,
        output_index: u32,
    ) -> Result<Option<Transaction>, StorageError> {
        let inner = self.inner.read();
        let key = spend_key(transaction_id, output_index);
        Ok(inner
            .spends
            .get(&key)
            .and_then(|spender| inner.transactions.get(spender))
            .cloned())
    }

    fn get_outputs_by_public_key(
        &self,
        public_key: &TesseraPublicKey,
    ) -> Result<Vec<TransactionLink>, StorageError> {
        Ok(self
            .inner
            .read()
            .outputs
            .get(&public_key.to_base58())
            .cloned()
            .unwrap_or_default())
    }

    fn store_block(&self, block: &Block) -> Result<(), StorageError> {
        let mut inner = self.inner.write();
        if let Some((latest, _)) = inner.blocks.last_key_value() {
            if block.height <= *latest {
                return Err(StorageError::NonMonotonicHeight {
                    latest: *latest,
                    attempted: block.height,
                });
            }
        }
        inner.blocks.insert(block.height, block.clone());
        Ok(())
    }

    fn get_block(&self, height: u64) -> Result<Option<Block>, StorageError> {
        Ok(self.inner.read().blocks.get(&height).cloned())
    }

    fn get_latest_block(&self) -> Result<Option<Block>, StorageError> {
        Ok(self
            .inner
            .read()
            .blocks
            .last_key_value()
            .map(|(_, block)| block.clone()))
    }

    fn store_validator_set(&self, set: &ValidatorSet) -> Result<(), StorageError> {
        self.inner
            .write()
            .validator_sets
            .insert(set.height, set.clone());
        Ok(())
    }

    fn get_validator_set(
        &self,
        height: Option<u64>,
    ) -> Result<Option<ValidatorSet>, StorageError> {
        let inner = self.inner.read();
        let found = match height {
            Some(h) => inner.validator_sets.range(..=h).next_back(),
            None => inner.validator_sets.last_key_value(),
        };
        Ok(found.map(|(_, set)| set.clone()))
    }

    fn store_election(&self, election: &Election) -> Result<(), StorageError> {
        self.inner
            .write()
            .elections
            .insert(election.election_id.clone(), election.clone());
        Ok(())
    }

    fn get_election(&self, election_id: &str) -> Result<Option<Election>, StorageError> {
        Ok(self.inner.read().elections.get(election_id).cloned())
    }

    fn store_pre_commit_state(&self, state: &PreCommitState) -> Result<(), StorageError> {
        self.inner.write().pre_commit = Some(state.clone());
        Ok(())
    }

    fn get_pre_commit_state(&self) -> Result<Option<PreCommitState>, StorageError> {
        Ok(self.inner.read().pre_commit.clone())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
