//! The block commit state machine.
//!
//! The external ordering layer drives four calls per block, in order:
//! `begin_block`, `deliver_transaction` (zero or more), `end_block`,
//! `commit`. This module owns the in-flight state between those calls —
//! the accumulated candidate list, the pending height, the app-hash
//! chain — and nothing else. Transport is someone else's problem.
//!
//! Validation happens at delivery against committed state plus the
//! candidates already accepted in this block, so nothing invalid ever
//! enters the commit set. The gateway write at commit is still the final
//! arbiter: a conflict there surfaces as a critical double spend, is
//! logged loudly, and is never retried.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info};

use super::{Block, PreCommitState, ValidatorEntry, ValidatorSet};
use crate::crypto::hash::hash_strings;
use crate::storage::{StorageError, StorageGateway};
use crate::transaction::Transaction;
use crate::validation::{ValidationError, Validator};

/// Failures of the lifecycle itself, as opposed to verdicts on individual
/// transactions (which travel as [`ValidationError`] from delivery).
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// A call arrived out of order, e.g. `commit` without `begin_block`.
    #[error("lifecycle call out of order: {call} requires an open block")]
    OutOfOrder { call: &'static str },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Drives one block at a time from begin to commit.
///
/// Not `Sync` by design: the ordering layer is a single logical caller
/// and delivers strictly in sequence. Concurrency lives below, in the
/// validator and the gateway.
pub struct CommitLifecycle {
    validator: Validator,
    store: Arc<dyn StorageGateway>,
    block_transactions: Vec<Transaction>,
    block_txn_ids: Vec<String>,
    block_txn_hash: String,
    new_height: Option<u64>,
}

impl CommitLifecycle {
    pub fn new(store: Arc<dyn StorageGateway>) -> Self {
        Self {
            validator: Validator::new(Arc::clone(&store)),
            store,
            block_transactions: Vec::new(),
            block_txn_ids: Vec::new(),
            block_txn_hash: String::new(),
            new_height: None,
        }
    }

    /// The validator this lifecycle delivers through.
    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    /// Initialize the chain: store a genesis marker block (empty app
    /// hash, height picked up from any pre-existing state) and the
    /// initial validator set, effective from the next height.
    pub fn init_chain(&self, validators: Vec<ValidatorEntry>) -> Result<(), LifecycleError> {
        let (app_hash, height) = match self.store.get_latest_block()? {
            Some(block) => (block.app_hash, block.height + 1),
            None => (String::new(), 0),
        };
        info!(height, "initializing chain");
        self.store.store_block(&Block {
            app_hash,
            height,
            transaction_ids: Vec::new(),
        })?;
        self.store.store_validator_set(&ValidatorSet {
            height: height + 1,
            validators,
        })?;
        Ok(())
    }

    /// Open a new block at `height`. Clears any in-flight state.
    pub fn begin_block(&mut self, height: u64) {
        debug!(height, "begin block");
        self.block_transactions.clear();
        self.block_txn_ids.clear();
        self.block_txn_hash.clear();
        self.new_height = Some(height);
    }

    /// Deserialize and validate one transaction against committed state
    /// plus this block's accepted candidates; accept it into the block on
    /// success.
    pub fn deliver_transaction(&mut self, raw: &[u8]) -> Result<(), ValidationError> {
        let tx = Transaction::from_bytes(raw)?;
        self.deliver(tx)
    }

    /// [`deliver_transaction`](Self::deliver_transaction) for an
    /// already-parsed transaction.
    pub fn deliver(&mut self, tx: Transaction) -> Result<(), ValidationError> {
        self.validator
            .validate_transaction(&tx, &self.block_transactions)?;
        // Schema validation guarantees the id is present past this point.
        let id = tx.id.clone().unwrap_or_default();
        debug!(%id, "transaction accepted into block");
        self.block_txn_ids.push(id);
        self.block_transactions.push(tx);
        Ok(())
    }

    /// Close the delivery phase: persist the pre-commit breadcrumb and
    /// fold the accepted ids into the app-hash chain. An empty block
    /// carries the previous app hash forward.
    pub fn end_block(&mut self) -> Result<(), LifecycleError> {
        let height = self
            .new_height
            .ok_or(LifecycleError::OutOfOrder { call: "end_block" })?;

        self.store.store_pre_commit_state(&PreCommitState {
            height,
            transaction_ids: self.block_txn_ids.clone(),
        })?;

        let previous = self
            .store
            .get_latest_block()?
            .map(|block| block.app_hash)
            .unwrap_or_default();

        self.block_txn_hash = if self.block_txn_ids.is_empty() {
            previous
        } else {
            let ids: Vec<&str> = self.block_txn_ids.iter().map(String::as_str).collect();
            hash_strings(&[&previous, &hash_strings(&ids)])
        };
        Ok(())
    }

    /// Durably commit the block: transactions first, block metadata last
    /// (so crash recovery can replay from the pre-commit breadcrumb).
    /// Returns the new app hash.
    pub fn commit(&mut self) -> Result<String, LifecycleError> {
        let height = self
            .new_height
            .take()
            .ok_or(LifecycleError::OutOfOrder { call: "commit" })?;

        if !self.block_transactions.is_empty() {
            if let Err(err) = self.store.store_transactions(&self.block_transactions) {
                if matches!(err, StorageError::CriticalDoubleSpend { .. }) {
                    // The invariant was violated past advisory validation.
                    // Surface it, do not retry, let the operator look.
                    error!(%err, height, "critical conflict at commit boundary");
                }
                self.new_height = Some(height);
                return Err(err.into());
            }
        }

        let block = Block {
            app_hash: self.block_txn_hash.clone(),
            height,
            transaction_ids: std::mem::take(&mut self.block_txn_ids),
        };
        self.store.store_block(&block)?;
        self.block_transactions.clear();

        info!(
            height,
            transactions = block.transaction_ids.len(),
            app_hash = %block.app_hash,
            "block committed"
        );
        Ok(block.app_hash)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::TesseraKeypair;
    use crate::storage::MemoryStore;
    use crate::transaction::{sign_transaction, TransactionBuilder};
    use serde_json::json;

    fn lifecycle() -> CommitLifecycle {
        CommitLifecycle::new(Arc::new(MemoryStore::new()))
    }

    fn signed_create(kp: &TesseraKeypair, amount: u64) -> Transaction {
        sign_transaction(
            TransactionBuilder::create()
                .signer(kp.public_key())
                .output(&[kp.public_key()], amount)
                .asset_data(json!({"n": amount}))
                .build()
                .unwrap(),
            &[kp.clone()],
        )
        .unwrap()
    }

    #[test]
    fn init_chain_stores_genesis_and_validators() {
        let lc = lifecycle();
        let kp = TesseraKeypair::generate();
        lc.init_chain(vec![ValidatorEntry {
            public_key: kp.public_key(),
            voting_power: 10,
        }])
        .unwrap();

        let genesis = lc.validator().store().get_latest_block().unwrap().unwrap();
        assert_eq!(genesis.height, 0);
        assert_eq!(genesis.app_hash, "");
        assert!(genesis.transaction_ids.is_empty());

        let set = lc
            .validator()
            .store()
            .get_validator_set(Some(1))
            .unwrap()
            .unwrap();
        assert_eq!(set.validators.len(), 1);
        assert_eq!(set.validators[0].voting_power, 10);
    }

    #[test]
    fn full_block_flow_commits_transactions() {
        let mut lc = lifecycle();
        lc.init_chain(vec![]).unwrap();
        let kp = TesseraKeypair::generate();
        let tx = signed_create(&kp, 5);

        lc.begin_block(1);
        lc.deliver_transaction(&tx.to_bytes().unwrap()).unwrap();
        lc.end_block().unwrap();
        let app_hash = lc.commit().unwrap();
        assert!(!app_hash.is_empty());

        let store = lc.validator().store();
        let block = store.get_latest_block().unwrap().unwrap();
        assert_eq!(block.height, 1);
        assert_eq!(block.transaction_ids, vec![tx.id.clone().unwrap()]);
        assert!(store
            .get_transaction(tx.id.as_deref().unwrap())
            .unwrap()
            .is_some());
    }

    #[test]
    fn invalid_delivery_is_rejected_and_not_committed() {
        let mut lc = lifecycle();
        lc.init_chain(vec![]).unwrap();
        let kp = TesseraKeypair::generate();
        let mut tx = signed_create(&kp, 5);
        tx.outputs[0].amount = 6; // tamper

        lc.begin_block(1);
        assert!(matches!(
            lc.deliver(tx.clone()),
            Err(ValidationError::InvalidHash { .. })
        ));
        lc.end_block().unwrap();
        lc.commit().unwrap();

        assert!(lc
            .validator()
            .store()
            .get_transaction(tx.id.as_deref().unwrap())
            .unwrap()
            .is_none());
    }

    #[test]
    fn second_spender_in_one_block_is_rejected_at_delivery() {
        let mut lc = lifecycle();
        lc.init_chain(vec![]).unwrap();
        let alice = TesseraKeypair::generate();
        let bob = TesseraKeypair::generate();
        let carol = TesseraKeypair::generate();
        let create = signed_create(&alice, 5);

        lc.begin_block(1);
        lc.deliver(create.clone()).unwrap();

        let spend = |to: &TesseraKeypair| {
            sign_transaction(
                TransactionBuilder::transfer(create.to_inputs(), create.id.clone().unwrap())
                    .output(&[to.public_key()], 5)
                    .build()
                    .unwrap(),
                &[alice.clone()],
            )
            .unwrap()
        };

        // Chained spend of the in-block create works once.
        lc.deliver(spend(&bob)).unwrap();
        // The second claim on the same output dies at delivery.
        assert!(matches!(
            lc.deliver(spend(&carol)),
            Err(ValidationError::DoubleSpend { .. })
        ));

        lc.end_block().unwrap();
        lc.commit().unwrap();
    }

    #[test]
    fn app_hash_chains_deterministically_and_skips_empty_blocks() {
        let run = || {
            let mut lc = lifecycle();
            lc.init_chain(vec![]).unwrap();
            let kp = TesseraKeypair::from_seed(&[7u8; 32]);
            let tx = signed_create(&kp, 5);

            lc.begin_block(1);
            lc.deliver(tx).unwrap();
            lc.end_block().unwrap();
            let first = lc.commit().unwrap();

            // Empty block: hash carried forward.
            lc.begin_block(2);
            lc.end_block().unwrap();
            let second = lc.commit().unwrap();
            (first, second)
        };

        let (a1, a2) = run();
        let (b1, b2) = run();
        assert_eq!(a1, b1, "same deliveries must chain to the same app hash");
        assert_eq!(a1, a2, "empty block carries the app hash forward");
        assert_eq!(a2, b2);
        assert_ne!(a1, "", "non-empty block must move the hash off genesis");
    }

    #[test]
    fn pre_commit_state_matches_delivered_ids() {
        let mut lc = lifecycle();
        lc.init_chain(vec![]).unwrap();
        let kp = TesseraKeypair::generate();
        let tx = signed_create(&kp, 5);

        lc.begin_block(3);
        lc.deliver(tx.clone()).unwrap();
        lc.end_block().unwrap();

        let pre_commit = lc
            .validator()
            .store()
            .get_pre_commit_state()
            .unwrap()
            .unwrap();
        assert_eq!(pre_commit.height, 3);
        assert_eq!(pre_commit.transaction_ids, vec![tx.id.clone().unwrap()]);
    }

    #[test]
    fn out_of_order_calls_are_errors() {
        let mut lc = lifecycle();
        assert!(matches!(
            lc.end_block(),
            Err(LifecycleError::OutOfOrder { call: "end_block" })
        ));
        assert!(matches!(
            lc.commit(),
            Err(LifecycleError::OutOfOrder { call: "commit" })
        ));
    }

    #[test]
    fn commit_is_terminal_until_next_begin() {
        let mut lc = lifecycle();
        lc.init_chain(vec![]).unwrap();
        lc.begin_block(1);
        lc.end_block().unwrap();
        lc.commit().unwrap();
        // The block is closed; committing again is out of order.
        assert!(matches!(
            lc.commit(),
            Err(LifecycleError::OutOfOrder { .. })
        ));
    }

    #[test]
    fn racing_lifecycles_surface_critical_double_spend_at_commit() {
        // Two lifecycles over one gateway, both validating the same spend
        // against committed state. Validation passes in both (the race),
        // the gateway rejects the second at the commit boundary.
        let store: Arc<dyn StorageGateway> = Arc::new(MemoryStore::new());
        let mut lc_a = CommitLifecycle::new(Arc::clone(&store));
        let mut lc_b = CommitLifecycle::new(Arc::clone(&store));
        lc_a.init_chain(vec![]).unwrap();

        let alice = TesseraKeypair::generate();
        let create = signed_create(&alice, 5);
        store.store_transactions(std::slice::from_ref(&create)).unwrap();

        let spend = |to: TesseraKeypair| {
            sign_transaction(
                TransactionBuilder::transfer(create.to_inputs(), create.id.clone().unwrap())
                    .output(&[to.public_key()], 5)
                    .build()
                    .unwrap(),
                &[alice.clone()],
            )
            .unwrap()
        };

        lc_a.begin_block(1);
        lc_b.begin_block(1);
        lc_a.deliver(spend(TesseraKeypair::generate())).unwrap();
        lc_b.deliver(spend(TesseraKeypair::generate())).unwrap();
        lc_a.end_block().unwrap();
        lc_b.end_block().unwrap();

        assert!(lc_a.commit().is_ok());
        match lc_b.commit() {
            Err(LifecycleError::Storage(StorageError::CriticalDoubleSpend { .. })) => {}
            other => panic!("expected CriticalDoubleSpend at commit, got {other:?}"),
        }
    }
}
