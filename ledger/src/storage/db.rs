//! # TesseraDB — Persistent Storage Engine
//!
//! The sled-backed [`StorageGateway`] engine. All on-disk data flows
//! through this module.
//!
//! ## Tree Layout
//!
//! sled organizes data into named "trees" (analogous to column families in
//! RocksDB or tables in SQL). Tree names come from the [`StorageConfig`]
//! passed at construction; the defaults are:
//!
//! | Tree             | Key                          | Value                    |
//! |------------------|------------------------------|--------------------------|
//! | `transactions`   | tx id (UTF-8 hex)            | transaction JSON         |
//! | `outputs`        | owner b58 + NUL + seq (8B BE)| `bincode(TransactionLink)`|
//! | `spends`         | `txid:index` (UTF-8)         | spender tx id (UTF-8)    |
//! | `blocks`         | height (8B BE)               | `bincode(Block)`         |
//! | `validator_sets` | height (8B BE)               | `bincode(ValidatorSet)`  |
//! | `elections`      | election id (UTF-8)          | `bincode(Election)`      |
//! | `metadata`       | key (UTF-8)                  | value (bytes)            |
//!
//! Heights and output sequence numbers are big-endian so lexicographic
//! ordering matches numeric ordering; range scans and "latest" lookups
//! fall out of the key encoding for free. Transactions are stored as JSON
//! rather than bincode because they carry free-form JSON payloads (asset
//! data, metadata) that only a self-describing format can round-trip.
//!
//! ## Atomicity
//!
//! `store_transactions` runs inside one multi-tree sled transaction. The
//! spend-index insert checks for an existing key *inside* the transaction,
//! which makes read-then-conditionally-insert a single atomic
//! check-and-set: of two racing spenders, sled serializes one after the
//! other and the second sees the first's write and aborts with
//! `CriticalDoubleSpend`. Block storage uses the same trick on a
//! latest-height register to enforce strictly increasing heights.

use std::path::Path;

use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use sled::{Db, Tree};

use super::gateway::{spend_key, StorageGateway, StorageError};
use crate::config::StorageConfig;
use crate::consensus::{Block, Election, PreCommitState, ValidatorSet};
use crate::crypto::TesseraPublicKey;
use crate::transaction::{Transaction, TransactionLink};

/// Well-known key in the `metadata` tree for the latest block height.
const META_LATEST_HEIGHT: &[u8] = b"latest_block_height";

/// Well-known key in the `metadata` tree for the output sequence counter,
/// which gives the ownership index its stable insertion order.
const META_OUTPUT_SEQ: &[u8] = b"output_seq";

/// Well-known key in the `metadata` tree for the pre-commit breadcrumb.
const META_PRE_COMMIT: &[u8] = b"pre_commit_state";

// ---------------------------------------------------------------------------
// TesseraDB
// ---------------------------------------------------------------------------

/// Persistent [`StorageGateway`] engine over sled.
///
/// # Thread Safety
///
/// sled trees support lock-free concurrent reads and serializable
/// transactions, so `TesseraDB` can be shared across threads via
/// `Arc<TesseraDB>` without external synchronization.
#[derive(Debug, Clone)]
pub struct TesseraDB {
    db: Db,
    transactions: Tree,
    outputs: Tree,
    spends: Tree,
    blocks: Tree,
    validator_sets: Tree,
    elections: Tree,
    metadata: Tree,
}

impl TesseraDB {
    /// Open or create a database at the given filesystem path with the
    /// given table layout.
    pub fn open<P: AsRef<Path>>(path: P, config: &StorageConfig) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        Self::from_db(db, config)
    }

    /// Create a temporary database that is cleaned up on drop.
    ///
    /// Ideal for tests: no filesystem residue, default table layout.
    pub fn open_temporary() -> Result<Self, StorageError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db, &StorageConfig::default())
    }

    /// Build a gateway over an already-open sled database.
    ///
    /// sled holds an exclusive file lock per path, so two logical ledgers
    /// sharing one physical database must share the `Db` handle and keep
    /// their tables apart via [`StorageConfig::with_prefix`].
    pub fn with_db(db: Db, config: &StorageConfig) -> Result<Self, StorageError> {
        Self::from_db(db, config)
    }

    fn from_db(db: Db, config: &StorageConfig) -> Result<Self, StorageError> {
        Ok(Self {
            transactions: db.open_tree(config.transactions_table.as_bytes())?,
            outputs: db.open_tree(config.outputs_table.as_bytes())?,
            spends: db.open_tree(config.spends_table.as_bytes())?,
            blocks: db.open_tree(config.blocks_table.as_bytes())?,
            validator_sets: db.open_tree(config.validator_sets_table.as_bytes())?,
            elections: db.open_tree(config.elections_table.as_bytes())?,
            metadata: db.open_tree(config.metadata_table.as_bytes())?,
            db,
        })
    }

    /// Block until all pending writes are durable on disk.
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}

/// Ownership-index key: owner base58, NUL separator, sequence number.
/// Base58 never contains NUL, so prefixes cannot collide across owners.
fn output_key(owner_b58: &str, seq: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(owner_b58.len() + 9);
    key.extend_from_slice(owner_b58.as_bytes());
    key.push(0x00);
    key.extend_from_slice(&seq.to_be_bytes());
    key
}

fn decode_u64(bytes: &[u8]) -> Result<u64, StorageError> {
    bytes
        .try_into()
        .map(u64::from_be_bytes)
        .map_err(|_| StorageError::Serialization("invalid big-endian u64".to_string()))
}

/// A transaction flattened into the exact bytes its inserts need, so the
/// sled transaction closure (which may re-run on conflict) does no
/// fallible serialization work.
struct Prepared {
    id: String,
    body: Vec<u8>,
    spends: Vec<(String, TransactionLink)>,
    outputs: Vec<(Vec<String>, Vec<u8>)>,
}

fn prepare(tx: &Transaction) -> Result<Prepared, StorageError> {
    let id = tx
        .id
        .clone()
        .ok_or(StorageError::MissingTransactionId)?;
    let body = serde_json::to_vec(tx).map_err(|e| StorageError::Serialization(e.to_string()))?;

    let spends = tx
        .spent_links()
        .into_iter()
        .map(|link| {
            (
                spend_key(&link.transaction_id, link.output_index),
                link.clone(),
            )
        })
        .collect();

    let mut outputs = Vec::with_capacity(tx.outputs.len());
    for (index, output) in tx.outputs.iter().enumerate() {
        let link = TransactionLink::new(id.clone(), index as u32);
        let link_bytes =
            bincode::serialize(&link).map_err(|e| StorageError::Serialization(e.to_string()))?;
        let mut owners: Vec<String> = Vec::with_capacity(output.public_keys.len());
        for pk in &output.public_keys {
            let b58 = pk.to_base58();
            // The same key listed twice on one output still owns it once.
            if !owners.contains(&b58) {
                owners.push(b58);
            }
        }
        outputs.push((owners, link_bytes));
    }

    Ok(Prepared {
        id,
        body,
        spends,
        outputs,
    })
}

impl StorageGateway for TesseraDB {
    fn store_transactions(&self, transactions: &[Transaction]) -> Result<(), StorageError> {
        let prepared = transactions
            .iter()
            .map(prepare)
            .collect::<Result<Vec<_>, StorageError>>()?;

        let trees: &[&Tree] = &[
            &self.transactions,
            &self.outputs,
            &self.spends,
            &self.metadata,
        ];
        let result = trees.transaction(|tts| {
            let (txs_t, outs_t, spends_t, meta_t) = (&tts[0], &tts[1], &tts[2], &tts[3]);

            let mut seq = match meta_t.get(META_OUTPUT_SEQ)? {
                Some(bytes) => decode_u64(&bytes).map_err(ConflictableTransactionError::Abort)?,
                None => 0,
            };

            for p in &prepared {
                // The check-and-set: a spend key that already exists, from
                // committed state or earlier in this very batch, aborts
                // everything. This is the enforcement point of the
                // double-spend invariant.
                for (key, link) in &p.spends {
                    if let Some(existing) = spends_t.get(key.as_bytes())? {
                        let spender = String::from_utf8_lossy(&existing).to_string();
                        return Err(ConflictableTransactionError::Abort(
                            StorageError::CriticalDoubleSpend {
                                link: link.clone(),
                                spender,
                            },
                        ));
                    }
                    spends_t.insert(key.as_bytes(), p.id.as_bytes())?;
                }

                txs_t.insert(p.id.as_bytes(), p.body.clone())?;

                for (owners, link_bytes) in &p.outputs {
                    for owner in owners {
                        outs_t.insert(output_key(owner, seq), link_bytes.clone())?;
                        seq += 1;
                    }
                }
            }

            meta_t.insert(META_OUTPUT_SEQ, &seq.to_be_bytes()[..])?;
            Ok(())
        });

        match result {
            Ok(()) => {
                self.db.flush()?;
                Ok(())
            }
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(StorageError::Backend(e)),
        }
    }

    fn get_transaction(&self, id: &str) -> Result<Option<Transaction>, StorageError> {
        match self.transactions.get(id.as_bytes())? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StorageError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    fn get_spent(
        &self,
        transaction_id: &str,
        output_index: u32,
    ) -> Result<Option<Transaction>, StorageError> {
        let key = spend_key(transaction_id, output_index);
        match self.spends.get(key.as_bytes())? {
            Some(spender_bytes) => {
                let spender = String::from_utf8_lossy(&spender_bytes).to_string();
                self.get_transaction(&spender)
            }
            None => Ok(None),
        }
    }

    fn get_outputs_by_public_key(
        &self,
        public_key: &TesseraPublicKey,
    ) -> Result<Vec<TransactionLink>, StorageError> {
        let mut prefix = public_key.to_base58().into_bytes();
        prefix.push(0x00);

        let mut links = Vec::new();
        for entry in self.outputs.scan_prefix(&prefix) {
            let (_key, value) = entry?;
            let link: TransactionLink = bincode::deserialize(&value)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            links.push(link);
        }
        Ok(links)
    }

    fn store_block(&self, block: &Block) -> Result<(), StorageError> {
        let height_key = block.height.to_be_bytes();
        let value =
            bincode::serialize(block).map_err(|e| StorageError::Serialization(e.to_string()))?;

        let result = (&self.blocks, &self.metadata).transaction(|(blocks_t, meta_t)| {
            if let Some(latest_bytes) = meta_t.get(META_LATEST_HEIGHT)? {
                let latest =
                    decode_u64(&latest_bytes).map_err(ConflictableTransactionError::Abort)?;
                if block.height <= latest {
                    return Err(ConflictableTransactionError::Abort(
                        StorageError::NonMonotonicHeight {
                            latest,
                            attempted: block.height,
                        },
                    ));
                }
            }
            blocks_t.insert(&height_key[..], value.clone())?;
            meta_t.insert(META_LATEST_HEIGHT, &height_key[..])?;
            Ok(())
        });

        match result {
            Ok(()) => {
                self.db.flush()?;
                Ok(())
            }
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(StorageError::Backend(e)),
        }
    }

    fn get_block(&self, height: u64) -> Result<Option<Block>, StorageError> {
        match self.blocks.get(height.to_be_bytes())? {
            Some(bytes) => bincode::deserialize(&bytes)
                .map(Some)
                .map_err(|e| StorageError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    fn get_latest_block(&self) -> Result<Option<Block>, StorageError> {
        match self.metadata.get(META_LATEST_HEIGHT)? {
            Some(height_bytes) => self.get_block(decode_u64(&height_bytes)?),
            None => Ok(None),
        }
    }

    fn store_validator_set(&self, set: &ValidatorSet) -> Result<(), StorageError> {
        let value =
            bincode::serialize(set).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.validator_sets
            .insert(set.height.to_be_bytes(), value)?;
        Ok(())
    }

    fn get_validator_set(
        &self,
        height: Option<u64>,
    ) -> Result<Option<ValidatorSet>, StorageError> {
        let entry = match height {
            Some(h) => {
                let upper = h.to_be_bytes();
                self.validator_sets.range(..=&upper[..]).next_back()
            }
            None => self.validator_sets.iter().next_back(),
        };
        match entry {
            Some(result) => {
                let (_key, value) = result?;
                bincode::deserialize(&value)
                    .map(Some)
                    .map_err(|e| StorageError::Serialization(e.to_string()))
            }
            None => Ok(None),
        }
    }

    fn store_election(&self, election: &Election) -> Result<(), StorageError> {
        let value =
            bincode::serialize(election).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.elections
            .insert(election.election_id.as_bytes(), value)?;
        Ok(())
    }

    fn get_election(&self, election_id: &str) -> Result<Option<Election>, StorageError> {
        match self.elections.get(election_id.as_bytes())? {
            Some(bytes) => bincode::deserialize(&bytes)
                .map(Some)
                .map_err(|e| StorageError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    fn store_pre_commit_state(&self, state: &PreCommitState) -> Result<(), StorageError> {
        let value =
            bincode::serialize(state).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.metadata.insert(META_PRE_COMMIT, value)?;
        Ok(())
    }

    fn get_pre_commit_state(&self) -> Result<Option<PreCommitState>, StorageError> {
        match self.metadata.get(META_PRE_COMMIT)? {
            Some(bytes) => bincode::deserialize(&bytes)
                .map(Some)
                .map_err(|e| StorageError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
