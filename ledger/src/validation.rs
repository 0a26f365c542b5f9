//! # Transaction Validation
//!
//! The five-stage pipeline every candidate transaction walks before it may
//! touch storage, in cost order:
//!
//! 1. **Schema & identity** — structural shape, then recompute the content
//!    hash and compare it to the claimed id.
//! 2. **Duplicate** — a transaction already committed, or already accepted
//!    earlier in the in-progress block, is rejected outright.
//! 3. **Resolution & authorization** — resolve each input's source output
//!    (committed state first, then the in-flight candidate overlay) and
//!    verify its fulfillment against the output's stored condition. CREATE
//!    inputs authorize against a condition derived from `owners_before`.
//! 4. **Double spend** — duplicates within the transaction, claims by
//!    overlay candidates, then the committed spend index.
//! 5. **Conservation** — resolved input value must equal output value.
//!
//! Validation is a pure function of the transaction, committed state, and
//! the explicitly passed candidate list. It mutates nothing, takes no
//! locks, and is safe to run concurrently for independent transactions.
//! The advisory double-spend check here narrows the race window; the
//! storage gateway's atomic insert closes it, surfacing any write-time
//! conflict as [`ValidationError::CriticalDoubleSpend`] — a severe
//! integrity signal that is never retried.

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::crypto::Condition;
use crate::fastquery::FastQuery;
use crate::storage::{StorageError, StorageGateway};
use crate::transaction::{
    validate_schema, Operation, Output, SchemaError, Transaction, TransactionLink,
};

// ---------------------------------------------------------------------------
// ValidationError
// ---------------------------------------------------------------------------

/// Terminal rejection of a transaction. No variant is retryable except
/// `Operation`, which reports a backend failure rather than a verdict on
/// the transaction itself.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// The body does not hash to the claimed id: tampering or corruption.
    #[error("transaction id mismatch: body hashes to {expected}, transaction claims {actual}")]
    InvalidHash { expected: String, actual: String },

    /// A fulfillment fails to satisfy the condition it must open.
    #[error("input {input_index} does not cryptographically satisfy its spending condition")]
    InvalidSignature { input_index: usize },

    /// An input references an unknown transaction or an out-of-range
    /// output index.
    #[error("input references a nonexistent output: {link}")]
    InputDoesNotExist { link: TransactionLink },

    /// Re-submission of a transaction already committed or already
    /// accepted in the in-progress block.
    #[error("transaction {id} is already known")]
    DuplicateTransaction { id: String },

    /// A resolved input carries an asset the transaction does not declare.
    #[error("input {link} carries asset {found}, which the transaction does not declare")]
    AssetMismatch {
        link: TransactionLink,
        found: String,
    },

    /// A declared asset has no input backing it (COMPOSE only).
    #[error("declared asset {id} is not represented by any input")]
    UnrepresentedAsset { id: String },

    /// Advisory-stage conflict: the output is already claimed.
    #[error("double spend: output {link} is already claimed by transaction {spender}")]
    DoubleSpend {
        link: TransactionLink,
        spender: String,
    },

    /// Write-time conflict that escaped advisory validation. Requires
    /// operator attention; never retried.
    #[error(
        "critical double spend past validation: output {link} was committed by {spender}"
    )]
    CriticalDoubleSpend {
        link: TransactionLink,
        spender: String,
    },

    /// Conservation violated; both sums are carried for diagnostics.
    #[error("amount conservation violated: inputs sum to {input_sum}, outputs sum to {output_sum}")]
    Amount { input_sum: u128, output_sum: u128 },

    /// Backend failure unrelated to ledger invariants. The caller may
    /// retry with backoff; the validator never does.
    #[error("backend operation failed: {0}")]
    Operation(String),
}

impl From<StorageError> for ValidationError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::CriticalDoubleSpend { link, spender } => {
                ValidationError::CriticalDoubleSpend { link, spender }
            }
            other => ValidationError::Operation(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

/// One resolved spending input: where it points, what it found there.
struct ResolvedInput {
    index: usize,
    link: TransactionLink,
    output: Output,
    asset_id: String,
}

/// The validation engine.
///
/// Holds only handles to the storage gateway; all mutable state lives
/// behind it. Clone-cheap and shareable across threads.
#[derive(Clone)]
pub struct Validator {
    store: Arc<dyn StorageGateway>,
    fastquery: FastQuery,
}

impl Validator {
    pub fn new(store: Arc<dyn StorageGateway>) -> Self {
        let fastquery = FastQuery::new(Arc::clone(&store));
        Self { store, fastquery }
    }

    /// The gateway this validator reads from.
    pub fn store(&self) -> &Arc<dyn StorageGateway> {
        &self.store
    }

    /// The read layer this validator consults for spend status.
    pub fn fastquery(&self) -> &FastQuery {
        &self.fastquery
    }

    /// Run the full pipeline against committed state plus the
    /// `current_transactions` overlay (transactions accepted earlier in
    /// the same in-progress block; pass `&[]` outside block context).
    ///
    /// The overlay is read three ways: duplicate ids are rejected, its
    /// claimed outputs count as spent, and its own outputs are resolvable
    /// so a block may chain transactions.
    pub fn validate_transaction(
        &self,
        tx: &Transaction,
        current_transactions: &[Transaction],
    ) -> Result<(), ValidationError> {
        validate_schema(tx)?;

        let id = tx.id.as_deref().ok_or(SchemaError::MissingId)?;
        let expected = tx.compute_id()?;
        if expected != id {
            return Err(ValidationError::InvalidHash {
                expected,
                actual: id.to_string(),
            });
        }

        if current_transactions
            .iter()
            .any(|c| c.id.as_deref() == Some(id))
            || self.store.get_transaction(id)?.is_some()
        {
            return Err(ValidationError::DuplicateTransaction { id: id.to_string() });
        }

        let message = tx.signable_bytes()?;

        if tx.operation == Operation::Create {
            // The mint authorizes against its declared owners; there is
            // no prior output to consult.
            for (index, input) in tx.inputs.iter().enumerate() {
                let condition = Condition::from_owners(&input.owners_before)
                    .ok_or(SchemaError::EmptyOwnersBefore { index })?;
                self.check_fulfillment(&condition, input, index, &message)?;
            }
            return Ok(());
        }

        let resolved = self.resolve_inputs(tx, current_transactions)?;

        for r in &resolved {
            self.check_fulfillment(&r.output.condition, &tx.inputs[r.index], r.index, &message)?;
        }

        check_asset_consistency(tx, &resolved)?;
        self.check_double_spends(tx, id, current_transactions)?;

        let input_sum: u128 = resolved.iter().map(|r| r.output.amount as u128).sum();
        let output_sum: u128 = tx.outputs.iter().map(|o| o.amount as u128).sum();
        if input_sum != output_sum {
            return Err(ValidationError::Amount {
                input_sum,
                output_sum,
            });
        }

        Ok(())
    }

    /// Boolean convenience over [`validate_transaction`], logging the
    /// rejection reason at debug level.
    ///
    /// [`validate_transaction`]: Self::validate_transaction
    pub fn is_valid_transaction(
        &self,
        tx: &Transaction,
        current_transactions: &[Transaction],
    ) -> bool {
        match self.validate_transaction(tx, current_transactions) {
            Ok(()) => true,
            Err(err) => {
                debug!(id = tx.id.as_deref().unwrap_or("<unsigned>"), %err, "transaction rejected");
                false
            }
        }
    }

    fn check_fulfillment(
        &self,
        condition: &Condition,
        input: &crate::transaction::Input,
        index: usize,
        message: &[u8],
    ) -> Result<(), ValidationError> {
        let fulfillment = input
            .fulfillment
            .as_ref()
            .ok_or(SchemaError::UnsignedInput { index })?;
        if !condition.is_fulfilled_by(fulfillment, message) {
            return Err(ValidationError::InvalidSignature { input_index: index });
        }
        Ok(())
    }

    /// Resolve every input's source output, consulting committed state
    /// first and the candidate overlay second.
    fn resolve_inputs(
        &self,
        tx: &Transaction,
        current_transactions: &[Transaction],
    ) -> Result<Vec<ResolvedInput>, ValidationError> {
        let mut resolved = Vec::with_capacity(tx.inputs.len());
        for (index, input) in tx.inputs.iter().enumerate() {
            let link = input.fulfills.as_ref().ok_or(SchemaError::MissingFulfills {
                operation: tx.operation,
                index,
            })?;

            let source = match self.store.get_transaction(&link.transaction_id)? {
                Some(committed) => committed,
                None => current_transactions
                    .iter()
                    .find(|c| c.id.as_deref() == Some(link.transaction_id.as_str()))
                    .cloned()
                    .ok_or_else(|| ValidationError::InputDoesNotExist { link: link.clone() })?,
            };

            let output = source
                .output(link.output_index)
                .cloned()
                .ok_or_else(|| ValidationError::InputDoesNotExist { link: link.clone() })?;
            let asset_id = source
                .spendable_asset_id()
                .ok_or_else(|| ValidationError::InputDoesNotExist { link: link.clone() })?
                .to_string();

            resolved.push(ResolvedInput {
                index,
                link: link.clone(),
                output,
                asset_id,
            });
        }
        Ok(resolved)
    }

    /// The advisory double-spend check, three layers deep: duplicates
    /// within this transaction, claims by overlay candidates, then the
    /// committed spend index.
    fn check_double_spends(
        &self,
        tx: &Transaction,
        id: &str,
        current_transactions: &[Transaction],
    ) -> Result<(), ValidationError> {
        let mut claimed: HashSet<&TransactionLink> = HashSet::new();
        for link in tx.spent_links() {
            if !claimed.insert(link) {
                return Err(ValidationError::DoubleSpend {
                    link: link.clone(),
                    spender: id.to_string(),
                });
            }
        }

        for candidate in current_transactions {
            for link in candidate.spent_links() {
                if claimed.contains(link) {
                    return Err(ValidationError::DoubleSpend {
                        link: link.clone(),
                        spender: candidate.id.clone().unwrap_or_default(),
                    });
                }
            }
        }

        for link in tx.spent_links() {
            if let Some(spender) = self
                .fastquery
                .get_spent(&link.transaction_id, link.output_index)?
            {
                return Err(ValidationError::DoubleSpend {
                    link: link.clone(),
                    spender: spender.id.unwrap_or_default(),
                });
            }
        }

        Ok(())
    }
}

/// Every resolved input must carry a declared asset, and for COMPOSE
/// every declared asset must be backed by at least one input.
fn check_asset_consistency(
    tx: &Transaction,
    resolved: &[ResolvedInput],
) -> Result<(), ValidationError> {
    let declared = tx.declared_asset_ids();

    for r in resolved {
        if !declared.contains(&r.asset_id.as_str()) {
            return Err(ValidationError::AssetMismatch {
                link: r.link.clone(),
                found: r.asset_id.clone(),
            });
        }
    }

    if tx.operation == Operation::Compose {
        for want in declared {
            if !resolved.iter().any(|r| r.asset_id == want) {
                return Err(ValidationError::UnrepresentedAsset {
                    id: want.to_string(),
                });
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
