//! Transaction construction via the builder pattern.
//!
//! The [`TransactionBuilder`] enforces a disciplined construction flow:
//! pick the operation through one of the entry points, add outputs and
//! payloads, call `.build()`, and get back an unsigned [`Transaction`]
//! with no id. Signing lives in [`super::signing`] because the id depends
//! on the fulfillments, and the keypairs may not be available at
//! construction time (hardware wallet, remote signer).
//!
//! Spending builders take the inputs produced by
//! [`Transaction::to_inputs`] on the transaction being spent, which is how
//! the owner list and output links travel forward without the caller
//! restating them.

use serde_json::Value;

use super::schema::SchemaError;
use super::types::{AssetRef, Input, Operation, Output, Transaction};
use crate::config::TX_VERSION;
use crate::crypto::TesseraPublicKey;

/// Fluent builder for unsigned [`Transaction`] values.
///
/// # Usage
///
/// ```rust,no_run
/// use tessera_ledger::crypto::TesseraKeypair;
/// use tessera_ledger::transaction::TransactionBuilder;
/// use serde_json::json;
///
/// let alice = TesseraKeypair::generate();
/// let tx = TransactionBuilder::create()
///     .signer(alice.public_key())
///     .output(&[alice.public_key()], 100)
///     .asset_data(json!({"serial": "TSR-0001"}))
///     .build()
///     .unwrap();
/// assert!(tx.id.is_none()); // unsigned until signing
/// ```
pub struct TransactionBuilder {
    operation: Operation,
    inputs: Vec<Input>,
    recipients: Vec<(Vec<TesseraPublicKey>, u64)>,
    assets: Vec<AssetRef>,
    metadata: Option<Value>,
}

impl TransactionBuilder {
    fn new(operation: Operation) -> Self {
        Self {
            operation,
            inputs: Vec::new(),
            recipients: Vec::new(),
            assets: Vec::new(),
            metadata: None,
        }
    }

    /// Start a CREATE: mints a new asset vouched for by its signers.
    ///
    /// The asset definition defaults to an empty object; attach a payload
    /// with [`asset_data`](Self::asset_data).
    pub fn create() -> Self {
        let mut builder = Self::new(Operation::Create);
        builder.assets.push(AssetRef::Definition {
            data: Value::Object(serde_json::Map::new()),
        });
        builder
    }

    /// Start a TRANSFER of the asset `asset_id`, consuming `inputs`
    /// (normally obtained from [`Transaction::to_inputs`]).
    pub fn transfer(inputs: Vec<Input>, asset_id: impl Into<String>) -> Self {
        let mut builder = Self::new(Operation::Transfer);
        builder.inputs = inputs;
        builder.assets.push(AssetRef::Link {
            id: asset_id.into(),
        });
        builder
    }

    /// Start a COMPOSE merging the named assets, consuming `inputs` drawn
    /// from each of them.
    pub fn compose(
        inputs: Vec<Input>,
        asset_ids: impl IntoIterator<Item = String>,
    ) -> Self {
        let mut builder = Self::new(Operation::Compose);
        builder.inputs = inputs;
        builder.assets = asset_ids
            .into_iter()
            .map(|id| AssetRef::Link { id })
            .collect();
        builder
    }

    /// Start a DECOMPOSE splitting one input of the named asset back into
    /// independently spendable outputs.
    pub fn decompose(input: Input, asset_id: impl Into<String>) -> Self {
        let mut builder = Self::new(Operation::Decompose);
        builder.inputs = vec![input];
        builder.assets.push(AssetRef::Link {
            id: asset_id.into(),
        });
        builder
    }

    /// Add a CREATE signer: one owner vouching for the mint.
    ///
    /// Multiple calls accumulate into a single input whose owners must all
    /// sign. Only meaningful for CREATE; spending builders already carry
    /// their inputs.
    pub fn signer(mut self, owner: TesseraPublicKey) -> Self {
        match self.inputs.first_mut() {
            Some(input) if self.operation == Operation::Create => {
                input.owners_before.push(owner);
            }
            _ => self.inputs.push(Input::create(vec![owner])),
        }
        self
    }

    /// Add an output of `amount` addressed to `recipients`.
    pub fn output(mut self, recipients: &[TesseraPublicKey], amount: u64) -> Self {
        self.recipients.push((recipients.to_vec(), amount));
        self
    }

    /// Attach the asset payload of a CREATE.
    pub fn asset_data(mut self, data: Value) -> Self {
        if let Some(AssetRef::Definition { data: slot }) = self.assets.first_mut() {
            *slot = data;
        }
        self
    }

    /// Attach free-form metadata.
    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Consume the builder and produce an unsigned transaction.
    ///
    /// Outputs are materialized here, so an empty recipient list surfaces
    /// as [`SchemaError::EmptyPublicKeys`] instead of silently building a
    /// transaction no one can spend. The id stays `None` until signing.
    pub fn build(self) -> Result<Transaction, SchemaError> {
        let outputs = self
            .recipients
            .into_iter()
            .map(|(keys, amount)| Output::new(keys, amount))
            .collect::<Result<Vec<Output>, SchemaError>>()?;

        Ok(Transaction {
            id: None,
            version: TX_VERSION,
            operation: self.operation,
            inputs: self.inputs,
            outputs,
            assets: self.assets,
            metadata: self.metadata,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::TesseraKeypair;
    use serde_json::json;

    #[test]
    fn create_builder_shapes_a_mint() {
        let kp = TesseraKeypair::generate();
        let tx = TransactionBuilder::create()
            .signer(kp.public_key())
            .output(&[kp.public_key()], 100)
            .asset_data(json!({"serial": "TSR-0001"}))
            .build()
            .unwrap();

        assert_eq!(tx.operation, Operation::Create);
        assert!(tx.id.is_none());
        assert_eq!(tx.inputs.len(), 1);
        assert!(tx.inputs[0].fulfills.is_none());
        assert_eq!(tx.outputs.len(), 1);
        assert_eq!(tx.outputs[0].amount, 100);
        assert!(tx.assets[0].is_definition());
    }

    #[test]
    fn multiple_signers_fold_into_one_input() {
        let a = TesseraKeypair::generate();
        let b = TesseraKeypair::generate();
        let tx = TransactionBuilder::create()
            .signer(a.public_key())
            .signer(b.public_key())
            .output(&[a.public_key()], 1)
            .build()
            .unwrap();

        assert_eq!(tx.inputs.len(), 1);
        assert_eq!(
            tx.inputs[0].owners_before,
            vec![a.public_key(), b.public_key()]
        );
    }

    #[test]
    fn transfer_builder_carries_inputs_and_link() {
        let kp = TesseraKeypair::generate();
        let asset_id = "a".repeat(64);
        let input = Input::spend(
            super::super::types::TransactionLink::new(asset_id.clone(), 0),
            vec![kp.public_key()],
        );

        let tx = TransactionBuilder::transfer(vec![input], asset_id.clone())
            .output(&[kp.public_key()], 5)
            .build()
            .unwrap();

        assert_eq!(tx.operation, Operation::Transfer);
        assert_eq!(tx.declared_asset_ids(), vec![asset_id.as_str()]);
        assert_eq!(tx.inputs.len(), 1);
    }

    #[test]
    fn compose_builder_takes_many_assets() {
        let kp = TesseraKeypair::generate();
        let ids = vec!["a".repeat(64), "b".repeat(64)];
        let tx = TransactionBuilder::compose(Vec::new(), ids.clone())
            .output(&[kp.public_key()], 3)
            .build()
            .unwrap();

        assert_eq!(tx.operation, Operation::Compose);
        assert_eq!(
            tx.declared_asset_ids(),
            ids.iter().map(String::as_str).collect::<Vec<_>>()
        );
    }

    #[test]
    fn decompose_builder_takes_one_input() {
        let kp = TesseraKeypair::generate();
        let asset_id = "c".repeat(64);
        let input = Input::spend(
            super::super::types::TransactionLink::new(asset_id.clone(), 0),
            vec![kp.public_key()],
        );
        let tx = TransactionBuilder::decompose(input, asset_id)
            .output(&[kp.public_key()], 1)
            .output(&[kp.public_key()], 2)
            .build()
            .unwrap();

        assert_eq!(tx.operation, Operation::Decompose);
        assert_eq!(tx.inputs.len(), 1);
        assert_eq!(tx.outputs.len(), 2);
    }

    #[test]
    fn empty_recipient_list_is_rejected_at_build() {
        let result = TransactionBuilder::create().output(&[], 10).build();
        assert!(matches!(result, Err(SchemaError::EmptyPublicKeys)));
    }

    #[test]
    fn metadata_is_attached_verbatim() {
        let kp = TesseraKeypair::generate();
        let tx = TransactionBuilder::create()
            .signer(kp.public_key())
            .output(&[kp.public_key()], 1)
            .metadata(json!({"note": "hello"}))
            .build()
            .unwrap();
        assert_eq!(tx.metadata, Some(json!({"note": "hello"})));
    }
}
