//! Structural validation of transactions.
//!
//! Schema validation is the cheapest gate in the pipeline and runs before
//! any cryptography or storage access. It checks shape only: a transaction
//! that passes here can still be rejected for a bad hash, a bad signature,
//! a dangling input, a double spend, or an amount mismatch. A transaction
//! that fails here is rejected without touching the backend at all.

use thiserror::Error;

use super::types::{Operation, Transaction};
use crate::config::{MAX_TX_INPUTS, MAX_TX_OUTPUTS, RESERVED_KEY_CHARS, TX_VERSION};

// ---------------------------------------------------------------------------
// SchemaError
// ---------------------------------------------------------------------------

/// Structural rejection of a transaction, raised before any cryptographic
/// or storage work happens.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The bytes did not deserialize into a transaction at all: missing
    /// required fields, wrong types, negative or fractional amounts,
    /// malformed keys or signatures.
    #[error("malformed transaction: {0}")]
    Malformed(String),

    /// Serialization failed while canonicalizing. Should be unreachable
    /// for well-typed transactions; surfaced rather than swallowed.
    #[error("serialization failure: {0}")]
    Serialization(String),

    #[error("transaction has no id; sign it before validating")]
    MissingId,

    #[error("unsupported transaction version {version}, expected {expected}", expected = TX_VERSION)]
    UnsupportedVersion { version: u16 },

    #[error("transaction has no inputs")]
    EmptyInputs,

    #[error("transaction has no outputs")]
    EmptyOutputs,

    #[error("too many inputs: {count} exceeds the maximum of {max}", max = MAX_TX_INPUTS)]
    TooManyInputs { count: usize },

    #[error("too many outputs: {count} exceeds the maximum of {max}", max = MAX_TX_OUTPUTS)]
    TooManyOutputs { count: usize },

    #[error("output {index} has amount 0; amounts must be positive")]
    ZeroAmount { index: usize },

    #[error("output has an empty public key list")]
    EmptyPublicKeys,

    #[error("input {index} has an empty owners_before list")]
    EmptyOwnersBefore { index: usize },

    #[error("input {index} carries no fulfillment; the transaction is unsigned")]
    UnsignedInput { index: usize },

    #[error("CREATE input {index} must not reference a prior output")]
    CreateWithFulfills { index: usize },

    #[error("{operation} input {index} must reference a prior output")]
    MissingFulfills { operation: Operation, index: usize },

    #[error("CREATE must carry exactly one asset definition, found {actual} asset entries")]
    CreateAssetShape { actual: usize },

    #[error("{operation} must reference assets by id, not define new ones")]
    AssetDefinitionInSpend { operation: Operation },

    #[error("TRANSFER must reference exactly one asset, found {actual}")]
    TransferAssetCount { actual: usize },

    #[error("COMPOSE must reference at least two assets, found {actual}")]
    ComposeAssetCount { actual: usize },

    #[error("DECOMPOSE must reference exactly one asset, found {actual}")]
    DecomposeAssetCount { actual: usize },

    #[error("DECOMPOSE splits exactly one input, found {actual}")]
    DecomposeInputCount { actual: usize },

    #[error("DECOMPOSE must split into at least two outputs, found {actual}")]
    DecomposeOutputCount { actual: usize },

    #[error("reserved character in key {key:?}: keys must not contain '.', '$' or NUL")]
    ReservedKeyCharacter { key: String },
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate the structural rules for a signed transaction.
///
/// The checks, cheapest first:
///
/// 1. id present, version supported.
/// 2. input/output counts within bounds.
/// 3. every output has a positive amount and at least one owner.
/// 4. every input is signed, has owners, and carries a `fulfills`
///    reference exactly when the operation spends.
/// 5. asset shape matches the operation (definition vs. link, counts).
/// 6. DECOMPOSE cardinality: one input, two or more outputs.
/// 7. no reserved characters in asset definition or metadata keys.
pub fn validate_schema(tx: &Transaction) -> Result<(), SchemaError> {
    if tx.id.is_none() {
        return Err(SchemaError::MissingId);
    }
    if tx.version != TX_VERSION {
        return Err(SchemaError::UnsupportedVersion {
            version: tx.version,
        });
    }

    if tx.inputs.is_empty() {
        return Err(SchemaError::EmptyInputs);
    }
    if tx.outputs.is_empty() {
        return Err(SchemaError::EmptyOutputs);
    }
    if tx.inputs.len() > MAX_TX_INPUTS {
        return Err(SchemaError::TooManyInputs {
            count: tx.inputs.len(),
        });
    }
    if tx.outputs.len() > MAX_TX_OUTPUTS {
        return Err(SchemaError::TooManyOutputs {
            count: tx.outputs.len(),
        });
    }

    for (index, output) in tx.outputs.iter().enumerate() {
        if output.amount == 0 {
            return Err(SchemaError::ZeroAmount { index });
        }
        if output.public_keys.is_empty() {
            return Err(SchemaError::EmptyPublicKeys);
        }
    }

    for (index, input) in tx.inputs.iter().enumerate() {
        if input.owners_before.is_empty() {
            return Err(SchemaError::EmptyOwnersBefore { index });
        }
        if input.fulfillment.is_none() {
            return Err(SchemaError::UnsignedInput { index });
        }
        match (tx.operation, &input.fulfills) {
            (Operation::Create, Some(_)) => {
                return Err(SchemaError::CreateWithFulfills { index });
            }
            (op, None) if op.spends_inputs() => {
                return Err(SchemaError::MissingFulfills {
                    operation: op,
                    index,
                });
            }
            _ => {}
        }
    }

    validate_asset_shape(tx)?;

    if let Operation::Decompose = tx.operation {
        if tx.inputs.len() != 1 {
            return Err(SchemaError::DecomposeInputCount {
                actual: tx.inputs.len(),
            });
        }
        if tx.outputs.len() < 2 {
            return Err(SchemaError::DecomposeOutputCount {
                actual: tx.outputs.len(),
            });
        }
    }

    for asset in &tx.assets {
        if let super::types::AssetRef::Definition { data } = asset {
            check_document_keys(data)?;
        }
    }
    if let Some(metadata) = &tx.metadata {
        check_document_keys(metadata)?;
    }

    Ok(())
}

/// Asset-reference cardinality and kind per operation.
fn validate_asset_shape(tx: &Transaction) -> Result<(), SchemaError> {
    match tx.operation {
        Operation::Create => {
            if tx.assets.len() != 1 || !tx.assets[0].is_definition() {
                return Err(SchemaError::CreateAssetShape {
                    actual: tx.assets.len(),
                });
            }
        }
        op => {
            if tx.assets.iter().any(|a| a.is_definition()) {
                return Err(SchemaError::AssetDefinitionInSpend { operation: op });
            }
            match op {
                Operation::Transfer if tx.assets.len() != 1 => {
                    return Err(SchemaError::TransferAssetCount {
                        actual: tx.assets.len(),
                    });
                }
                Operation::Compose if tx.assets.len() < 2 => {
                    return Err(SchemaError::ComposeAssetCount {
                        actual: tx.assets.len(),
                    });
                }
                Operation::Decompose if tx.assets.len() != 1 => {
                    return Err(SchemaError::DecomposeAssetCount {
                        actual: tx.assets.len(),
                    });
                }
                _ => {}
            }
        }
    }
    Ok(())
}

/// Walk a JSON document and reject any object key containing a reserved
/// character. Backends index these documents directly; `.` and `$` are
/// query syntax in document stores and NUL breaks key-value encodings.
fn check_document_keys(value: &serde_json::Value) -> Result<(), SchemaError> {
    match value {
        serde_json::Value::Object(map) => {
            for (key, nested) in map {
                if key.chars().any(|c| RESERVED_KEY_CHARS.contains(&c)) {
                    return Err(SchemaError::ReservedKeyCharacter { key: key.clone() });
                }
                check_document_keys(nested)?;
            }
            Ok(())
        }
        serde_json::Value::Array(items) => {
            for item in items {
                check_document_keys(item)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::super::types::{AssetRef, Input, Output, Transaction, TransactionLink};
    use super::*;
    use crate::crypto::{Fulfillment, TesseraKeypair};
    use serde_json::json;

    fn dummy_fulfillment(kp: &TesseraKeypair) -> Fulfillment {
        Fulfillment::Ed25519 {
            public_key: kp.public_key(),
            signature: kp.sign(b"schema tests do not verify signatures"),
        }
    }

    fn signed_create(kp: &TesseraKeypair) -> Transaction {
        let mut input = Input::create(vec![kp.public_key()]);
        input.fulfillment = Some(dummy_fulfillment(kp));
        let mut tx = Transaction {
            id: None,
            version: TX_VERSION,
            operation: Operation::Create,
            inputs: vec![input],
            outputs: vec![Output::new(vec![kp.public_key()], 10).unwrap()],
            assets: vec![AssetRef::Definition { data: json!({}) }],
            metadata: None,
        };
        tx.id = Some(tx.compute_id().unwrap());
        tx
    }

    fn signed_transfer(kp: &TesseraKeypair, asset_id: &str) -> Transaction {
        let mut input = Input::spend(
            TransactionLink::new(asset_id.to_string(), 0),
            vec![kp.public_key()],
        );
        input.fulfillment = Some(dummy_fulfillment(kp));
        let mut tx = Transaction {
            id: None,
            version: TX_VERSION,
            operation: Operation::Transfer,
            inputs: vec![input],
            outputs: vec![Output::new(vec![kp.public_key()], 10).unwrap()],
            assets: vec![AssetRef::Link {
                id: asset_id.to_string(),
            }],
            metadata: None,
        };
        tx.id = Some(tx.compute_id().unwrap());
        tx
    }

    #[test]
    fn well_formed_create_passes() {
        let kp = TesseraKeypair::generate();
        assert!(validate_schema(&signed_create(&kp)).is_ok());
    }

    #[test]
    fn well_formed_transfer_passes() {
        let kp = TesseraKeypair::generate();
        assert!(validate_schema(&signed_transfer(&kp, &"a".repeat(64))).is_ok());
    }

    #[test]
    fn rejects_missing_id() {
        let kp = TesseraKeypair::generate();
        let mut tx = signed_create(&kp);
        tx.id = None;
        assert!(matches!(validate_schema(&tx), Err(SchemaError::MissingId)));
    }

    #[test]
    fn rejects_unsupported_version() {
        let kp = TesseraKeypair::generate();
        let mut tx = signed_create(&kp);
        tx.version = 99;
        assert!(matches!(
            validate_schema(&tx),
            Err(SchemaError::UnsupportedVersion { version: 99 })
        ));
    }

    #[test]
    fn rejects_empty_inputs_and_outputs() {
        let kp = TesseraKeypair::generate();
        let mut tx = signed_create(&kp);
        tx.inputs.clear();
        assert!(matches!(validate_schema(&tx), Err(SchemaError::EmptyInputs)));

        let mut tx = signed_create(&kp);
        tx.outputs.clear();
        assert!(matches!(
            validate_schema(&tx),
            Err(SchemaError::EmptyOutputs)
        ));
    }

    #[test]
    fn rejects_zero_amount_output() {
        let kp = TesseraKeypair::generate();
        let mut tx = signed_create(&kp);
        tx.outputs[0].amount = 0;
        assert!(matches!(
            validate_schema(&tx),
            Err(SchemaError::ZeroAmount { index: 0 })
        ));
    }

    #[test]
    fn rejects_unsigned_input() {
        let kp = TesseraKeypair::generate();
        let mut tx = signed_create(&kp);
        tx.inputs[0].fulfillment = None;
        assert!(matches!(
            validate_schema(&tx),
            Err(SchemaError::UnsignedInput { index: 0 })
        ));
    }

    #[test]
    fn rejects_create_input_with_fulfills() {
        let kp = TesseraKeypair::generate();
        let mut tx = signed_create(&kp);
        tx.inputs[0].fulfills = Some(TransactionLink::new("x".repeat(64), 0));
        assert!(matches!(
            validate_schema(&tx),
            Err(SchemaError::CreateWithFulfills { index: 0 })
        ));
    }

    #[test]
    fn rejects_transfer_input_without_fulfills() {
        let kp = TesseraKeypair::generate();
        let mut tx = signed_transfer(&kp, &"a".repeat(64));
        tx.inputs[0].fulfills = None;
        assert!(matches!(
            validate_schema(&tx),
            Err(SchemaError::MissingFulfills {
                operation: Operation::Transfer,
                index: 0
            })
        ));
    }

    #[test]
    fn rejects_transfer_without_asset_link() {
        let kp = TesseraKeypair::generate();
        let mut tx = signed_transfer(&kp, &"a".repeat(64));
        tx.assets.clear();
        assert!(matches!(
            validate_schema(&tx),
            Err(SchemaError::TransferAssetCount { actual: 0 })
        ));
    }

    #[test]
    fn rejects_asset_definition_in_transfer() {
        let kp = TesseraKeypair::generate();
        let mut tx = signed_transfer(&kp, &"a".repeat(64));
        tx.assets = vec![AssetRef::Definition { data: json!({}) }];
        assert!(matches!(
            validate_schema(&tx),
            Err(SchemaError::AssetDefinitionInSpend {
                operation: Operation::Transfer
            })
        ));
    }

    #[test]
    fn rejects_compose_with_single_asset() {
        let kp = TesseraKeypair::generate();
        let mut tx = signed_transfer(&kp, &"a".repeat(64));
        tx.operation = Operation::Compose;
        assert!(matches!(
            validate_schema(&tx),
            Err(SchemaError::ComposeAssetCount { actual: 1 })
        ));
    }

    #[test]
    fn rejects_decompose_with_single_output() {
        let kp = TesseraKeypair::generate();
        let mut tx = signed_transfer(&kp, &"a".repeat(64));
        tx.operation = Operation::Decompose;
        assert!(matches!(
            validate_schema(&tx),
            Err(SchemaError::DecomposeOutputCount { actual: 1 })
        ));
    }

    #[test]
    fn rejects_reserved_characters_in_metadata_keys() {
        let kp = TesseraKeypair::generate();
        for bad_key in ["a.b", "$set", "nul\0byte"] {
            let mut tx = signed_create(&kp);
            tx.metadata = Some(json!({ bad_key: 1 }));
            assert!(
                matches!(
                    validate_schema(&tx),
                    Err(SchemaError::ReservedKeyCharacter { .. })
                ),
                "key {bad_key:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_reserved_characters_in_nested_asset_keys() {
        let kp = TesseraKeypair::generate();
        let mut tx = signed_create(&kp);
        tx.assets = vec![AssetRef::Definition {
            data: json!({"ok": [{"bad.key": true}]}),
        }];
        assert!(matches!(
            validate_schema(&tx),
            Err(SchemaError::ReservedKeyCharacter { .. })
        ));
    }

    #[test]
    fn plain_keys_are_fine() {
        let kp = TesseraKeypair::generate();
        let mut tx = signed_create(&kp);
        tx.metadata = Some(json!({"snake_case": {"and-dashes": [1, 2, 3]}}));
        tx.id = Some(tx.compute_id().unwrap());
        assert!(validate_schema(&tx).is_ok());
    }
}
