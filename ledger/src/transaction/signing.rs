//! Transaction signing.
//!
//! Signing fulfills every input against the common signing message (the
//! canonical body with `id` and fulfillments nulled) and then seals the
//! transaction by computing its content-addressed id. The id commits to
//! the fulfillments, so a signed transaction cannot be re-signed or have
//! a signature swapped without the id check catching it.

use std::collections::HashMap;

use thiserror::Error;

use super::schema::SchemaError;
use super::types::Transaction;
use crate::crypto::{Fulfillment, TesseraKeypair, TesseraPublicKey};

/// Errors raised while signing a transaction.
#[derive(Debug, Error)]
pub enum SigningError {
    /// An input names an owner for which no keypair was supplied.
    #[error("no private key supplied for owner {owner}")]
    MissingPrivateKey { owner: String },

    /// Canonicalization failed; the transaction could not be serialized.
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Sign a transaction with the given keypairs, consuming the unsigned
/// value and returning the sealed one.
///
/// Every input is fulfilled from its `owners_before` list: a single owner
/// yields an Ed25519 fulfillment, several owners yield an n-of-n threshold
/// fulfillment, so each listed owner must have a keypair present. Keypairs
/// are matched by public key; order and surplus keypairs are irrelevant.
///
/// After fulfilling, the id is computed and set. The returned transaction
/// is immutable by convention: any further mutation invalidates it.
pub fn sign_transaction(
    mut tx: Transaction,
    keypairs: &[TesseraKeypair],
) -> Result<Transaction, SigningError> {
    let message = tx.signable_bytes()?;

    let by_owner: HashMap<TesseraPublicKey, &TesseraKeypair> = keypairs
        .iter()
        .map(|kp| (kp.public_key(), kp))
        .collect();

    let mut fulfillments = Vec::with_capacity(tx.inputs.len());
    for input in &tx.inputs {
        fulfillments.push(fulfill(&input.owners_before, &by_owner, &message)?);
    }
    for (input, fulfillment) in tx.inputs.iter_mut().zip(fulfillments) {
        input.fulfillment = Some(fulfillment);
    }

    tx.id = Some(tx.compute_id()?);
    Ok(tx)
}

/// Build the fulfillment for one owner list.
fn fulfill(
    owners: &[TesseraPublicKey],
    by_owner: &HashMap<TesseraPublicKey, &TesseraKeypair>,
    message: &[u8],
) -> Result<Fulfillment, SigningError> {
    let sign_as = |owner: &TesseraPublicKey| -> Result<Fulfillment, SigningError> {
        let keypair = by_owner
            .get(owner)
            .ok_or_else(|| SigningError::MissingPrivateKey {
                owner: owner.to_string(),
            })?;
        Ok(Fulfillment::Ed25519 {
            public_key: *owner,
            signature: keypair.sign(message),
        })
    };

    match owners {
        [single] => sign_as(single),
        many => Ok(Fulfillment::Threshold {
            subfulfillments: many.iter().map(sign_as).collect::<Result<_, _>>()?,
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
