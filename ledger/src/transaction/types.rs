//! Core type definitions for Tessera transactions.
//!
//! These types form the vocabulary of everything that happens on the
//! ledger: operations, asset references, outputs and the conditions that
//! lock them, inputs and the fulfillments that unlock them, and the
//! transaction envelope tying them together.
//!
//! ## Content addressing
//!
//! A transaction's `id` is the SHA3-256 of its canonical serialization
//! with the `id` field nulled. Canonical means sorted-key JSON: the struct
//! is converted to a `serde_json::Value` (whose maps are BTree-backed, so
//! keys come out sorted) and serialized compactly. Any byte of the body
//! changes the id; the id never changes the id.
//!
//! The *signing* message additionally nulls every input's fulfillment, so
//! signatures cover the whole body except themselves. The id is computed
//! after signing and therefore commits to the fulfillments too.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::schema::SchemaError;
use crate::crypto::hash::sha3_256_hex;
use crate::crypto::{Condition, Fulfillment, TesseraPublicKey};

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// Discriminant for what a transaction does to the asset space.
///
/// The operation determines which structural rules apply: whether inputs
/// reference prior outputs, how many asset references are legal, and how
/// conservation is grouped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    /// Mint a new asset. Inputs carry no `fulfills` reference; the asset
    /// is a definition and value appears out of nothing.
    Create,
    /// Move an existing asset to new owners. Value is conserved.
    Transfer,
    /// Merge several assets into one output set under a single condition
    /// tree. Value is conserved across the merge.
    Compose,
    /// Split one composed input into independently spendable outputs.
    /// The inverse of [`Operation::Compose`]; value is conserved.
    Decompose,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "CREATE"),
            Self::Transfer => write!(f, "TRANSFER"),
            Self::Compose => write!(f, "COMPOSE"),
            Self::Decompose => write!(f, "DECOMPOSE"),
        }
    }
}

impl Operation {
    /// `true` for every operation that consumes prior outputs.
    pub fn spends_inputs(&self) -> bool {
        !matches!(self, Self::Create)
    }
}

// ---------------------------------------------------------------------------
// AssetRef
// ---------------------------------------------------------------------------

/// A transaction's relationship to an asset: either it defines a new one
/// (CREATE) or it references one minted earlier by id.
///
/// The serialized forms are `{"data": ...}` and `{"id": "..."}`, which is
/// what the untagged representation gives us.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AssetRef {
    /// Reference to an asset minted by the named transaction.
    Link { id: String },
    /// A brand-new asset payload. Immutable once committed; the minting
    /// transaction's id becomes the asset's id.
    Definition { data: serde_json::Value },
}

impl AssetRef {
    /// The referenced asset id, `None` for definitions.
    pub fn id(&self) -> Option<&str> {
        match self {
            AssetRef::Link { id } => Some(id),
            AssetRef::Definition { .. } => None,
        }
    }

    /// `true` if this is a [`AssetRef::Definition`].
    pub fn is_definition(&self) -> bool {
        matches!(self, AssetRef::Definition { .. })
    }
}

// ---------------------------------------------------------------------------
// TransactionLink
// ---------------------------------------------------------------------------

/// A lightweight reference to one output of one transaction.
///
/// Never an owning pointer: it identifies `(transaction_id, output_index)`
/// and nothing more. Inputs use it to say which output they spend; the
/// spend index uses it as its key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionLink {
    pub transaction_id: String,
    pub output_index: u32,
}

impl TransactionLink {
    pub fn new(transaction_id: impl Into<String>, output_index: u32) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            output_index,
        }
    }
}

impl fmt::Display for TransactionLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.transaction_id, self.output_index)
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// A spendable unit of value.
///
/// Identified externally by `(transaction_id, output_index)`. Created by
/// exactly one transaction, consumed by at most one. The condition is
/// derived from the owner list at construction (single key, or n-of-n
/// threshold) and stored alongside it so validators never have to
/// re-derive locks for historical key-derivation rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
    /// Positive amount in indivisible units. Zero is structurally invalid.
    pub amount: u64,
    /// The spending condition a consuming input must satisfy.
    pub condition: Condition,
    /// Ordered list of owner public keys; the ownership index is built
    /// from this list.
    pub public_keys: Vec<TesseraPublicKey>,
}

impl Output {
    /// Build an output addressed to `public_keys` with the standard
    /// condition for that owner list.
    pub fn new(public_keys: Vec<TesseraPublicKey>, amount: u64) -> Result<Self, SchemaError> {
        let condition =
            Condition::from_owners(&public_keys).ok_or(SchemaError::EmptyPublicKeys)?;
        Ok(Self {
            amount,
            condition,
            public_keys,
        })
    }
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Proof of authority to spend, plus the pointer to what is being spent.
///
/// `fulfills` is `None` only for CREATE (nothing exists yet to point at).
/// `fulfillment` is `None` only between construction and signing; schema
/// validation rejects unsigned inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Input {
    pub fulfillment: Option<Fulfillment>,
    pub fulfills: Option<TransactionLink>,
    pub owners_before: Vec<TesseraPublicKey>,
}

impl Input {
    /// An unsigned CREATE input: the named owners vouch for the mint.
    pub fn create(owners_before: Vec<TesseraPublicKey>) -> Self {
        Self {
            fulfillment: None,
            fulfills: None,
            owners_before,
        }
    }

    /// An unsigned spending input targeting a prior output.
    pub fn spend(fulfills: TransactionLink, owners_before: Vec<TesseraPublicKey>) -> Self {
        Self {
            fulfillment: None,
            fulfills: Some(fulfills),
            owners_before,
        }
    }
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// The transaction envelope: one operation over inputs, outputs, asset
/// references, and optional free-form metadata.
///
/// Immutable after signing. `id` is `None` only for transactions still
/// under construction; committed transactions always carry the id their
/// body hashes to, and validation recomputes and compares it every time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Content hash of the body (hex SHA3-256), set at signing time.
    pub id: Option<String>,
    /// Canonical format version; committed ids depend on it.
    pub version: u16,
    pub operation: Operation,
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
    pub assets: Vec<AssetRef>,
    /// Arbitrary user payload. Keys are restricted (no `.`, `$`, or NUL)
    /// so any backend can index the document as-is.
    pub metadata: Option<serde_json::Value>,
}

impl Transaction {
    /// Deserialize a transaction from raw JSON bytes.
    ///
    /// Type-level breakage (missing fields, negative or fractional
    /// amounts, malformed keys or signatures) surfaces as
    /// [`SchemaError::Malformed`]; the semantic rules live in
    /// [`super::schema::validate_schema`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SchemaError> {
        serde_json::from_slice(bytes).map_err(|e| SchemaError::Malformed(e.to_string()))
    }

    /// Serialize to plain (non-canonical) JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SchemaError> {
        serde_json::to_vec(self).map_err(|e| SchemaError::Serialization(e.to_string()))
    }

    /// The canonical body as a sorted-key JSON value, with `id` nulled and
    /// optionally every fulfillment nulled.
    fn canonical_value(&self, strip_fulfillments: bool) -> Result<serde_json::Value, SchemaError> {
        let mut value =
            serde_json::to_value(self).map_err(|e| SchemaError::Serialization(e.to_string()))?;
        value["id"] = serde_json::Value::Null;
        if strip_fulfillments {
            if let Some(inputs) = value.get_mut("inputs").and_then(|v| v.as_array_mut()) {
                for input in inputs {
                    input["fulfillment"] = serde_json::Value::Null;
                }
            }
        }
        Ok(value)
    }

    /// The message every input signs: canonical JSON with `id` and all
    /// fulfillments nulled. Identical for each input of one transaction.
    pub fn signable_bytes(&self) -> Result<Vec<u8>, SchemaError> {
        let value = self.canonical_value(true)?;
        serde_json::to_vec(&value).map_err(|e| SchemaError::Serialization(e.to_string()))
    }

    /// Recompute the content-addressed id from the current body.
    ///
    /// Fulfillments are included, so tampering with a signature after the
    /// fact changes the id too.
    pub fn compute_id(&self) -> Result<String, SchemaError> {
        let value = self.canonical_value(false)?;
        let bytes =
            serde_json::to_vec(&value).map_err(|e| SchemaError::Serialization(e.to_string()))?;
        Ok(sha3_256_hex(&bytes))
    }

    /// The output at `index`, if it exists.
    pub fn output(&self, index: u32) -> Option<&Output> {
        self.outputs.get(index as usize)
    }

    /// Build the unsigned inputs a spender needs to consume this
    /// transaction's outputs: one input per output, `fulfills` pointing
    /// back here, `owners_before` taken from the output's owner list.
    ///
    /// Returns an empty vector for unsigned transactions, which have no
    /// id to link against.
    pub fn to_inputs(&self) -> Vec<Input> {
        let Some(id) = &self.id else {
            return Vec::new();
        };
        self.outputs
            .iter()
            .enumerate()
            .map(|(index, output)| {
                Input::spend(
                    TransactionLink::new(id.clone(), index as u32),
                    output.public_keys.clone(),
                )
            })
            .collect()
    }

    /// The id of the asset this transaction's outputs carry.
    ///
    /// CREATE, COMPOSE and DECOMPOSE mint: their outputs carry the asset
    /// named by the transaction's own id. TRANSFER moves the asset named
    /// by its single link. `None` for unsigned mints or a TRANSFER whose
    /// asset list is malformed (schema validation rejects those anyway).
    pub fn spendable_asset_id(&self) -> Option<&str> {
        match self.operation {
            Operation::Create | Operation::Compose | Operation::Decompose => self.id.as_deref(),
            Operation::Transfer => self.assets.first().and_then(|a| a.id()),
        }
    }

    /// The asset ids this transaction declares it consumes, in declaration
    /// order. Empty for CREATE.
    pub fn declared_asset_ids(&self) -> Vec<&str> {
        self.assets.iter().filter_map(|a| a.id()).collect()
    }

    /// The `(transaction_id, output_index)` pairs this transaction's
    /// inputs claim, in input order. Empty for CREATE.
    pub fn spent_links(&self) -> Vec<&TransactionLink> {
        self.inputs.iter().filter_map(|i| i.fulfills.as_ref()).collect()
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

    fn sample_create(owner: &TesseraPublicKey) -> Transaction {
        Transaction {
            id: None,
            version: crate::config::TX_VERSION,
            operation: Operation::Create,
            inputs: vec![Input::create(vec![*owner])],
            outputs: vec![Output::new(vec![*owner], 10).unwrap()],
            assets: vec![AssetRef::Definition {
                data: json!({"ticker": "TSR"}),
            }],
            metadata: None,
        }
    }

    #[test]
    fn operation_display_matches_wire_form() {
        assert_eq!(Operation::Create.to_string(), "CREATE");
        assert_eq!(Operation::Decompose.to_string(), "DECOMPOSE");
        assert_eq!(
            serde_json::to_string(&Operation::Transfer).unwrap(),
            "\"TRANSFER\""
        );
    }

    #[test]
    fn only_create_mints() {
        assert!(!Operation::Create.spends_inputs());
        assert!(Operation::Transfer.spends_inputs());
        assert!(Operation::Compose.spends_inputs());
        assert!(Operation::Decompose.spends_inputs());
    }

    #[test]
    fn asset_ref_serde_shapes() {
        let link: AssetRef = serde_json::from_str(r#"{"id": "abc"}"#).unwrap();
        assert_eq!(link.id(), Some("abc"));

        let def: AssetRef = serde_json::from_str(r#"{"data": {"k": 1}}"#).unwrap();
        assert!(def.is_definition());
        assert_eq!(def.id(), None);
    }

    #[test]
    fn link_display_and_ordering() {
        let a = TransactionLink::new("aaa", 0);
        let b = TransactionLink::new("aaa", 1);
        assert_eq!(a.to_string(), "aaa:0");
        assert!(a < b);
    }

    #[test]
    fn output_derives_condition_from_owner_list() {
        let kp = TesseraKeypair::generate();
        let out = Output::new(vec![kp.public_key()], 5).unwrap();
        assert_eq!(
            out.condition,
            Condition::Ed25519 {
                public_key: kp.public_key()
            }
        );

        let kp2 = TesseraKeypair::generate();
        let joint = Output::new(vec![kp.public_key(), kp2.public_key()], 5).unwrap();
        assert!(matches!(
            joint.condition,
            Condition::Threshold { threshold: 2, .. }
        ));
    }

    #[test]
    fn output_rejects_empty_owner_list() {
        assert!(matches!(
            Output::new(vec![], 5),
            Err(SchemaError::EmptyPublicKeys)
        ));
    }

    #[test]
    fn compute_id_is_deterministic_and_ignores_id_field() {
        let kp = TesseraKeypair::generate();
        let mut tx = sample_create(&kp.public_key());

        let id1 = tx.compute_id().unwrap();
        assert_eq!(id1.len(), 64);
        assert_eq!(tx.compute_id().unwrap(), id1);

        // Setting the id must not change what the body hashes to.
        tx.id = Some(id1.clone());
        assert_eq!(tx.compute_id().unwrap(), id1);
    }

    #[test]
    fn any_body_change_changes_the_id() {
        let kp = TesseraKeypair::generate();
        let tx = sample_create(&kp.public_key());
        let id = tx.compute_id().unwrap();

        let mut tampered = tx.clone();
        tampered.outputs[0].amount = 11;
        assert_ne!(tampered.compute_id().unwrap(), id);

        let mut relabeled = tx.clone();
        relabeled.metadata = Some(json!({"note": "x"}));
        assert_ne!(relabeled.compute_id().unwrap(), id);
    }

    #[test]
    fn key_order_of_source_json_does_not_affect_id() {
        let kp = TesseraKeypair::generate();
        let mut tx = sample_create(&kp.public_key());
        tx.metadata = Some(json!({"b": 2, "a": 1}));

        // serde_json maps are BTree-backed, so serialization emits the
        // metadata keys sorted. Reverse them by hand and re-parse: the
        // shuffled document must hash to the same id.
        let text = serde_json::to_string(&tx).unwrap();
        let shuffled = text.replace(r#"{"a":1,"b":2}"#, r#"{"b":2,"a":1}"#);
        assert_ne!(text, shuffled, "the key swap must land");
        let reparsed = Transaction::from_bytes(shuffled.as_bytes()).unwrap();

        assert_eq!(tx.compute_id().unwrap(), reparsed.compute_id().unwrap());
    }

    #[test]
    fn signable_bytes_exclude_fulfillments() {
        let kp = TesseraKeypair::generate();
        let mut tx = sample_create(&kp.public_key());
        let before = tx.signable_bytes().unwrap();

        tx.inputs[0].fulfillment = Some(Fulfillment::Ed25519 {
            public_key: kp.public_key(),
            signature: kp.sign(b"anything"),
        });
        assert_eq!(tx.signable_bytes().unwrap(), before);

        // But the id does commit to fulfillments.
        let unsigned = sample_create(&kp.public_key());
        assert_ne!(tx.compute_id().unwrap(), unsigned.compute_id().unwrap());
    }

    #[test]
    fn to_inputs_links_back_to_each_output() {
        let kp = TesseraKeypair::generate();
        let mut tx = sample_create(&kp.public_key());
        assert!(tx.to_inputs().is_empty(), "unsigned tx has nothing to link");

        tx.id = Some(tx.compute_id().unwrap());
        let inputs = tx.to_inputs();
        assert_eq!(inputs.len(), 1);
        assert_eq!(
            inputs[0].fulfills,
            Some(TransactionLink::new(tx.id.clone().unwrap(), 0))
        );
        assert_eq!(inputs[0].owners_before, vec![kp.public_key()]);
        assert!(inputs[0].fulfillment.is_none());
    }

    #[test]
    fn spendable_asset_id_by_operation() {
        let kp = TesseraKeypair::generate();
        let mut create = sample_create(&kp.public_key());
        assert_eq!(create.spendable_asset_id(), None);
        create.id = Some(create.compute_id().unwrap());
        assert_eq!(create.spendable_asset_id(), create.id.as_deref());

        let transfer = Transaction {
            id: Some("t".repeat(64)),
            version: crate::config::TX_VERSION,
            operation: Operation::Transfer,
            inputs: vec![],
            outputs: vec![],
            assets: vec![AssetRef::Link {
                id: "asset-id".to_string(),
            }],
            metadata: None,
        };
        assert_eq!(transfer.spendable_asset_id(), Some("asset-id"));
    }

    #[test]
    fn from_bytes_rejects_negative_and_fractional_amounts() {
        let kp = TesseraKeypair::generate();
        let mut tx = sample_create(&kp.public_key());
        tx.id = Some(tx.compute_id().unwrap());
        let text = serde_json::to_string(&tx).unwrap();

        let negative = text.replace("\"amount\":10", "\"amount\":-10");
        assert!(matches!(
            Transaction::from_bytes(negative.as_bytes()),
            Err(SchemaError::Malformed(_))
        ));

        let fractional = text.replace("\"amount\":10", "\"amount\":1.5");
        assert!(matches!(
            Transaction::from_bytes(fractional.as_bytes()),
            Err(SchemaError::Malformed(_))
        ));
    }

    #[test]
    fn transaction_json_roundtrip() {
        let kp = TesseraKeypair::generate();
        let mut tx = sample_create(&kp.public_key());
        tx.id = Some(tx.compute_id().unwrap());

        let bytes = tx.to_bytes().unwrap();
        let recovered = Transaction::from_bytes(&bytes).unwrap();
        assert_eq!(tx, recovered);
    }
}
