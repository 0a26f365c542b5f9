//! # Transaction Model
//!
//! Immutable value objects for the four ledger operations and everything
//! they carry: inputs, outputs, asset references, metadata. Plus the
//! machinery around them, split by concern:
//!
//! ```text
//! types.rs   — the vocabulary: Operation, AssetRef, TransactionLink,
//!              Output, Input, Transaction, canonical serialization
//! schema.rs  — structural validation (shape only, no crypto, no storage)
//! builder.rs — fluent construction of unsigned transactions
//! signing.rs — fulfillment of inputs and id sealing
//! ```
//!
//! A transaction is built, signed, and then never mutated again. There is
//! no "fix up" path: a bad signature or a stale id makes the transaction
//! permanently invalid and the only recourse is building a new one.

pub mod builder;
pub mod schema;
pub mod signing;
pub mod types;

pub use builder::TransactionBuilder;
pub use schema::{validate_schema, SchemaError};
pub use signing::{sign_transaction, SigningError};
pub use types::{AssetRef, Input, Operation, Output, Transaction, TransactionLink};
