//! # Cryptographic Primitives
//!
//! Everything below the transaction layer: Ed25519 keys and signatures,
//! SHA3-256 content addressing, and the condition/fulfillment model that
//! decides who may spend an output. Don't roll your own.

pub mod conditions;
pub mod hash;
pub mod keys;

pub use conditions::{Condition, Fulfillment};
pub use hash::{hash_strings, sha3_256, sha3_256_hex};
pub use keys::{KeyError, TesseraKeypair, TesseraPublicKey, TesseraSignature};
