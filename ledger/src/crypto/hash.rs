//! # Hashing Utilities
//!
//! Tessera standardizes on SHA3-256 for everything content-addressed:
//! transaction ids and the app-hash chain that links committed blocks.
//! One hash function, one output length, no committee of digests to
//! keep in sync.

use sha3::{Digest, Sha3_256};

/// Compute the SHA3-256 hash of the input data.
///
/// Returns a fixed-size 32-byte digest. For the hex form most callers
/// actually want, see [`sha3_256_hex`].
pub fn sha3_256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha3_256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// SHA3-256 as a lowercase hex string. This is the canonical textual form
/// of every content address in the ledger (transaction ids, app hashes).
pub fn sha3_256_hex(data: &[u8]) -> String {
    hex::encode(sha3_256(data))
}

/// Hash a sequence of strings by feeding them into one hasher in order.
///
/// Used for the app-hash chain: `hash_strings([prev_app_hash, txn_hash])`.
/// Feeding parts sequentially avoids allocating a concatenation buffer and
/// produces the same digest as hashing the joined string.
pub fn hash_strings(parts: &[&str]) -> String {
    let mut hasher = Sha3_256::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}
