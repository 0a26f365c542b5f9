//! # Protocol Configuration & Constants
//!
//! Every magic number in Tessera lives here. If you're hardcoding a constant
//! somewhere else, you're doing it wrong and you owe the team coffee.
//!
//! The storage table names live in [`StorageConfig`], which is passed
//! explicitly to whichever engine you construct. There is deliberately no
//! process-wide configuration singleton: two gateways with different table
//! layouts can coexist in one process, which is exactly what integration
//! tests want.

// ---------------------------------------------------------------------------
// Transaction Parameters
// ---------------------------------------------------------------------------

/// Transaction format version. Bump on breaking changes to the canonical
/// serialization, because every committed id depends on it.
pub const TX_VERSION: u16 = 1;

/// Maximum number of inputs per transaction. Keeps validation bounded.
pub const MAX_TX_INPUTS: usize = 256;

/// Maximum number of outputs per transaction.
pub const MAX_TX_OUTPUTS: usize = 256;

/// Characters that must never appear in asset or metadata JSON keys.
/// `.` and `$` are reserved by document-database index syntax; NUL is
/// reserved by every sane key-value encoding on earth.
pub const RESERVED_KEY_CHARS: [char; 3] = ['.', '$', '\0'];

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// Ed25519 — the only sane choice for signatures in 2024+.
pub const SIGNING_ALGORITHM: &str = "Ed25519";

/// Ed25519 public key length in bytes.
pub const PUBLIC_KEY_LENGTH: usize = 32;

/// Ed25519 signature length. Always 64 bytes. If yours isn't, something
/// has gone terribly wrong.
pub const SIGNATURE_LENGTH: usize = 64;

/// Hash function for transaction ids and the app-hash chain. SHA3-256,
/// because content addresses outlive implementations and FIPS-202 is not
/// going anywhere.
pub const ID_HASH_FUNCTION: &str = "SHA3-256";

/// Hash output length in bytes.
pub const HASH_OUTPUT_LENGTH: usize = 32;

// ---------------------------------------------------------------------------
// Storage Configuration
// ---------------------------------------------------------------------------

/// Table (sled tree) names for a storage gateway.
///
/// Passed by value to the engine constructor. The defaults are what every
/// deployment should use; overriding them exists so that two logical
/// ledgers can share one physical database in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    /// Committed transactions, keyed by transaction id.
    pub transactions_table: String,
    /// Output ownership index, keyed by owner public key + insertion seq.
    pub outputs_table: String,
    /// Spend index: `(transaction_id, output_index)` -> spender id.
    pub spends_table: String,
    /// Block metadata, keyed by big-endian height.
    pub blocks_table: String,
    /// Validator sets, keyed by big-endian height.
    pub validator_sets_table: String,
    /// Election records, keyed by election id.
    pub elections_table: String,
    /// Miscellaneous bookkeeping (pre-commit state, sequence counters).
    pub metadata_table: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            transactions_table: "transactions".to_string(),
            outputs_table: "outputs".to_string(),
            spends_table: "spends".to_string(),
            blocks_table: "blocks".to_string(),
            validator_sets_table: "validator_sets".to_string(),
            elections_table: "elections".to_string(),
            metadata_table: "metadata".to_string(),
        }
    }
}

impl StorageConfig {
    /// A config with every table name prefixed, for running multiple
    /// logical ledgers against one physical database.
    pub fn with_prefix(prefix: &str) -> Self {
        let base = Self::default();
        Self {
            transactions_table: format!("{prefix}_{}", base.transactions_table),
            outputs_table: format!("{prefix}_{}", base.outputs_table),
            spends_table: format!("{prefix}_{}", base.spends_table),
            blocks_table: format!("{prefix}_{}", base.blocks_table),
            validator_sets_table: format!("{prefix}_{}", base.validator_sets_table),
            elections_table: format!("{prefix}_{}", base.elections_table),
            metadata_table: format!("{prefix}_{}", base.metadata_table),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_names_are_distinct() {
        let c = StorageConfig::default();
        let names = [
            &c.transactions_table,
            &c.outputs_table,
            &c.spends_table,
            &c.blocks_table,
            &c.validator_sets_table,
            &c.elections_table,
            &c.metadata_table,
        ];
        for (i, a) in names.iter().enumerate() {
            for b in names.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn prefixed_config_prefixes_every_table() {
        let c = StorageConfig::with_prefix("testnet");
        assert_eq!(c.transactions_table, "testnet_transactions");
        assert_eq!(c.spends_table, "testnet_spends");
        assert_eq!(c.metadata_table, "testnet_metadata");
    }

    #[test]
    fn crypto_parameter_sizes() {
        assert_eq!(PUBLIC_KEY_LENGTH, 32);
        assert_eq!(SIGNATURE_LENGTH, 64);
        assert_eq!(HASH_OUTPUT_LENGTH, 32);
    }

    #[test]
    fn reserved_chars_cover_document_db_syntax() {
        assert!(RESERVED_KEY_CHARS.contains(&'.'));
        assert!(RESERVED_KEY_CHARS.contains(&'$'));
        assert!(RESERVED_KEY_CHARS.contains(&'\0'));
    }
}
