//! # Key Management
//!
//! Ed25519 keypair generation and serialization for Tessera owners.
//!
//! Every owner of an output is an Ed25519 public key. This module handles
//! creation, encoding, and signing; the condition/fulfillment layer in
//! [`super::conditions`] decides *which* keys must sign.
//!
//! ## Encoding conventions
//!
//! - Public keys travel as **base58** strings. They appear in every output's
//!   owner list and in every canonical transaction body, so the compact,
//!   copy-paste-safe encoding wins.
//! - Signatures travel as **hex** strings. Nobody retypes a signature by
//!   hand; greppability beats compactness.
//!
//! ## Security considerations
//!
//! - Private keys are zeroized on drop (thanks, ed25519-dalek).
//! - We use OS-level RNG (`OsRng`) for key generation. If your OS RNG is
//!   broken, you have bigger problems than Tessera.
//! - Key bytes are never logged. If you add logging to this module, you
//!   will be asked to leave.

use ed25519_dalek::{
    Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey, SECRET_KEY_LENGTH,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

use crate::config::{PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH};

/// Errors that can occur during key operations.
///
/// Intentionally vague about *why* something failed — leaking details
/// about key material through error messages is a classic footgun.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid secret key bytes: wrong length or not a valid scalar")]
    InvalidSecretKey,

    #[error("invalid public key: not 32 bytes of valid base58, or not an Ed25519 point")]
    InvalidPublicKey,

    #[error("invalid signature encoding: expected 64 hex-encoded bytes")]
    InvalidSignature,
}

// ---------------------------------------------------------------------------
// TesseraKeypair
// ---------------------------------------------------------------------------

/// An owner keypair wrapping an Ed25519 signing key.
///
/// This is the atomic unit of authority in the ledger: whoever holds the
/// signing key can fulfill conditions naming its public key, and therefore
/// spend the outputs those conditions guard.
///
/// `TesseraKeypair` intentionally does NOT implement `Serialize` or
/// `Deserialize`. Serializing private keys should be a deliberate,
/// conscious act, not something that happens because someone shoved a
/// keypair into a JSON response. Use `to_bytes()` / `from_seed()`
/// explicitly.
pub struct TesseraKeypair {
    signing_key: SigningKey,
}

impl TesseraKeypair {
    /// Generate a fresh keypair using the OS cryptographic RNG.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    /// Construct a keypair deterministically from a 32-byte seed.
    ///
    /// In Ed25519 the 32-byte secret key *is* the seed. A weak seed makes
    /// a weak key; feed this from a CSPRNG or a proper KDF.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Reconstruct a keypair from raw secret key bytes.
    pub fn from_bytes(secret: &[u8; SECRET_KEY_LENGTH]) -> Self {
        Self::from_seed(secret)
    }

    /// The public half, safe to share with the world.
    pub fn public_key(&self) -> TesseraPublicKey {
        TesseraPublicKey {
            bytes: self.signing_key.verifying_key().to_bytes(),
        }
    }

    /// Sign a message. Ed25519 signatures are deterministic for a given
    /// (key, message) pair, so no randomness is consumed here.
    pub fn sign(&self, message: &[u8]) -> TesseraSignature {
        let sig = self.signing_key.sign(message);
        TesseraSignature {
            bytes: sig.to_bytes(),
        }
    }

    /// Export the raw 32-byte secret key material.
    ///
    /// **Handle with extreme care.** This is the only secret standing
    /// between an attacker and every output this key guards.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }
}

impl Clone for TesseraKeypair {
    /// Cloning a keypair is allowed but should make you uncomfortable.
    /// Every copy of a private key is another thing to protect.
    fn clone(&self) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&self.signing_key.to_bytes()),
        }
    }
}

impl fmt::Debug for TesseraKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print secret key material in debug output. Not even "partially."
        write!(f, "TesseraKeypair(pub={})", self.public_key())
    }
}

// ---------------------------------------------------------------------------
// TesseraPublicKey
// ---------------------------------------------------------------------------

/// An Ed25519 public key identifying an output owner.
///
/// Serializes as a base58 string, which is also its `Display` form and the
/// key under which the ownership index stores its outputs.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TesseraPublicKey {
    bytes: [u8; PUBLIC_KEY_LENGTH],
}

impl TesseraPublicKey {
    /// Wrap raw bytes without curve validation. Use [`try_from_slice`]
    /// when the bytes come from outside the process.
    ///
    /// [`try_from_slice`]: Self::try_from_slice
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_LENGTH]) -> Self {
        Self { bytes }
    }

    /// Validate and wrap a byte slice.
    ///
    /// Rejects wrong lengths and byte strings that are not valid Ed25519
    /// points, which catches low-order keys and other degenerate cases.
    pub fn try_from_slice(slice: &[u8]) -> Result<Self, KeyError> {
        if slice.len() != PUBLIC_KEY_LENGTH {
            return Err(KeyError::InvalidPublicKey);
        }
        let mut bytes = [0u8; PUBLIC_KEY_LENGTH];
        bytes.copy_from_slice(slice);
        VerifyingKey::from_bytes(&bytes).map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(Self { bytes })
    }

    /// The raw key bytes.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        &self.bytes
    }

    /// Verify a signature against this public key.
    ///
    /// Returns a plain boolean because the vast majority of callers just
    /// want a yes/no answer and don't care about the failure mode.
    pub fn verify(&self, message: &[u8], signature: &TesseraSignature) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(&self.bytes) else {
            return false;
        };
        let dalek_sig = DalekSignature::from_bytes(&signature.bytes);
        verifying_key.verify(message, &dalek_sig).is_ok()
    }

    /// Base58-encoded representation, the ledger's canonical key encoding.
    pub fn to_base58(&self) -> String {
        bs58::encode(self.bytes).into_string()
    }

    /// Parse a base58-encoded public key.
    pub fn from_base58(s: &str) -> Result<Self, KeyError> {
        let decoded = bs58::decode(s)
            .into_vec()
            .map_err(|_| KeyError::InvalidPublicKey)?;
        Self::try_from_slice(&decoded)
    }
}

impl Hash for TesseraPublicKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bytes.hash(state);
    }
}

impl fmt::Display for TesseraPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base58())
    }
}

impl fmt::Debug for TesseraPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TesseraPublicKey({})", self.to_base58())
    }
}

impl Serialize for TesseraPublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base58())
    }
}

impl<'de> Deserialize<'de> for TesseraPublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_base58(&s).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// TesseraSignature
// ---------------------------------------------------------------------------

/// An Ed25519 signature over a message. Always exactly 64 bytes.
///
/// Serializes as a 128-character hex string.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TesseraSignature {
    bytes: [u8; SIGNATURE_LENGTH],
}

impl TesseraSignature {
    /// Wrap a raw 64-byte signature.
    pub fn from_bytes(bytes: [u8; SIGNATURE_LENGTH]) -> Self {
        Self { bytes }
    }

    /// The raw signature bytes.
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.bytes
    }

    /// Hex-encoded representation. 128 characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Parse a hex-encoded signature.
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let decoded = hex::decode(s).map_err(|_| KeyError::InvalidSignature)?;
        let bytes: [u8; SIGNATURE_LENGTH] = decoded
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidSignature)?;
        Ok(Self { bytes })
    }
}

impl fmt::Display for TesseraSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for TesseraSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex_str = self.to_hex();
        write!(f, "TesseraSignature({}...{})", &hex_str[..8], &hex_str[120..])
    }
}

impl Serialize for TesseraSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for TesseraSignature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
