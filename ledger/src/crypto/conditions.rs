//! # Spending Conditions & Fulfillments
//!
//! A [`Condition`] is the lock on an output: either a single Ed25519
//! public key, or an n-of-m threshold over subconditions. A
//! [`Fulfillment`] is the matching key bundle: signatures arranged in the
//! same shape. Verification asks one question — does this fulfillment
//! cryptographically satisfy that condition for this message — and answers
//! with a boolean. No partial credit, no error taxonomy; an unparseable or
//! mismatched fulfillment is simply unsatisfied.
//!
//! Conditions nest, so "2 of { alice, 3-of-{b, c, d} }" is expressible,
//! but in practice almost every output is a single key or an n-of-n
//! threshold derived straight from its owner list.

use serde::{Deserialize, Serialize};

use super::keys::{TesseraPublicKey, TesseraSignature};

// ---------------------------------------------------------------------------
// Condition
// ---------------------------------------------------------------------------

/// A spending condition: the predicate an input's fulfillment must satisfy
/// to consume the output this condition guards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Condition {
    /// Satisfied by one valid signature from the named key.
    #[serde(rename = "ed25519-sha-256")]
    Ed25519 { public_key: TesseraPublicKey },

    /// Satisfied when at least `threshold` distinct subconditions are
    /// satisfied by the fulfillment's subfulfillments.
    #[serde(rename = "threshold-sha-256")]
    Threshold {
        threshold: u32,
        subconditions: Vec<Condition>,
    },
}

impl Condition {
    /// Derive the standard condition for a list of owners.
    ///
    /// One owner locks to that single key; several owners lock to an
    /// n-of-n threshold, so every owner must sign to spend. Returns `None`
    /// for an empty owner list, which no valid output can carry.
    pub fn from_owners(owners: &[TesseraPublicKey]) -> Option<Self> {
        match owners {
            [] => None,
            [single] => Some(Condition::Ed25519 {
                public_key: *single,
            }),
            many => Some(Condition::Threshold {
                threshold: many.len() as u32,
                subconditions: many
                    .iter()
                    .map(|pk| Condition::Ed25519 { public_key: *pk })
                    .collect(),
            }),
        }
    }

    /// Check whether `fulfillment` satisfies this condition for `message`.
    ///
    /// Threshold matching is greedy: each subfulfillment may satisfy at
    /// most one subcondition, so a single signature cannot be counted
    /// twice toward the threshold.
    pub fn is_fulfilled_by(&self, fulfillment: &Fulfillment, message: &[u8]) -> bool {
        match (self, fulfillment) {
            (
                Condition::Ed25519 { public_key },
                Fulfillment::Ed25519 {
                    public_key: signer,
                    signature,
                },
            ) => signer == public_key && public_key.verify(message, signature),
            (
                Condition::Threshold {
                    threshold,
                    subconditions,
                },
                Fulfillment::Threshold { subfulfillments },
            ) => {
                let mut used = vec![false; subfulfillments.len()];
                let mut satisfied: u32 = 0;
                for subcondition in subconditions {
                    for (i, sub) in subfulfillments.iter().enumerate() {
                        if !used[i] && subcondition.is_fulfilled_by(sub, message) {
                            used[i] = true;
                            satisfied += 1;
                            break;
                        }
                    }
                }
                satisfied >= *threshold
            }
            // Shape mismatch (single-key condition against a threshold
            // fulfillment, or vice versa) is never satisfied.
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Fulfillment
// ---------------------------------------------------------------------------

/// The proof side of a condition: signatures arranged in the condition's
/// shape. Carried by every signed input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Fulfillment {
    #[serde(rename = "ed25519-sha-256")]
    Ed25519 {
        public_key: TesseraPublicKey,
        signature: TesseraSignature,
    },

    #[serde(rename = "threshold-sha-256")]
    Threshold { subfulfillments: Vec<Fulfillment> },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
