//! Payment proof tokens.
//!
//! A proof token is the base64 (standard alphabet) encoding of a
//! [`ProofRecord`] serialized as `camelCase` JSON. It is an attestation
//! envelope only: it carries no signature, and nothing binds it to the
//! ledger transaction it names. Anyone able to produce the JSON can produce a
//! token that passes [`validate`]. It is also not bound to a single request,
//! so the same token may be replayed for as long as it stays fresh.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::amount::Amount;
use crate::error::ProofRejection;
use crate::timestamp::Timestamp;

/// Maximum age of a proof, in seconds.
pub const PROOF_FRESHNESS_SECS: i64 = 3600;

/// What a payment must match: who gets paid, how much, in what.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentTerms {
    /// Destination address.
    pub recipient: String,
    /// Minimum amount.
    pub amount: Amount,
    /// Asset symbol.
    pub currency: String,
}

impl PaymentTerms {
    /// Creates a set of terms.
    pub fn new(recipient: impl Into<String>, amount: Amount, currency: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            amount,
            currency: currency.into(),
        }
    }
}

/// Decoded content of a proof token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofRecord {
    /// Ledger transaction signature the proof refers to.
    pub tx_signature: String,
    /// Address that was paid.
    pub recipient: String,
    /// Amount that was paid.
    pub amount: Amount,
    /// Asset that was paid.
    pub currency: String,
    /// When the proof was issued.
    pub timestamp: Timestamp,
}

impl ProofRecord {
    /// Creates a record for `terms`, issued now.
    pub fn new(tx_signature: impl Into<String>, terms: &PaymentTerms) -> Self {
        Self::with_timestamp(tx_signature, terms, Timestamp::now())
    }

    /// Creates a record for `terms` with an explicit issuance time.
    pub fn with_timestamp(
        tx_signature: impl Into<String>,
        terms: &PaymentTerms,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            tx_signature: tx_signature.into(),
            recipient: terms.recipient.clone(),
            amount: terms.amount,
            currency: terms.currency.clone(),
            timestamp,
        }
    }
}

/// An opaque, base64-encoded proof token as carried in `X-402-Payment-Proof`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProofToken(String);

impl ProofToken {
    /// Wraps a raw token string.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the token, returning the raw string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ProofToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ProofToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Encodes `record` as a proof token.
///
/// # Errors
///
/// Returns an error if the record cannot be serialized to JSON.
pub fn issue(record: &ProofRecord) -> Result<ProofToken, serde_json::Error> {
    let json = serde_json::to_vec(record)?;
    Ok(ProofToken(b64.encode(json)))
}

/// Decodes a proof token without checking it against any terms.
///
/// # Errors
///
/// Returns [`ProofRejection::Malformed`] if the token is not base64 JSON of a
/// [`ProofRecord`].
pub fn decode(token: &str) -> Result<ProofRecord, ProofRejection> {
    let bytes = b64
        .decode(token.trim())
        .map_err(|e| ProofRejection::Malformed(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| ProofRejection::Malformed(e.to_string()))
}

/// Returns `true` if `token` is a fresh proof that satisfies `expected`.
///
/// Never panics and never errors: every failure is `false`.
#[must_use]
pub fn validate(token: &str, expected: &PaymentTerms) -> bool {
    check(token, expected).is_ok()
}

/// Checks `token` against `expected` and reports why it fails.
///
/// # Errors
///
/// Returns the first [`ProofRejection`] that applies.
pub fn check(token: &str, expected: &PaymentTerms) -> Result<ProofRecord, ProofRejection> {
    check_at(token, expected, Timestamp::now())
}

/// Like [`check`], evaluating freshness as if the current time were `now`.
///
/// Checks run in order: decode, recipient, amount, currency, freshness. A
/// proof timestamped in the future is accepted.
///
/// # Errors
///
/// Returns the first [`ProofRejection`] that applies.
pub fn check_at(
    token: &str,
    expected: &PaymentTerms,
    now: Timestamp,
) -> Result<ProofRecord, ProofRejection> {
    let record = decode(token)?;
    if record.recipient != expected.recipient {
        return Err(ProofRejection::RecipientMismatch);
    }
    if record.amount < expected.amount {
        return Err(ProofRejection::InsufficientAmount {
            claimed: record.amount,
            required: expected.amount,
        });
    }
    if record.currency != expected.currency {
        return Err(ProofRejection::CurrencyMismatch);
    }
    if now.signed_duration_since(record.timestamp) > TimeDelta::seconds(PROOF_FRESHNESS_SECS) {
        return Err(ProofRejection::Stale {
            issued_at: record.timestamp,
        });
    }
    Ok(record)
}
