//! Error types for the nawa402 payment protocol.
//!
//! [`PaymentError`] is the taxonomy surfaced to callers of the client payment
//! agent. The access gate never raises: proof problems are reported as
//! [`ProofRejection`] values inside a gate decision and rendered as a 402.

use std::fmt;
use std::time::Duration;

use crate::amount::Amount;
use crate::timestamp::Timestamp;

/// Base error type for nawa402 payment operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaymentError {
    /// A challenge was present but could not be understood.
    #[error("malformed payment challenge: {0}")]
    MalformedChallenge(String),

    /// The challenge deadline has passed.
    #[error("payment challenge expired at {deadline}")]
    ExpiredChallenge {
        /// The deadline carried by the challenge.
        deadline: Timestamp,
    },

    /// A presented proof failed structural or freshness checks.
    #[error("payment proof rejected: {0}")]
    ProofRejected(#[from] ProofRejection),

    /// The external settlement executor could not pay.
    #[error("settlement execution failed: {0}")]
    SettlementExecutionFailed(String),

    /// The verification boundary declined to issue a proof.
    #[error("verification rejected: {0}")]
    VerificationRejected(String),

    /// Network failure or timeout at an external boundary.
    #[error(transparent)]
    TransportFailure(#[from] TransportError),

    /// The origin answered the paid retry with another 402.
    #[error("payment was not accepted: origin answered the paid retry with 402")]
    ChallengeRepeated,

    /// A client-side payment policy refused the challenge.
    #[error("payment refused by policy: {0}")]
    PolicyRejected(String),

    /// The original request could not be cloned for the paid retry.
    #[error("request body is not cloneable; cannot retry with payment proof")]
    RequestNotCloneable,
}

/// External boundary at which a transport failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Boundary {
    /// The settlement executor (wallet / ledger client).
    Settlement,
    /// The verification service issuing proof tokens.
    Verification,
    /// The origin resource server.
    Origin,
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Settlement => "settlement",
            Self::Verification => "verification",
            Self::Origin => "origin",
        })
    }
}

/// Network-level failure at an external boundary.
///
/// Kept distinct from payment failures: a timeout says nothing about whether
/// the payment itself went through.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The call did not complete within the configured timeout.
    #[error("{boundary} call timed out after {after:?}")]
    Timeout {
        /// Where the timeout happened.
        boundary: Boundary,
        /// The timeout that elapsed.
        after: Duration,
    },
    /// The call failed before a usable answer was received.
    #[error("{boundary} call failed: {message}")]
    Unavailable {
        /// Where the failure happened.
        boundary: Boundary,
        /// Human-readable failure detail.
        message: String,
    },
}

impl TransportError {
    /// Returns the boundary at which the failure happened.
    #[must_use]
    pub const fn boundary(&self) -> Boundary {
        match self {
            Self::Timeout { boundary, .. } | Self::Unavailable { boundary, .. } => *boundary,
        }
    }
}

/// Reasons a payment proof fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProofRejection {
    /// The token is not base64-encoded JSON of a proof record.
    #[error("proof could not be decoded: {0}")]
    Malformed(String),
    /// The proof pays someone else.
    #[error("proof recipient does not match")]
    RecipientMismatch,
    /// The proof pays less than required.
    #[error("proof amount {claimed} is below the required {required}")]
    InsufficientAmount {
        /// Amount claimed by the proof.
        claimed: Amount,
        /// Amount required by the policy.
        required: Amount,
    },
    /// The proof pays in another currency.
    #[error("proof currency does not match")]
    CurrencyMismatch,
    /// The proof is older than the freshness window.
    #[error("proof issued at {issued_at} is older than the freshness window")]
    Stale {
        /// Issuance time carried by the proof.
        issued_at: Timestamp,
    },
}

impl ProofRejection {
    /// Returns a machine-readable `snake_case` reason code.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed_proof",
            Self::RecipientMismatch => "recipient_mismatch",
            Self::InsufficientAmount { .. } => "insufficient_amount",
            Self::CurrencyMismatch => "currency_mismatch",
            Self::Stale { .. } => "stale_proof",
        }
    }
}
