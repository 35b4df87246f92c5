//! The verification boundary.
//!
//! After the wallet pays, the agent presents the transaction reference to a
//! [`Verifier`] and gets a proof token back. The verifier may be a remote
//! service reached over HTTP or a [`LocalVerifier`] running in-process on top
//! of a [`SettlementChecker`].

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::BoxFuture;
use crate::amount::Amount;
use crate::error::{PaymentError, TransportError};
use crate::proof::{self, PaymentTerms, ProofRecord, ProofToken};
use crate::timestamp::Timestamp;

/// What the agent asks the verification boundary to attest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRequest {
    /// Ledger transaction signature.
    pub tx_signature: String,
    /// Address that was paid.
    pub recipient: String,
    /// Amount that was paid.
    pub amount: Amount,
    /// Asset that was paid.
    pub currency: String,
}

impl VerificationRequest {
    /// Creates a request for a settled payment of `terms`.
    pub fn new(tx_signature: impl Into<String>, terms: &PaymentTerms) -> Self {
        Self {
            tx_signature: tx_signature.into(),
            recipient: terms.recipient.clone(),
            amount: terms.amount,
            currency: terms.currency.clone(),
        }
    }

    /// The terms this request claims were paid.
    #[must_use]
    pub fn terms(&self) -> PaymentTerms {
        PaymentTerms::new(self.recipient.clone(), self.amount, self.currency.clone())
    }
}

/// Successful answer of the verification boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResponse {
    /// Always `true` on this shape; failures are answered with an error body.
    pub success: bool,
    /// The issued proof token.
    pub payment_proof: ProofToken,
    /// Whether the settlement was confirmed.
    pub verified: bool,
    /// When the answer was produced.
    pub timestamp: Timestamp,
}

impl VerificationResponse {
    /// Wraps a freshly issued proof.
    #[must_use]
    pub fn issued(payment_proof: ProofToken) -> Self {
        Self {
            success: true,
            payment_proof,
            verified: true,
            timestamp: Timestamp::now(),
        }
    }
}

/// Failure reported by a [`Verifier`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifierError {
    /// The boundary declined to attest the payment.
    #[error("{0}")]
    Rejected(String),
    /// The boundary could not be reached.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl From<VerifierError> for PaymentError {
    fn from(value: VerifierError) -> Self {
        match value {
            VerifierError::Rejected(reason) => Self::VerificationRejected(reason),
            VerifierError::Transport(e) => Self::TransportFailure(e),
        }
    }
}

/// Issues proof tokens for settled payments.
pub trait Verifier: Send + Sync {
    /// Attests `request`, returning a proof token.
    fn verify<'a>(
        &'a self,
        request: &'a VerificationRequest,
    ) -> BoxFuture<'a, Result<ProofToken, VerifierError>>;
}

impl<T: Verifier + ?Sized> Verifier for Arc<T> {
    fn verify<'a>(
        &'a self,
        request: &'a VerificationRequest,
    ) -> BoxFuture<'a, Result<ProofToken, VerifierError>> {
        (**self).verify(request)
    }
}

/// Looks up whether a ledger transaction really settled a payment.
pub trait SettlementChecker: Send + Sync {
    /// Returns `Ok(true)` if `request` names a settled transaction matching its terms.
    fn confirm<'a>(
        &'a self,
        request: &'a VerificationRequest,
    ) -> BoxFuture<'a, Result<bool, TransportError>>;
}

impl<T: SettlementChecker + ?Sized> SettlementChecker for Arc<T> {
    fn confirm<'a>(
        &'a self,
        request: &'a VerificationRequest,
    ) -> BoxFuture<'a, Result<bool, TransportError>> {
        (**self).confirm(request)
    }
}

/// A [`SettlementChecker`] that confirms every reference without looking.
///
/// Anyone can obtain a proof for a payment that never happened. Only use it
/// for development or in front of a ledger that is checked elsewhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct UncheckedSettlements;

impl SettlementChecker for UncheckedSettlements {
    fn confirm<'a>(
        &'a self,
        request: &'a VerificationRequest,
    ) -> BoxFuture<'a, Result<bool, TransportError>> {
        #[cfg(feature = "telemetry")]
        tracing::warn!(
            tx_signature = %request.tx_signature,
            "accepting settlement without ledger confirmation"
        );
        #[cfg(not(feature = "telemetry"))]
        let _ = request;
        Box::pin(async { Ok(true) })
    }
}

/// An in-process [`Verifier`]: confirms through a [`SettlementChecker`] and
/// issues the proof token itself.
#[derive(Debug, Clone)]
pub struct LocalVerifier<C> {
    checker: C,
}

impl<C> LocalVerifier<C> {
    /// Creates a verifier on top of `checker`.
    pub const fn new(checker: C) -> Self {
        Self { checker }
    }
}

impl Default for LocalVerifier<UncheckedSettlements> {
    fn default() -> Self {
        Self::new(UncheckedSettlements)
    }
}

impl<C: SettlementChecker> Verifier for LocalVerifier<C> {
    fn verify<'a>(
        &'a self,
        request: &'a VerificationRequest,
    ) -> BoxFuture<'a, Result<ProofToken, VerifierError>> {
        Box::pin(async move {
            if !self.checker.confirm(request).await? {
                return Err(VerifierError::Rejected(
                    "Payment verification failed".to_owned(),
                ));
            }
            let record = ProofRecord::new(request.tx_signature.clone(), &request.terms());
            proof::issue(&record).map_err(|e| VerifierError::Rejected(e.to_string()))
        })
    }
}
