//! Settlement executor capability.
//!
//! The payment agent never talks to a ledger itself. It is handed a
//! [`Wallet`] that can report a balance and execute a transfer, and it treats
//! the returned transaction signature as an opaque reference.

use std::sync::Arc;

use crate::BoxFuture;
use crate::amount::Amount;
use crate::error::{PaymentError, TransportError};
use crate::network::Network;
use crate::proof::PaymentTerms;

/// Failure reported by a [`Wallet`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalletError {
    /// The wallet or ledger refused the operation.
    #[error("{0}")]
    Rejected(String),
    /// The ledger could not be reached.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl From<WalletError> for PaymentError {
    fn from(value: WalletError) -> Self {
        match value {
            WalletError::Rejected(reason) => Self::SettlementExecutionFailed(reason),
            WalletError::Transport(e) => Self::TransportFailure(e),
        }
    }
}

/// An external settlement executor.
pub trait Wallet: Send + Sync {
    /// Address that pays.
    fn address(&self) -> &str;

    /// Spendable balance in `currency`.
    fn balance<'a>(&'a self, currency: &'a str) -> BoxFuture<'a, Result<Amount, WalletError>>;

    /// Pays `terms` on `network`, returning the transaction signature.
    fn transfer<'a>(
        &'a self,
        network: &'a Network,
        terms: &'a PaymentTerms,
    ) -> BoxFuture<'a, Result<String, WalletError>>;
}

impl<T: Wallet + ?Sized> Wallet for Arc<T> {
    fn address(&self) -> &str {
        (**self).address()
    }

    fn balance<'a>(&'a self, currency: &'a str) -> BoxFuture<'a, Result<Amount, WalletError>> {
        (**self).balance(currency)
    }

    fn transfer<'a>(
        &'a self,
        network: &'a Network,
        terms: &'a PaymentTerms,
    ) -> BoxFuture<'a, Result<String, WalletError>> {
        (**self).transfer(network, terms)
    }
}

impl<T: Wallet + ?Sized> Wallet for Box<T> {
    fn address(&self) -> &str {
        (**self).address()
    }

    fn balance<'a>(&'a self, currency: &'a str) -> BoxFuture<'a, Result<Amount, WalletError>> {
        (**self).balance(currency)
    }

    fn transfer<'a>(
        &'a self,
        network: &'a Network,
        terms: &'a PaymentTerms,
    ) -> BoxFuture<'a, Result<String, WalletError>> {
        (**self).transfer(network, terms)
    }
}
