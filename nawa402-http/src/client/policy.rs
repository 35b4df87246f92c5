//! Payment policies that can veto a challenge before anything is paid.
//!
//! Policies run in registration order. The first one that objects stops the
//! flow with [`PaymentError::PolicyRejected`](nawa402::PaymentError::PolicyRejected).

use nawa402::{Amount, Network, PaymentRequest};

/// Decides whether the agent may pay a challenge.
pub trait PaymentPolicy: Send + Sync {
    /// Returns `Err(reason)` to refuse paying `request`.
    ///
    /// # Errors
    ///
    /// The human-readable reason the request is refused.
    fn check(&self, request: &PaymentRequest) -> Result<(), String>;
}

impl<F> PaymentPolicy for F
where
    F: Fn(&PaymentRequest) -> Result<(), String> + Send + Sync,
{
    fn check(&self, request: &PaymentRequest) -> Result<(), String> {
        self(request)
    }
}

/// Caps the amount paid per challenge.
///
/// Without [`for_currency`](Self::for_currency) the cap applies to every
/// currency as a raw number, which is rarely what you want across assets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendingLimit {
    max: Amount,
    currency: Option<String>,
}

impl SpendingLimit {
    /// Refuses any challenge above `max`.
    #[must_use]
    pub const fn new(max: Amount) -> Self {
        Self {
            max,
            currency: None,
        }
    }

    /// Restricts the cap to challenges denominated in `currency`.
    #[must_use]
    pub fn for_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }
}

impl PaymentPolicy for SpendingLimit {
    fn check(&self, request: &PaymentRequest) -> Result<(), String> {
        let in_scope = self
            .currency
            .as_deref()
            .is_none_or(|c| c.eq_ignore_ascii_case(request.currency()));
        if in_scope && request.amount() > self.max {
            return Err(format!(
                "amount {} {} exceeds the limit of {}",
                request.amount(),
                request.currency(),
                self.max
            ));
        }
        Ok(())
    }
}

/// Only pays challenges in one of the listed currencies (case-insensitive).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedCurrencies(Vec<String>);

impl AllowedCurrencies {
    /// Allows exactly `currencies`.
    pub fn new<I, S>(currencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(currencies.into_iter().map(Into::into).collect())
    }
}

impl PaymentPolicy for AllowedCurrencies {
    fn check(&self, request: &PaymentRequest) -> Result<(), String> {
        if self
            .0
            .iter()
            .any(|c| c.eq_ignore_ascii_case(request.currency()))
        {
            Ok(())
        } else {
            Err(format!("currency {} is not allowed", request.currency()))
        }
    }
}

/// Only pays challenges on one of the listed networks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedNetworks(Vec<Network>);

impl AllowedNetworks {
    /// Allows exactly `networks`.
    pub fn new<I, N>(networks: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<Network>,
    {
        Self(networks.into_iter().map(Into::into).collect())
    }
}

impl PaymentPolicy for AllowedNetworks {
    fn check(&self, request: &PaymentRequest) -> Result<(), String> {
        if self.0.contains(request.network()) {
            Ok(())
        } else {
            Err(format!("network {} is not allowed", request.network()))
        }
    }
}
