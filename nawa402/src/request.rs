//! The payment request: the canonical challenge record.
//!
//! A [`PaymentRequest`] is created fresh for every challenge from a
//! [`PaymentConfig`], handed to the header codec and the payment URL
//! generator, and then dropped. It has no identity beyond its field values.
//!
//! The `scheme` field is never chosen by the caller: it is derived from the
//! network when the request is created (see [`Scheme::for_network`]).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::network::{Network, Scheme};
use crate::timestamp::Timestamp;

/// Protocol version emitted on every challenge.
pub const PROTOCOL_VERSION: &str = "1.0.0";

/// Challenge lifetime used when the configuration does not specify one.
pub const DEFAULT_EXPIRY_MINUTES: u32 = 30;

/// Currency assumed when a decoded challenge does not name one.
pub const DEFAULT_CURRENCY: &str = "SOL";

/// Opaque key/value metadata attached to a request. Not interpreted by the protocol.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Inputs for creating a [`PaymentRequest`].
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentConfig {
    /// Ledger network the payment must happen on.
    pub network: Network,
    /// Asset symbol (e.g. `SOL`, `USDC`).
    pub currency: String,
    /// Destination address.
    pub recipient: String,
    /// Price.
    pub amount: Amount,
    /// Human-readable reason for the charge.
    pub description: Option<String>,
    /// Minutes until the challenge expires (default [`DEFAULT_EXPIRY_MINUTES`]).
    pub expiry_minutes: Option<u32>,
    /// Opaque metadata.
    pub metadata: Option<Metadata>,
}

impl PaymentConfig {
    /// Creates a configuration on the native network.
    pub fn new(currency: impl Into<String>, recipient: impl Into<String>, amount: Amount) -> Self {
        Self {
            network: Network::default(),
            currency: currency.into(),
            recipient: recipient.into(),
            amount,
            description: None,
            expiry_minutes: None,
            metadata: None,
        }
    }

    /// Sets the network.
    #[must_use]
    pub fn with_network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the expiry in minutes.
    #[must_use]
    pub const fn with_expiry_minutes(mut self, minutes: u32) -> Self {
        self.expiry_minutes = Some(minutes);
        self
    }

    /// Sets the metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A payment-required challenge.
///
/// Serialized in `camelCase` as the `paymentRequest` member of a 402 body:
///
/// ```json
/// {
///   "version": "1.0.0",
///   "network": "solana",
///   "scheme": "solana-pay",
///   "amount": "0.001",
///   "currency": "SOL",
///   "recipient": "7xKX...",
///   "deadline": "2026-10-15T12:30:00.000Z",
///   "description": "Access to /premium"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    version: String,
    network: Network,
    scheme: Scheme,
    amount: Amount,
    currency: String,
    recipient: String,
    deadline: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<Metadata>,
}

/// Field values of a [`PaymentRequest`] as carried on the wire.
///
/// Decode path only: wire codecs use it to rebuild a request received from a
/// peer, whose scheme is whatever the peer sent. Locally issued requests go
/// through [`PaymentRequest::new`], which derives the scheme from the network.
#[doc(hidden)]
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub struct PaymentRequestParts {
    pub version: String,
    pub network: Network,
    pub scheme: Scheme,
    pub amount: Amount,
    pub currency: String,
    pub recipient: String,
    pub deadline: Timestamp,
    pub description: Option<String>,
    pub metadata: Option<Metadata>,
}

impl PaymentRequest {
    /// Creates a fresh request whose deadline is `now + expiry`.
    #[must_use]
    pub fn new(config: &PaymentConfig) -> Self {
        Self::new_at(config, Timestamp::now())
    }

    /// Creates a request as if the current time were `now`.
    #[must_use]
    pub fn new_at(config: &PaymentConfig, now: Timestamp) -> Self {
        let expiry = config.expiry_minutes.unwrap_or(DEFAULT_EXPIRY_MINUTES);
        Self {
            version: PROTOCOL_VERSION.to_owned(),
            network: config.network.clone(),
            scheme: Scheme::for_network(&config.network),
            amount: config.amount,
            currency: config.currency.clone(),
            recipient: config.recipient.clone(),
            deadline: now.plus_minutes(expiry),
            description: config.description.clone(),
            metadata: config.metadata.clone(),
        }
    }

    /// Returns `true` once the deadline has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Timestamp::now())
    }

    /// Returns `true` if `now` is past the deadline.
    #[must_use]
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        now > self.deadline
    }

    /// Protocol version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Ledger network.
    #[must_use]
    pub const fn network(&self) -> &Network {
        &self.network
    }

    /// Payment scheme.
    #[must_use]
    pub const fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Price.
    #[must_use]
    pub const fn amount(&self) -> Amount {
        self.amount
    }

    /// Asset symbol.
    #[must_use]
    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Destination address.
    #[must_use]
    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    /// Absolute expiry.
    #[must_use]
    pub const fn deadline(&self) -> Timestamp {
        self.deadline
    }

    /// Human-readable reason, if any.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Opaque metadata, if any.
    #[must_use]
    pub const fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    /// Decomposes the request into its wire fields.
    #[must_use]
    #[doc(hidden)]
    pub fn into_parts(self) -> PaymentRequestParts {
        PaymentRequestParts {
            version: self.version,
            network: self.network,
            scheme: self.scheme,
            amount: self.amount,
            currency: self.currency,
            recipient: self.recipient,
            deadline: self.deadline,
            description: self.description,
            metadata: self.metadata,
        }
    }
}

impl From<PaymentRequestParts> for PaymentRequest {
    fn from(parts: PaymentRequestParts) -> Self {
        Self {
            version: parts.version,
            network: parts.network,
            scheme: parts.scheme,
            amount: parts.amount,
            currency: parts.currency,
            recipient: parts.recipient,
            deadline: parts.deadline,
            description: parts.description,
            metadata: parts.metadata,
        }
    }
}
