//! Access policy and the per-request gate decision.
//!
//! An [`AccessPolicy`] says which paths cost money and how much. Given a
//! request path and the raw proof header (if any),
//! [`AccessPolicy::evaluate`] returns a [`GateDecision`]:
//!
//! 1. a bypass pattern matches: [`GateDecision::Pass`]
//! 2. no protected pattern matches: [`GateDecision::Pass`]
//! 3. no proof was presented: [`GateDecision::Challenge`]
//! 4. the proof fails validation: [`GateDecision::Denied`]
//! 5. otherwise: [`GateDecision::Verified`]
//!
//! The evaluation is pure and never fails. Rendering the decision into an
//! HTTP response is the transport layer's job.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::amount::Amount;
use crate::error::ProofRejection;
use crate::network::Network;
use crate::proof::{self, PaymentTerms, ProofRecord};
use crate::request::{PaymentConfig, PaymentRequest};
use crate::timestamp::Timestamp;

/// A path pattern: exact, prefix, or `*` wildcard.
///
/// - Without `*`, the pattern matches the path itself and anything below it
///   (`/api/premium` matches `/api/premium` and `/api/premium/x`, but not
///   `/api/premiumx`).
/// - With `*`, each `*` matches any run of characters and the whole path must
///   match. Every other character is literal.
#[derive(Debug, Clone)]
pub struct PathPattern {
    raw: String,
    wildcard: Option<Regex>,
}

/// Error returned when a wildcard pattern cannot be compiled.
#[derive(Debug, thiserror::Error)]
#[error("invalid path pattern `{pattern}`: {source}")]
pub struct PatternError {
    pattern: String,
    #[source]
    source: regex::Error,
}

impl PathPattern {
    /// Compiles a pattern.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] if the wildcard form does not compile.
    pub fn new(raw: impl Into<String>) -> Result<Self, PatternError> {
        let raw = raw.into();
        let wildcard = if raw.contains('*') {
            let body = raw
                .split('*')
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(".*");
            let regex = Regex::new(&format!("^{body}$")).map_err(|source| PatternError {
                pattern: raw.clone(),
                source,
            })?;
            Some(regex)
        } else {
            None
        };
        Ok(Self { raw, wildcard })
    }

    /// Returns the pattern as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns `true` if `path` matches this pattern.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        match &self.wildcard {
            Some(regex) => regex.is_match(path),
            None => {
                path == self.raw
                    || path
                        .strip_prefix(self.raw.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            }
        }
    }
}

impl PartialEq for PathPattern {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for PathPattern {}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for PathPattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for PathPattern {
    type Error = PatternError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PathPattern> for String {
    fn from(value: PathPattern) -> Self {
        value.raw
    }
}

impl Serialize for PathPattern {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for PathPattern {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::new(raw).map_err(serde::de::Error::custom)
    }
}

/// Server-side pricing for a set of paths.
///
/// Deserializable from configuration:
///
/// ```toml
/// protected_paths = ["/api/premium/*"]
/// bypass_paths = ["/api/premium/preview"]
/// amount = "0.001"
/// currency = "SOL"
/// recipient = "7xKX..."
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicy {
    /// Paths that require payment.
    pub protected_paths: Vec<PathPattern>,
    /// Paths that never require payment. Checked before `protected_paths`.
    #[serde(default)]
    pub bypass_paths: Vec<PathPattern>,
    /// Price per request.
    pub amount: Amount,
    /// Asset symbol.
    pub currency: String,
    /// Destination address.
    pub recipient: String,
    /// Network the challenge names.
    #[serde(default)]
    pub network: Network,
    /// Challenge description. Defaults to `Access to <path>`.
    #[serde(default)]
    pub description: Option<String>,
    /// Challenge lifetime in minutes.
    #[serde(default)]
    pub expiry_minutes: Option<u32>,
}

/// Outcome of evaluating one request against an [`AccessPolicy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// The path is not priced; forward untouched.
    Pass,
    /// The path is priced and no proof was presented.
    Challenge,
    /// A valid proof was presented; forward with the verified marker.
    Verified(ProofRecord),
    /// A proof was presented and failed validation. Answered like [`GateDecision::Challenge`].
    Denied(ProofRejection),
}

impl GateDecision {
    /// Returns `true` if the decision is answered with a 402.
    #[must_use]
    pub const fn requires_payment(&self) -> bool {
        matches!(self, Self::Challenge | Self::Denied(_))
    }
}

impl AccessPolicy {
    /// Creates a policy with no protected paths.
    pub fn new(amount: Amount, currency: impl Into<String>, recipient: impl Into<String>) -> Self {
        Self {
            protected_paths: Vec::new(),
            bypass_paths: Vec::new(),
            amount,
            currency: currency.into(),
            recipient: recipient.into(),
            network: Network::default(),
            description: None,
            expiry_minutes: None,
        }
    }

    /// Adds protected path patterns.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] if a pattern does not compile.
    pub fn with_protected_paths<I, S>(mut self, patterns: I) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for pattern in patterns {
            self.protected_paths.push(PathPattern::new(pattern)?);
        }
        Ok(self)
    }

    /// Adds bypass path patterns.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] if a pattern does not compile.
    pub fn with_bypass_paths<I, S>(mut self, patterns: I) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for pattern in patterns {
            self.bypass_paths.push(PathPattern::new(pattern)?);
        }
        Ok(self)
    }

    /// Sets the network.
    #[must_use]
    pub fn with_network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    /// Sets a fixed description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the challenge lifetime.
    #[must_use]
    pub const fn with_expiry_minutes(mut self, minutes: u32) -> Self {
        self.expiry_minutes = Some(minutes);
        self
    }

    /// Returns `true` if a bypass pattern matches `path`.
    #[must_use]
    pub fn is_bypassed(&self, path: &str) -> bool {
        self.bypass_paths.iter().any(|p| p.matches(path))
    }

    /// Returns `true` if a protected pattern matches `path`.
    #[must_use]
    pub fn is_protected(&self, path: &str) -> bool {
        self.protected_paths.iter().any(|p| p.matches(path))
    }

    /// Terms a proof must satisfy.
    #[must_use]
    pub fn terms(&self) -> PaymentTerms {
        PaymentTerms::new(self.recipient.clone(), self.amount, self.currency.clone())
    }

    /// Challenge configuration for `path`.
    #[must_use]
    pub fn payment_config(&self, path: &str) -> PaymentConfig {
        let description = self
            .description
            .clone()
            .unwrap_or_else(|| format!("Access to {path}"));
        let mut config =
            PaymentConfig::new(self.currency.clone(), self.recipient.clone(), self.amount)
                .with_network(self.network.clone())
                .with_description(description);
        config.expiry_minutes = self.expiry_minutes;
        config
    }

    /// Builds a fresh challenge for `path`.
    #[must_use]
    pub fn challenge(&self, path: &str) -> PaymentRequest {
        PaymentRequest::new(&self.payment_config(path))
    }

    /// Decides what to do with a request for `path` carrying `proof`.
    ///
    /// An empty proof header counts as no proof.
    #[must_use]
    pub fn evaluate(&self, path: &str, proof: Option<&str>) -> GateDecision {
        self.evaluate_at(path, proof, Timestamp::now())
    }

    /// Like [`evaluate`](Self::evaluate), judging proof freshness at `now`.
    #[must_use]
    pub fn evaluate_at(&self, path: &str, proof: Option<&str>, now: Timestamp) -> GateDecision {
        if self.is_bypassed(path) || !self.is_protected(path) {
            return GateDecision::Pass;
        }
        let Some(token) = proof.filter(|t| !t.trim().is_empty()) else {
            return GateDecision::Challenge;
        };
        match proof::check_at(token, &self.terms(), now) {
            Ok(record) => GateDecision::Verified(record),
            Err(rejection) => GateDecision::Denied(rejection),
        }
    }
}
