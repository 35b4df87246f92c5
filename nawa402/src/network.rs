//! Ledger networks and the payment schemes derived from them.
//!
//! A [`Network`] is an opaque identifier (`"solana"`, `"base"`, `"auto"`, ...).
//! Exactly one network, [`NATIVE_NETWORK`], gets the native Solana Pay scheme
//! and deeplink format; every other network falls back to the generic EIP-681
//! scheme and an HTTPS payment page.

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Identifier of the designated native network.
pub const NATIVE_NETWORK: &str = "solana";

/// A ledger network identifier.
///
/// Defaults to [`NATIVE_NETWORK`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Network(String);

impl Network {
    /// Creates a network identifier.
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    /// The native Solana network.
    #[must_use]
    pub fn solana() -> Self {
        Self::new(NATIVE_NETWORK)
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for the designated native network.
    #[must_use]
    pub fn is_native(&self) -> bool {
        self.0 == NATIVE_NETWORK
    }

    /// Returns the payment scheme used on this network.
    #[must_use]
    pub fn scheme(&self) -> Scheme {
        Scheme::for_network(self)
    }
}

impl Default for Network {
    fn default() -> Self {
        Self::solana()
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Network {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for Network {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Network {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Protocol-level payment mechanism, a pure function of the [`Network`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scheme {
    /// Solana Pay transfer requests, used on the native network.
    #[default]
    #[serde(rename = "solana-pay")]
    SolanaPay,
    /// EIP-681 payment links, used on every other network.
    #[serde(rename = "eip-681")]
    Eip681,
}

impl Scheme {
    /// Returns the wire representation of the scheme.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SolanaPay => "solana-pay",
            Self::Eip681 => "eip-681",
        }
    }

    /// Selects the scheme for a network.
    #[must_use]
    pub fn for_network(network: &Network) -> Self {
        if network.is_native() {
            Self::SolanaPay
        } else {
            Self::Eip681
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown scheme identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown payment scheme `{0}`")]
pub struct UnknownScheme(String);

impl FromStr for Scheme {
    type Err = UnknownScheme;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "solana-pay" => Ok(Self::SolanaPay),
            "eip-681" => Ok(Self::Eip681),
            other => Err(UnknownScheme(other.to_owned())),
        }
    }
}
