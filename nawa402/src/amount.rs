//! Decimal currency amounts.
//!
//! [`Amount`] wraps a [`rust_decimal::Decimal`] so that prices never pass
//! through a binary floating-point type. On the wire an amount is always a
//! string (`"0.001"`), in headers, JSON bodies, payment URLs and proof tokens
//! alike. The written scale is preserved, so `"1.0"` is emitted back as `"1.0"`.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::fmt;
use std::str::FromStr;

/// A non-negative decimal amount of some currency.
///
/// Equality and ordering are numeric: `"1.0"` and `"1.00"` compare equal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(Decimal);

/// Error returned when a string is not a valid [`Amount`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    /// The input is not a plain decimal number.
    #[error("invalid decimal amount `{0}`")]
    Invalid(String),
    /// The input is a negative number.
    #[error("amount must not be negative: `{0}`")]
    Negative(String),
    /// The input has more precision than a decimal amount can hold exactly.
    #[error("amount cannot be represented exactly: `{0}`")]
    Inexact(String),
}

impl Amount {
    /// The zero amount.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Returns the underlying decimal value.
    #[must_use]
    pub const fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Returns `true` if the amount is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = AmountError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(AmountError::Negative(value.to_string()));
        }
        Ok(Self(value))
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Self(Decimal::from(value))
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(AmountError::Invalid(s.to_owned()));
        }
        let decimal = Decimal::from_str_exact(trimmed).map_err(|e| match e {
            rust_decimal::Error::Underflow | rust_decimal::Error::ExceedsMaximumPossibleValue => {
                AmountError::Inexact(s.to_owned())
            }
            _ => AmountError::Invalid(s.to_owned()),
        })?;
        Self::try_from(decimal).map_err(|_| AmountError::Negative(s.to_owned()))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_preserves_written_scale() {
        let amount: Amount = "1.0".parse().unwrap();
        assert_eq!(amount.to_string(), "1.0");
        let amount: Amount = "0.001".parse().unwrap();
        assert_eq!(amount.to_string(), "0.001");
    }

    #[test]
    fn test_numeric_comparison() {
        let a: Amount = "1.0".parse().unwrap();
        let b: Amount = "1.00".parse().unwrap();
        let c: Amount = "0.999".parse().unwrap();
        assert_eq!(a, b);
        assert!(c < a);
    }

    #[test]
    fn test_rejects_negative_and_garbage() {
        assert!(matches!("-1".parse::<Amount>(), Err(AmountError::Negative(_))));
        assert!(matches!("abc".parse::<Amount>(), Err(AmountError::Invalid(_))));
        assert!(matches!("".parse::<Amount>(), Err(AmountError::Invalid(_))));
        assert!("-0".parse::<Amount>().unwrap().is_zero());
    }

    #[test]
    fn test_excess_precision_is_rejected_not_rounded() {
        let err = "0.00099999999999999999999999999999"
            .parse::<Amount>()
            .unwrap_err();
        assert!(matches!(err, AmountError::Inexact(_)));
        assert!("0.0000000000000000000000000001".parse::<Amount>().is_ok());
    }

    #[test]
    fn test_serializes_as_string() {
        let amount: Amount = "0.001".parse().unwrap();
        assert_eq!(serde_json::to_string(&amount).unwrap(), "\"0.001\"");
        let back: Amount = serde_json::from_str("\"0.001\"").unwrap();
        assert_eq!(back, amount);
    }

    #[test]
    fn test_json_number_is_rejected() {
        let result: Result<Amount, _> = serde_json::from_str("0.001");
        assert!(result.is_err());
    }
}
