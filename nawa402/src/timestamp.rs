//! ISO-8601 timestamps for challenge deadlines and proof issuance.
//!
//! This module provides the [`Timestamp`] type used for a payment request's
//! `deadline` and a proof's `timestamp`. Timestamps are kept at millisecond
//! precision so that the text form written into a header or JSON body parses
//! back to exactly the same value.

use chrono::{DateTime, SecondsFormat, SubsecRound, TimeDelta, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Milliseconds since the epoch of `9999-12-31T23:59:59.999Z`.
const LATEST_MILLIS: i64 = 253_402_300_799_999;

/// A UTC instant with millisecond precision.
///
/// # Serialization
///
/// Serialized as an RFC 3339 / ISO-8601 string with millisecond precision and
/// a `Z` suffix:
///
/// ```json
/// "2026-10-15T12:30:00.000Z"
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<Utc>);

/// Error returned when a string is not an RFC 3339 timestamp.
#[derive(Debug, thiserror::Error)]
#[error("invalid ISO-8601 timestamp `{input}`: {source}")]
pub struct TimestampParseError {
    input: String,
    #[source]
    source: chrono::ParseError,
}

impl Timestamp {
    /// Returns the current system time, truncated to milliseconds.
    #[must_use]
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Wraps a [`DateTime`], truncating it to milliseconds.
    #[must_use]
    pub fn from_datetime(datetime: DateTime<Utc>) -> Self {
        Self(datetime.trunc_subsecs(3))
    }

    /// Returns the underlying [`DateTime`].
    #[must_use]
    pub const fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// The latest instant with a four-digit year, which is the latest one
    /// whose text form parses back.
    #[must_use]
    pub fn latest() -> Self {
        let latest = DateTime::from_timestamp_millis(LATEST_MILLIS);
        Self(latest.unwrap_or(DateTime::<Utc>::MAX_UTC))
    }

    /// Returns this timestamp moved forward by `minutes`, saturating at
    /// [`Timestamp::latest`].
    #[must_use]
    pub fn plus_minutes(self, minutes: u32) -> Self {
        let delta = TimeDelta::minutes(i64::from(minutes));
        let latest = Self::latest();
        self.0
            .checked_add_signed(delta)
            .map_or(latest, |moved| Self(moved).min(latest))
    }

    /// Returns the signed time elapsed from `earlier` to `self`.
    #[must_use]
    pub fn signed_duration_since(self, earlier: Self) -> TimeDelta {
        self.0.signed_duration_since(earlier.0)
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

impl FromStr for Timestamp {
    type Err = TimestampParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DateTime::parse_from_rfc3339(s.trim())
            .map(|parsed| Self::from_datetime(parsed.with_timezone(&Utc)))
            .map_err(|source| TimestampParseError {
                input: s.to_owned(),
                source,
            })
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self::from_datetime(value)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}
