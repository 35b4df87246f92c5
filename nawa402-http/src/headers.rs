//! HTTP header encoding and decoding for payment requests.
//!
//! A challenge travels as one `X-402-*` header per field. Decoding is lenient:
//! the only hard requirement is the version header. Every other field falls
//! back to a default when it is absent, empty or unparseable, and
//! [`DecodedChallenge`] records which fields were filled in that way so callers
//! can tell a sparse challenge from a complete one.

use http::{HeaderMap, HeaderValue};
use nawa402::network::NATIVE_NETWORK;
use nawa402::request::{DEFAULT_CURRENCY, PaymentRequestParts};
use nawa402::{Amount, Network, PaymentRequest, Scheme, Timestamp};

use crate::constants::{
    AMOUNT_HEADER, CURRENCY_HEADER, DEADLINE_HEADER, DESCRIPTION_HEADER, NETWORK_HEADER,
    PAYMENT_URL_HEADER, RECIPIENT_HEADER, SCHEME_HEADER, VERSION_HEADER,
};
use crate::error::HttpError;

/// Every header this codec may write, in emission order.
pub const PROTOCOL_HEADERS: [&str; 9] = [
    VERSION_HEADER,
    NETWORK_HEADER,
    SCHEME_HEADER,
    AMOUNT_HEADER,
    CURRENCY_HEADER,
    RECIPIENT_HEADER,
    DEADLINE_HEADER,
    DESCRIPTION_HEADER,
    PAYMENT_URL_HEADER,
];

/// Renders `request` as `(header name, value)` pairs in canonical case.
///
/// `Description` is included when the request has one, `Payment-URL` when
/// `payment_url` is given.
#[must_use]
pub fn payment_headers(
    request: &PaymentRequest,
    payment_url: Option<&str>,
) -> Vec<(&'static str, String)> {
    let mut pairs = vec![
        (VERSION_HEADER, request.version().to_owned()),
        (NETWORK_HEADER, request.network().to_string()),
        (SCHEME_HEADER, request.scheme().to_string()),
        (AMOUNT_HEADER, request.amount().to_string()),
        (CURRENCY_HEADER, request.currency().to_owned()),
        (RECIPIENT_HEADER, request.recipient().to_owned()),
        (DEADLINE_HEADER, request.deadline().to_string()),
    ];
    if let Some(description) = request.description() {
        pairs.push((DESCRIPTION_HEADER, description.to_owned()));
    }
    if let Some(url) = payment_url {
        pairs.push((PAYMENT_URL_HEADER, url.to_owned()));
    }
    pairs
}

/// Encodes `request` into a [`HeaderMap`].
///
/// # Errors
///
/// Returns [`HttpError::InvalidHeaderValue`] if a field contains bytes HTTP
/// does not allow in a header value (e.g. a newline in the description).
pub fn encode_payment_request(
    request: &PaymentRequest,
    payment_url: Option<&str>,
) -> Result<HeaderMap, HttpError> {
    let mut headers = HeaderMap::new();
    for (name, value) in payment_headers(request, payment_url) {
        let value = HeaderValue::from_bytes(value.as_bytes())
            .map_err(|source| HttpError::InvalidHeaderValue { name, source })?;
        headers.insert(name, value);
    }
    Ok(headers)
}

/// Fields of a challenge that may be filled with a default on decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChallengeField {
    /// `X-402-Network`, defaults to `solana`.
    Network,
    /// `X-402-Scheme`, defaults to `solana-pay`.
    Scheme,
    /// `X-402-Amount`, defaults to `0`.
    Amount,
    /// `X-402-Currency`, defaults to `SOL`.
    Currency,
    /// `X-402-Recipient`, defaults to empty.
    Recipient,
    /// `X-402-Deadline`, defaults to the decode time.
    Deadline,
}

impl ChallengeField {
    /// Header carrying this field.
    #[must_use]
    pub const fn header(self) -> &'static str {
        match self {
            Self::Network => NETWORK_HEADER,
            Self::Scheme => SCHEME_HEADER,
            Self::Amount => AMOUNT_HEADER,
            Self::Currency => CURRENCY_HEADER,
            Self::Recipient => RECIPIENT_HEADER,
            Self::Deadline => DEADLINE_HEADER,
        }
    }
}

/// A payment request decoded from headers, with decode provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedChallenge {
    request: PaymentRequest,
    payment_url: Option<String>,
    defaulted: Vec<ChallengeField>,
}

impl DecodedChallenge {
    /// The decoded request, defaults included.
    #[must_use]
    pub const fn request(&self) -> &PaymentRequest {
        &self.request
    }

    /// Consumes the challenge, returning the request.
    #[must_use]
    pub fn into_request(self) -> PaymentRequest {
        self.request
    }

    /// Value of `X-402-Payment-URL`, if present.
    #[must_use]
    pub fn payment_url(&self) -> Option<&str> {
        self.payment_url.as_deref()
    }

    /// Fields that were absent or unparseable and got a default.
    #[must_use]
    pub fn defaulted(&self) -> &[ChallengeField] {
        &self.defaulted
    }

    /// Returns `true` if `field` was filled with a default.
    #[must_use]
    pub fn is_defaulted(&self, field: ChallengeField) -> bool {
        self.defaulted.contains(&field)
    }

    /// Returns `true` if every field came from the peer.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.defaulted.is_empty()
    }

    /// Returns `true` if the peer sent a scheme other than the one its
    /// network implies.
    #[must_use]
    pub fn scheme_mismatch(&self) -> bool {
        self.request.scheme() != Scheme::for_network(self.request.network())
    }

    /// Returns `true` if the challenge can be paid: it names a recipient and
    /// a positive amount.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        !self.request.recipient().is_empty() && !self.request.amount().is_zero()
    }
}

/// Decodes a challenge from `headers`.
///
/// Returns `None` if there is no (non-empty) `X-402-Version` header.
#[must_use]
pub fn decode_challenge(headers: &HeaderMap) -> Option<DecodedChallenge> {
    decode_with(|name| {
        headers
            .get(name)
            .and_then(|value| std::str::from_utf8(value.as_bytes()).ok())
    })
}

/// Decodes a challenge from arbitrary `(name, value)` pairs.
///
/// Names are matched case-insensitively. The first match wins.
#[must_use]
pub fn decode_challenge_from_pairs<K, V>(pairs: &[(K, V)]) -> Option<DecodedChallenge>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    decode_with(|name| {
        pairs
            .iter()
            .find(|(key, _)| key.as_ref().eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_ref())
    })
}

/// Decodes a payment request from `headers`, discarding decode provenance.
///
/// Returns `None` if there is no `X-402-Version` header. Never fails
/// otherwise.
#[must_use]
pub fn decode_payment_request(headers: &HeaderMap) -> Option<PaymentRequest> {
    decode_challenge(headers).map(DecodedChallenge::into_request)
}

/// Like [`decode_payment_request`], over arbitrary `(name, value)` pairs.
#[must_use]
pub fn decode_payment_request_from_pairs<K, V>(pairs: &[(K, V)]) -> Option<PaymentRequest>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    decode_challenge_from_pairs(pairs).map(DecodedChallenge::into_request)
}

fn or_default<T>(
    defaulted: &mut Vec<ChallengeField>,
    field: ChallengeField,
    parsed: Option<T>,
    default: impl FnOnce() -> T,
) -> T {
    parsed.unwrap_or_else(|| {
        defaulted.push(field);
        default()
    })
}

fn decode_with<'a, F>(lookup: F) -> Option<DecodedChallenge>
where
    F: Fn(&str) -> Option<&'a str>,
{
    let get = |name: &str| lookup(name).map(str::trim).filter(|v| !v.is_empty());

    let version = get(VERSION_HEADER)?.to_owned();
    let mut defaulted = Vec::new();

    let network = or_default(
        &mut defaulted,
        ChallengeField::Network,
        get(NETWORK_HEADER).map(Network::from),
        || Network::new(NATIVE_NETWORK),
    );
    let scheme = or_default(
        &mut defaulted,
        ChallengeField::Scheme,
        get(SCHEME_HEADER).and_then(|v| v.parse::<Scheme>().ok()),
        || Scheme::SolanaPay,
    );
    let amount = or_default(
        &mut defaulted,
        ChallengeField::Amount,
        get(AMOUNT_HEADER).and_then(|v| v.parse::<Amount>().ok()),
        || Amount::ZERO,
    );
    let currency = or_default(
        &mut defaulted,
        ChallengeField::Currency,
        get(CURRENCY_HEADER).map(str::to_owned),
        || DEFAULT_CURRENCY.to_owned(),
    );
    let recipient = or_default(
        &mut defaulted,
        ChallengeField::Recipient,
        get(RECIPIENT_HEADER).map(str::to_owned),
        String::new,
    );
    let deadline = or_default(
        &mut defaulted,
        ChallengeField::Deadline,
        get(DEADLINE_HEADER).and_then(|v| v.parse::<Timestamp>().ok()),
        Timestamp::now,
    );

    let request = PaymentRequest::from(PaymentRequestParts {
        version,
        network,
        scheme,
        amount,
        currency,
        recipient,
        deadline,
        description: get(DESCRIPTION_HEADER).map(str::to_owned),
        metadata: None,
    });

    Some(DecodedChallenge {
        request,
        payment_url: get(PAYMENT_URL_HEADER).map(str::to_owned),
        defaulted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nawa402::PaymentConfig;

    fn request() -> PaymentRequest {
        let config = PaymentConfig::new("SOL", "Recipient111", "0.001".parse().unwrap())
            .with_description("Access to /premium");
        PaymentRequest::new(&config)
    }

    #[test]
    fn test_encode_writes_one_header_per_field() {
        let headers = encode_payment_request(&request(), Some("solana:Recipient111")).unwrap();
        assert_eq!(headers.len(), 9);
        assert_eq!(headers.get("x-402-version").unwrap(), "1.0.0");
        assert_eq!(headers.get("X-402-Scheme").unwrap(), "solana-pay");
        assert_eq!(headers.get("X-402-Amount").unwrap(), "0.001");
        assert_eq!(
            headers.get("X-402-Payment-URL").unwrap(),
            "solana:Recipient111"
        );
    }

    #[test]
    fn test_optional_headers_are_omitted() {
        let config = PaymentConfig::new("SOL", "Recipient111", "1".parse().unwrap());
        let headers = encode_payment_request(&PaymentRequest::new(&config), None).unwrap();
        assert_eq!(headers.len(), 7);
        assert!(headers.get(DESCRIPTION_HEADER).is_none());
        assert!(headers.get(PAYMENT_URL_HEADER).is_none());
    }

    #[test]
    fn test_roundtrip_through_header_map() {
        let request = request();
        let headers = encode_payment_request(&request, None).unwrap();
        let decoded = decode_challenge(&headers).unwrap();
        assert!(decoded.is_complete());
        assert_eq!(decoded.request(), &request);
    }

    #[test]
    fn test_roundtrip_under_any_casing() {
        let request = request();
        let upper: Vec<(String, String)> = payment_headers(&request, Some("solana:x"))
            .into_iter()
            .map(|(k, v)| (k.to_ascii_uppercase(), v))
            .collect();
        let lower: Vec<(String, String)> = payment_headers(&request, Some("solana:x"))
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();

        assert_eq!(decode_payment_request_from_pairs(&upper).unwrap(), request);
        let decoded = decode_challenge_from_pairs(&lower).unwrap();
        assert_eq!(decoded.request(), &request);
        assert_eq!(decoded.payment_url(), Some("solana:x"));
    }

    #[test]
    fn test_missing_version_is_not_a_challenge() {
        let pairs = [("X-402-Amount", "1"), ("X-402-Recipient", "abc")];
        assert!(decode_payment_request_from_pairs(&pairs).is_none());
        assert!(decode_payment_request(&HeaderMap::new()).is_none());
    }

    #[test]
    fn test_sparse_challenge_gets_defaults() {
        let before = Timestamp::now();
        let decoded = decode_challenge_from_pairs(&[("x-402-version", "1.0.0")]).unwrap();
        let request = decoded.request();

        assert_eq!(request.network().as_str(), "solana");
        assert_eq!(request.scheme(), Scheme::SolanaPay);
        assert!(request.amount().is_zero());
        assert_eq!(request.currency(), "SOL");
        assert_eq!(request.recipient(), "");
        assert!(request.deadline() >= before);
        assert_eq!(decoded.defaulted().len(), 6);
        assert!(!decoded.is_complete());
        assert!(!decoded.is_usable());
    }

    #[test]
    fn test_unparseable_values_fall_back() {
        let decoded = decode_challenge_from_pairs(&[
            ("X-402-Version", "1.0.0"),
            ("X-402-Amount", "lots"),
            ("X-402-Scheme", "exact"),
            ("X-402-Deadline", "tomorrow"),
            ("X-402-Recipient", "Recipient111"),
        ])
        .unwrap();
        assert!(decoded.is_defaulted(ChallengeField::Amount));
        assert!(decoded.is_defaulted(ChallengeField::Scheme));
        assert!(decoded.is_defaulted(ChallengeField::Deadline));
        assert!(!decoded.is_defaulted(ChallengeField::Recipient));
        assert!(!decoded.is_usable());
    }

    #[test]
    fn test_scheme_disagreeing_with_network_is_flagged() {
        let decoded = decode_challenge_from_pairs(&[
            ("X-402-Version", "1.0.0"),
            ("X-402-Network", "base"),
            ("X-402-Scheme", "solana-pay"),
        ])
        .unwrap();
        assert_eq!(decoded.request().scheme(), Scheme::SolanaPay);
        assert!(decoded.scheme_mismatch());

        let headers = encode_payment_request(&request(), None).unwrap();
        assert!(!decode_challenge(&headers).unwrap().scheme_mismatch());
    }

    #[test]
    fn test_description_with_newline_is_rejected() {
        let config = PaymentConfig::new("SOL", "Recipient111", "1".parse().unwrap())
            .with_description("line one\nline two");
        let err = encode_payment_request(&PaymentRequest::new(&config), None).unwrap_err();
        assert!(matches!(
            err,
            HttpError::InvalidHeaderValue {
                name: DESCRIPTION_HEADER,
                ..
            }
        ));
    }

    #[test]
    fn test_utf8_description_roundtrips() {
        let config = PaymentConfig::new("SOL", "Recipient111", "1".parse().unwrap())
            .with_description("Accès premium");
        let request = PaymentRequest::new(&config);
        let headers = encode_payment_request(&request, None).unwrap();
        assert_eq!(decode_payment_request(&headers).unwrap(), request);
    }
}
