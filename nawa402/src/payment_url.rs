//! Payment URLs for out-of-band wallet consumption.
//!
//! On the native network the URL is a Solana Pay transfer request
//! (`solana:<recipient>?amount=..&reference=..`). Any other network gets a
//! link to the generic payment page at [`GENERIC_PAYMENT_BASE_URL`].

use chrono::Utc;
use rand::Rng;
use url::form_urlencoded;

use crate::request::PaymentRequest;

/// Payment page used for every non-native network.
pub const GENERIC_PAYMENT_BASE_URL: &str = "https://nawapay.io/pay";

const REFERENCE_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const REFERENCE_SUFFIX_LEN: usize = 13;

/// Renders the payment URL for `request`.
///
/// `callback` is only used by the native form, where it is appended as the
/// `callback` parameter.
#[must_use]
pub fn payment_url(request: &PaymentRequest, callback: Option<&str>) -> String {
    if request.network().is_native() {
        let mut query = form_urlencoded::Serializer::new(String::new());
        query
            .append_pair("amount", &request.amount().to_string())
            .append_pair("reference", &generate_reference());
        if let Some(description) = request.description() {
            query.append_pair("label", description);
        }
        if let Some(callback) = callback {
            query.append_pair("callback", callback);
        }
        return format!(
            "{}:{}?{}",
            request.network(),
            request.recipient(),
            query.finish()
        );
    }

    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("to", request.recipient())
        .append_pair("amount", &request.amount().to_string())
        .append_pair("currency", request.currency())
        .append_pair("network", request.network().as_str())
        .finish();
    format!("{GENERIC_PAYMENT_BASE_URL}?{query}")
}

/// Generates a wallet-side anti-collision reference: `<unix-millis>-<base36>`.
///
/// This is a nonce for the wallet protocol, not a security token.
#[must_use]
pub fn generate_reference() -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..REFERENCE_SUFFIX_LEN)
        .map(|_| char::from(REFERENCE_ALPHABET[rng.random_range(0..REFERENCE_ALPHABET.len())]))
        .collect();
    format!("{}-{suffix}", Utc::now().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Network;
    use crate::request::PaymentConfig;
    use url::Url;

    fn query_value(url: &Url, key: &str) -> Option<String> {
        url.query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    #[test]
    fn test_native_url_shape() {
        let config = PaymentConfig::new("SOL", "Recipient111", "0.001".parse().unwrap())
            .with_description("Access to /premium");
        let request = PaymentRequest::new(&config);
        let raw = payment_url(&request, Some("https://api.example.com/premium?paid=true"));

        assert!(raw.starts_with("solana:Recipient111?amount=0.001&reference="));
        let url = Url::parse(&raw).unwrap();
        assert_eq!(url.scheme(), "solana");
        assert_eq!(query_value(&url, "amount").as_deref(), Some("0.001"));
        assert_eq!(
            query_value(&url, "label").as_deref(),
            Some("Access to /premium")
        );
        assert_eq!(
            query_value(&url, "callback").as_deref(),
            Some("https://api.example.com/premium?paid=true")
        );
        assert!(query_value(&url, "reference").is_some());
    }

    #[test]
    fn test_native_url_omits_optional_params() {
        let config = PaymentConfig::new("SOL", "Recipient111", "1".parse().unwrap());
        let raw = payment_url(&PaymentRequest::new(&config), None);
        let url = Url::parse(&raw).unwrap();
        assert!(query_value(&url, "label").is_none());
        assert!(query_value(&url, "callback").is_none());
    }

    #[test]
    fn test_generic_url_shape() {
        let config = PaymentConfig::new("USDC", "0xabc", "2.50".parse().unwrap())
            .with_network(Network::new("base"));
        let raw = payment_url(&PaymentRequest::new(&config), Some("ignored"));
        assert_eq!(
            raw,
            "https://nawapay.io/pay?to=0xabc&amount=2.50&currency=USDC&network=base"
        );
    }

    #[test]
    fn test_reference_is_fresh_per_call() {
        let a = generate_reference();
        let b = generate_reference();
        assert_ne!(a, b);

        let (millis, suffix) = a.split_once('-').unwrap();
        assert!(millis.parse::<i64>().is_ok());
        assert_eq!(suffix.len(), REFERENCE_SUFFIX_LEN);
        assert!(suffix.bytes().all(|b| REFERENCE_ALPHABET.contains(&b)));
    }
}
