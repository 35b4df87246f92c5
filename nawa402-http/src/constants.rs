//! HTTP-specific constants for the nawa402 protocol.
//!
//! Header names are written in their canonical case. Lookups through
//! [`http::HeaderMap`] are case-insensitive.

/// Prefix shared by every protocol header.
pub const HEADER_PREFIX: &str = "X-402-";

/// Protocol version (server → client). Its presence marks a challenge.
pub const VERSION_HEADER: &str = "X-402-Version";

/// Ledger network (server → client).
pub const NETWORK_HEADER: &str = "X-402-Network";

/// Payment scheme (server → client).
pub const SCHEME_HEADER: &str = "X-402-Scheme";

/// Decimal amount (server → client).
pub const AMOUNT_HEADER: &str = "X-402-Amount";

/// Asset symbol (server → client).
pub const CURRENCY_HEADER: &str = "X-402-Currency";

/// Destination address (server → client).
pub const RECIPIENT_HEADER: &str = "X-402-Recipient";

/// ISO-8601 expiry (server → client).
pub const DEADLINE_HEADER: &str = "X-402-Deadline";

/// Optional description (server → client).
pub const DESCRIPTION_HEADER: &str = "X-402-Description";

/// Optional payment deeplink or page (server → client).
pub const PAYMENT_URL_HEADER: &str = "X-402-Payment-URL";

/// Proof token (client → server).
pub const PAYMENT_PROOF_HEADER: &str = "X-402-Payment-Proof";

/// Marker set by the gate on requests it forwarded after a valid proof.
pub const VERIFIED_HEADER: &str = "X-402-Verified";

/// HTTP 402 Payment Required status code.
pub const HTTP_STATUS_PAYMENT_REQUIRED: u16 = 402;

/// Path of the verification endpoint on a verifier service.
pub const VERIFY_PATH: &str = "/api/x402";

/// Query appended to the resource URL to form the wallet callback.
pub const PAID_CALLBACK_QUERY: &str = "paid=true";
