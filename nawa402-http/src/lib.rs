#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! HTTP transport layer for the nawa402 payment-required protocol.
//!
//! Provides the `X-402-*` header codec, constants, and (feature-gated) the
//! server-side access gate and the client-side payment agent.
//!
//! # Modules
//!
//! - [`constants`] - Header names, status code, well-known paths
//! - [`headers`] - Encoding/decoding of payment requests to and from headers
//! - [`error`] - HTTP transport error types
//! - `server` - Tower layer enforcing payment on priced paths (feature: `server`)
//! - `client` - Reqwest middleware that pays and retries (feature: `client`)
//!
//! # Feature Flags
//!
//! - `server` - Access gate middleware (default)
//! - `client` - Payment agent middleware and HTTP verifier client (default)
//! - `telemetry` - Tracing instrumentation

pub mod constants;
pub mod error;
pub mod headers;

#[cfg(feature = "client")]
pub mod client;
#[cfg(feature = "server")]
pub mod server;

pub use error::HttpError;
pub use headers::{
    ChallengeField, DecodedChallenge, decode_challenge, decode_payment_request,
    encode_payment_request,
};
