#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for the nawa402 payment-required protocol.
//!
//! A resource server uses nawa402 to declare that a path costs a specific
//! amount of a specific currency on a specific network. The declaration is a
//! [`PaymentRequest`] carried in `X-402-*` response headers of a
//! `402 Payment Required` answer. The client pays out of band, obtains a proof
//! token from a verification boundary, and retries with that token.
//!
//! This crate holds everything that does not need HTTP. The header codec, the
//! tower middleware and the reqwest client live in `nawa402-http`.
//!
//! # Modules
//!
//! - [`amount`] - Decimal amounts that never touch a float
//! - [`timestamp`] - Millisecond-precision ISO-8601 instants
//! - [`network`] - Network identifiers and the scheme derived from them
//! - [`request`] - The payment request record and its configuration
//! - [`payment_url`] - Wallet deeplinks and payment page links
//! - [`proof`] - Proof token issuance and validation
//! - [`policy`] - Priced paths and the per-request gate decision
//! - [`wallet`] - Settlement executor capability
//! - [`verifier`] - Verification boundary capability
//! - [`error`] - Error taxonomy
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation

use std::future::Future;
use std::pin::Pin;

pub mod amount;
pub mod error;
pub mod network;
pub mod payment_url;
pub mod policy;
pub mod proof;
pub mod request;
pub mod timestamp;
pub mod verifier;
pub mod wallet;

pub use amount::Amount;
pub use error::{Boundary, PaymentError, ProofRejection, TransportError};
pub use network::{Network, Scheme};
pub use policy::{AccessPolicy, GateDecision, PathPattern};
pub use proof::{PaymentTerms, ProofRecord, ProofToken};
pub use request::{PaymentConfig, PaymentRequest};
pub use timestamp::Timestamp;
pub use verifier::{
    LocalVerifier, SettlementChecker, VerificationRequest, VerificationResponse, Verifier,
};
pub use wallet::Wallet;

/// A boxed, `Send` future, used by the object-safe capability traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
