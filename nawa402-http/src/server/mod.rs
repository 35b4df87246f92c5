//! Tower middleware that gates priced paths behind a payment proof.
//!
//! Wrap a service or an axum `Router` with an [`X402Middleware`] built from an
//! [`AccessPolicy`](nawa402::AccessPolicy). For each request the gate either:
//!
//! - forwards it untouched (path not priced, or bypassed),
//! - answers `402 Payment Required` with the challenge in `X-402-*` headers and
//!   a JSON body (no proof, or an invalid one),
//! - or forwards it with `X-402-Verified: true` and a [`VerifiedPayment`]
//!   request extension (valid proof).
//!
//! The gate never fails: every branch ends in a forwarded request or a
//! well-formed 402.
//!
//! ```ignore
//! use axum::{Extension, Router, routing::get};
//! use nawa402::AccessPolicy;
//! use nawa402_http::server::{VerifiedPayment, X402Middleware};
//!
//! let policy = AccessPolicy::new("0.001".parse()?, "SOL", "7xKX...")
//!     .with_protected_paths(["/api/premium/*"])?;
//!
//! let app = Router::new()
//!     .route("/api/premium/data", get(|Extension(paid): Extension<VerifiedPayment>| async move {
//!         format!("paid by {}", paid.0.tx_signature)
//!     }))
//!     .layer(X402Middleware::new(policy).with_base_url("https://api.example.com".parse()?));
//! ```
//!
//! ## Configuration Notes
//!
//! - **[`X402Middleware::with_base_url`]** sets the origin used for the wallet
//!   callback URL. If not set, it is taken from the request's `Host`.

pub mod layer;
pub mod paygate;

pub use layer::{X402Middleware, X402MiddlewareService};
pub use paygate::{Paygate, VerifiedPayment};
