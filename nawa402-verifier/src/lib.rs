//! Payment verification service for the nawa402 protocol.
//!
//! Exchanges settled transactions for proof tokens, issues challenges on
//! request, and optionally gates demo resources behind an access policy.
//!
//! # Modules
//!
//! - [`handlers`] - Axum route handlers and router builder
//! - [`error`] - Service and configuration error types
//! - [`config`] - Server configuration with environment variable expansion

pub mod config;
pub mod error;
pub mod handlers;

pub use handlers::{SharedState, VerifierState, app, verifier_router};
