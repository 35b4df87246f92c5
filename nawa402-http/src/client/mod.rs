//! Reqwest middleware that pays `402 Payment Required` challenges.
//!
//! Build an [`X402Client`] from a [`Wallet`](nawa402::Wallet) and a
//! [`Verifier`](nawa402::Verifier), then attach it to a reqwest client:
//!
//! ```ignore
//! use nawa402_http::client::{HttpVerifier, ReqwestWithPayments, ReqwestWithPaymentsBuild, SpendingLimit, X402Client};
//!
//! let agent = X402Client::new(my_wallet, HttpVerifier::try_from("https://pay.example")?)
//!     .with_policy(SpendingLimit::new("0.1".parse()?).for_currency("SOL"));
//! let http = reqwest::Client::new().with_payments(agent).build();
//! let body = http.get("https://api.example.com/api/premium/data").send().await?.text().await?;
//! ```
//!
//! ## Verifiers
//!
//! - **[`HttpVerifier`]** - posts to a remote verification service
//! - **[`LocalVerifier`](nawa402::LocalVerifier)** - confirms in-process
//!
//! ## Policies
//!
//! [`SpendingLimit`], [`AllowedCurrencies`] and [`AllowedNetworks`] veto a
//! challenge before anything is paid. Any
//! `Fn(&PaymentRequest) -> Result<(), String>` works as a policy too.

mod middleware;
pub mod policy;
pub mod verifier;

pub use middleware::{Challenge, X402Client, read_challenge};
pub use policy::{AllowedCurrencies, AllowedNetworks, PaymentPolicy, SpendingLimit};
pub use verifier::{HttpVerifier, VerifierClientError};

use reqwest::{Client, ClientBuilder};
use reqwest_middleware as rqm;

/// Trait for adding payment handling to reqwest clients.
///
/// Implemented on [`Client`] and [`ClientBuilder`].
pub trait ReqwestWithPayments<A> {
    /// Adds the payment middleware to the client or builder.
    fn with_payments(self, x402_client: X402Client) -> ReqwestWithPaymentsBuilder<A>;
}

impl ReqwestWithPayments<Self> for Client {
    fn with_payments(self, x402_client: X402Client) -> ReqwestWithPaymentsBuilder<Self> {
        ReqwestWithPaymentsBuilder {
            inner: self,
            x402_client,
        }
    }
}

impl ReqwestWithPayments<Self> for ClientBuilder {
    fn with_payments(self, x402_client: X402Client) -> ReqwestWithPaymentsBuilder<Self> {
        ReqwestWithPaymentsBuilder {
            inner: self,
            x402_client,
        }
    }
}

/// Builder for creating a reqwest client with the payment middleware.
#[allow(missing_debug_implementations)] // X402Client does not implement Debug
pub struct ReqwestWithPaymentsBuilder<A> {
    inner: A,
    x402_client: X402Client,
}

/// Trait for building the final client from a [`ReqwestWithPaymentsBuilder`].
pub trait ReqwestWithPaymentsBuild {
    /// The type returned by [`build`](Self::build)
    type BuildResult;
    /// The type returned by [`builder`](Self::builder)
    type BuilderResult;

    /// Builds the client, consuming the builder.
    fn build(self) -> Self::BuildResult;

    /// Returns the underlying middleware client builder, for stacking more middleware.
    fn builder(self) -> Self::BuilderResult;
}

impl ReqwestWithPaymentsBuild for ReqwestWithPaymentsBuilder<Client> {
    type BuildResult = rqm::ClientWithMiddleware;
    type BuilderResult = rqm::ClientBuilder;

    fn build(self) -> Self::BuildResult {
        self.builder().build()
    }

    fn builder(self) -> Self::BuilderResult {
        rqm::ClientBuilder::new(self.inner).with(self.x402_client)
    }
}

impl ReqwestWithPaymentsBuild for ReqwestWithPaymentsBuilder<ClientBuilder> {
    type BuildResult = Result<rqm::ClientWithMiddleware, reqwest::Error>;
    type BuilderResult = Result<rqm::ClientBuilder, reqwest::Error>;

    fn build(self) -> Self::BuildResult {
        let builder = self.builder()?;
        Ok(builder.build())
    }

    fn builder(self) -> Self::BuilderResult {
        let client = self.inner.build()?;
        Ok(rqm::ClientBuilder::new(client).with(self.x402_client))
    }
}
