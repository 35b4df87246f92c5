//! The [`X402Middleware`] tower layer and the service it produces.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum_core::extract::Request;
use axum_core::response::Response;
use nawa402::AccessPolicy;
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service};
use url::Url;

use super::paygate::Paygate;

/// Layer enforcing an [`AccessPolicy`] on every request it wraps.
///
/// Cheap to clone: the policy is shared behind an [`Arc`] and never mutated.
#[derive(Debug, Clone)]
pub struct X402Middleware {
    policy: Arc<AccessPolicy>,
    base_url: Option<Arc<Url>>,
}

impl X402Middleware {
    /// Creates a middleware enforcing `policy`.
    #[must_use]
    pub fn new(policy: AccessPolicy) -> Self {
        Self {
            policy: Arc::new(policy),
            base_url: None,
        }
    }

    /// Sets the origin used to build the wallet callback URL.
    ///
    /// The request's path and query are appended to it. Without a base URL
    /// the origin is derived from the request's authority or `Host` header.
    #[must_use]
    pub fn with_base_url(&self, base_url: Url) -> Self {
        let mut this = self.clone();
        this.base_url = Some(Arc::new(base_url));
        this
    }

    /// Returns the enforced policy.
    #[must_use]
    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// Returns the configured base URL, if any.
    #[must_use]
    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_deref()
    }
}

impl From<AccessPolicy> for X402Middleware {
    fn from(policy: AccessPolicy) -> Self {
        Self::new(policy)
    }
}

impl<S> Layer<S> for X402Middleware
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
{
    type Service = X402MiddlewareService;

    fn layer(&self, inner: S) -> Self::Service {
        X402MiddlewareService {
            policy: Arc::clone(&self.policy),
            base_url: self.base_url.clone(),
            inner: BoxCloneSyncService::new(inner),
        }
    }
}

/// Service that gates requests according to an [`AccessPolicy`].
#[derive(Clone)]
#[allow(missing_debug_implementations)] // BoxCloneSyncService does not implement Debug
pub struct X402MiddlewareService {
    /// Pricing and path patterns
    policy: Arc<AccessPolicy>,
    /// Origin for callback URLs
    base_url: Option<Arc<Url>>,
    /// The wrapped service
    inner: BoxCloneSyncService<Request, Response, Infallible>,
}

impl Service<Request> for X402MiddlewareService {
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let gate = Paygate {
            policy: Arc::clone(&self.policy),
            base_url: self.base_url.clone(),
        };
        // Take the service that was driven to readiness, leave a fresh clone behind.
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);
        Box::pin(gate.handle_request(inner, req))
    }
}
