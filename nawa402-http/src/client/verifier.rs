//! A [`Verifier`] that reaches a remote verification service over HTTP.
//!
//! [`HttpVerifier`] posts a [`VerificationRequest`] as JSON to
//! `<base>/api/x402` and expects a [`VerificationResponse`] back.
//!
//! ## Error Handling
//!
//! [`VerifierClientError`] captures the failure in detail (URL construction,
//! transport, status, body). When used through the [`Verifier`] trait it is
//! folded into the two outcomes the agent cares about:
//!
//! - timeouts (while connecting or reading the body), connection failures
//!   and `5xx` answers become
//!   [`VerifierError::Transport`]
//! - `4xx` answers, undecodable bodies and unverified answers become
//!   [`VerifierError::Rejected`]

use std::fmt::Display;
use std::time::Duration;

use http::{HeaderMap, StatusCode};
use nawa402::error::{Boundary, TransportError};
use nawa402::verifier::VerifierError;
use nawa402::{BoxFuture, ProofToken, VerificationRequest, VerificationResponse, Verifier};
use reqwest::Client;
use url::Url;

#[cfg(feature = "telemetry")]
use tracing::{Instrument, Span};

use crate::constants::VERIFY_PATH;

/// Errors that can occur while talking to a remote verification service.
#[derive(Debug, thiserror::Error)]
pub enum VerifierClientError {
    /// URL parse error.
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        /// Human-readable context.
        context: &'static str,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },
    /// HTTP transport error.
    #[error("HTTP error: {context}: {source}")]
    Http {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// JSON deserialization error.
    #[error("Failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// Unexpected HTTP status code.
    #[error("Unexpected HTTP status {status}: {context}: {body}")]
    HttpStatus {
        /// Human-readable context.
        context: &'static str,
        /// The HTTP status code.
        status: StatusCode,
        /// The response body.
        body: String,
    },
    /// Failed to read response body.
    #[error("Failed to read response body as text: {context}: {source}")]
    ResponseBodyRead {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// The service answered `200` but did not vouch for the payment.
    #[error("verification service did not confirm the payment")]
    NotVerified,
}

/// A client for a remote verification service.
#[derive(Clone, Debug)]
pub struct HttpVerifier {
    /// Base URL of the service (e.g. `https://pay.example/`)
    base_url: Url,
    /// Full URL for `POST /api/x402`
    verify_url: Url,
    /// Shared Reqwest HTTP client
    client: Client,
    /// Custom headers sent with each request
    headers: HeaderMap,
    /// Per-request timeout
    timeout: Duration,
}

impl HttpVerifier {
    /// Default per-request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Constructs a verifier from the service's base URL.
    ///
    /// # Errors
    ///
    /// Returns [`VerifierClientError::UrlParse`] if the endpoint URL cannot be
    /// derived from `base_url`.
    pub fn try_new(base_url: Url) -> Result<Self, VerifierClientError> {
        let verify_url = base_url.join(&format!(".{VERIFY_PATH}")).map_err(|e| {
            VerifierClientError::UrlParse {
                context: "Failed to construct verification URL",
                source: e,
            }
        })?;
        Ok(Self {
            base_url,
            verify_url,
            client: Client::new(),
            headers: HeaderMap::new(),
            timeout: Self::DEFAULT_TIMEOUT,
        })
    }

    /// Returns the base URL used by this client.
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Returns the computed verification endpoint.
    pub const fn verify_url(&self) -> &Url {
        &self.verify_url
    }

    /// Returns the configured per-request timeout.
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Uses `client` instead of a default one.
    #[must_use]
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Attaches custom headers (e.g. an API key) to all future requests.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sends a `POST /api/x402` request to the service.
    ///
    /// # Errors
    ///
    /// Returns [`VerifierClientError`] if the request fails, the service
    /// answers with anything but `200`, or the answer is not a confirmation.
    pub async fn verify_payment(
        &self,
        request: &VerificationRequest,
    ) -> Result<VerificationResponse, VerifierClientError> {
        let context = "POST /api/x402";
        let mut req = self
            .client
            .post(self.verify_url.clone())
            .json(request)
            .timeout(self.timeout);
        for (key, value) in &self.headers {
            req = req.header(key, value);
        }
        let http_response = req
            .send()
            .await
            .map_err(|e| VerifierClientError::Http { context, source: e })?;

        let result = if http_response.status() == StatusCode::OK {
            http_response
                .json::<VerificationResponse>()
                .await
                .map_err(|e| VerifierClientError::JsonDeserialization { context, source: e })
                .and_then(|response| {
                    if response.success && response.verified {
                        Ok(response)
                    } else {
                        Err(VerifierClientError::NotVerified)
                    }
                })
        } else {
            let status = http_response.status();
            let body = http_response
                .text()
                .await
                .map_err(|e| VerifierClientError::ResponseBodyRead { context, source: e })?;
            Err(VerifierClientError::HttpStatus {
                context,
                status,
                body,
            })
        };

        record_result_on_span(&result);

        result
    }

    /// Folds a detailed client error into the agent-facing taxonomy.
    fn classify(&self, err: VerifierClientError) -> VerifierError {
        match err {
            VerifierClientError::Http { source, .. }
            | VerifierClientError::ResponseBodyRead { source, .. }
            | VerifierClientError::JsonDeserialization { source, .. }
                if source.is_timeout() =>
            {
                TransportError::Timeout {
                    boundary: Boundary::Verification,
                    after: self.timeout,
                }
                .into()
            }
            VerifierClientError::Http { source, .. } => TransportError::Unavailable {
                boundary: Boundary::Verification,
                message: source.to_string(),
            }
            .into(),
            VerifierClientError::HttpStatus { status, body, .. } if status.is_server_error() => {
                TransportError::Unavailable {
                    boundary: Boundary::Verification,
                    message: format!("{status}: {}", error_message(&body)),
                }
                .into()
            }
            VerifierClientError::HttpStatus { body, .. } => {
                VerifierError::Rejected(error_message(&body))
            }
            other => VerifierError::Rejected(other.to_string()),
        }
    }
}

impl Verifier for HttpVerifier {
    fn verify<'a>(
        &'a self,
        request: &'a VerificationRequest,
    ) -> BoxFuture<'a, Result<ProofToken, VerifierError>> {
        let fut = async move {
            self.verify_payment(request)
                .await
                .map(|response| response.payment_proof)
                .map_err(|e| self.classify(e))
        };
        #[cfg(feature = "telemetry")]
        let fut = fut.instrument(tracing::info_span!(
            "x402.http_verifier.verify",
            tx_signature = %request.tx_signature,
            timeout = ?self.timeout,
            otel.status_code = tracing::field::Empty,
            error.message = tracing::field::Empty,
        ));
        Box::pin(fut)
    }
}

/// Converts a string URL into an [`HttpVerifier`], normalizing the trailing slash.
impl TryFrom<&str> for HttpVerifier {
    type Error = VerifierClientError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let mut normalized = value.trim_end_matches('/').to_string();
        normalized.push('/');
        let url = Url::parse(&normalized).map_err(|e| VerifierClientError::UrlParse {
            context: "Failed to parse base url",
            source: e,
        })?;
        Self::try_new(url)
    }
}

impl TryFrom<String> for HttpVerifier {
    type Error = VerifierClientError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

/// Pulls `error` out of a `{"error": "..."}` body, or returns the body as is.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error")?.as_str().map(str::to_owned))
        .unwrap_or_else(|| body.to_owned())
}

/// Records the outcome of a request on the current span.
#[cfg(feature = "telemetry")]
fn record_result_on_span<R, E: Display>(result: &Result<R, E>) {
    let span = Span::current();
    match result {
        Ok(_) => {
            span.record("otel.status_code", "OK");
        }
        Err(err) => {
            span.record("otel.status_code", "ERROR");
            span.record("error.message", tracing::field::display(err));
            tracing::event!(
                tracing::Level::ERROR,
                error = %err,
                "Request to verification service failed"
            );
        }
    }
}

/// Noop if telemetry feature is off.
#[cfg(not(feature = "telemetry"))]
fn record_result_on_span<R, E: Display>(_result: &Result<R, E>) {}
