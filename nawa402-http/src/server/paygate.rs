//! Per-request payment gate logic.
//!
//! [`Paygate`] turns an [`AccessPolicy`] decision into HTTP: it forwards the
//! request, marks it as paid, or answers with a 402 challenge.

use std::convert::Infallible;
use std::sync::Arc;

use axum_core::body::Body;
use axum_core::extract::Request;
use axum_core::response::Response;
use http::header::{CONTENT_TYPE, HOST};
use http::{HeaderMap, HeaderValue, StatusCode};
use nawa402::payment_url::payment_url;
use nawa402::{AccessPolicy, GateDecision, PaymentRequest, ProofRecord};
use serde::Serialize;
use tower::Service;
use url::Url;

#[cfg(feature = "telemetry")]
use tracing::Instrument;
#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::constants::{PAYMENT_PROOF_HEADER, VERIFIED_HEADER};
use crate::error::HttpError;
use crate::headers::encode_payment_request;

/// Proof accepted by the gate, available to downstream handlers as a request
/// extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPayment(pub ProofRecord);

/// JSON body of a 402 answer.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChallengeBody<'a> {
    error: &'static str,
    message: String,
    payment_url: &'a str,
    payment_request: &'a PaymentRequest,
}

/// Payment gate for a single request.
#[derive(Debug, Clone)]
pub struct Paygate {
    /// Pricing and path patterns
    pub policy: Arc<AccessPolicy>,
    /// Origin for callback URLs
    pub base_url: Option<Arc<Url>>,
}

impl Paygate {
    /// Calls the inner service with proper telemetry instrumentation.
    async fn call_inner<S>(mut inner: S, req: Request) -> Result<Response, Infallible>
    where
        S: Service<Request, Response = Response, Error = Infallible>,
        S::Future: Send,
    {
        #[cfg(feature = "telemetry")]
        {
            inner
                .call(req)
                .instrument(tracing::info_span!("inner"))
                .await
        }
        #[cfg(not(feature = "telemetry"))]
        {
            inner.call(req).await
        }
    }

    /// Evaluates the policy for `req` and acts on the decision.
    ///
    /// # Errors
    ///
    /// This method is infallible (`Infallible` error type).
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "x402.handle_request", skip_all, fields(path = %req.uri().path()))
    )]
    pub async fn handle_request<S>(self, inner: S, mut req: Request) -> Result<Response, Infallible>
    where
        S: Service<Request, Response = Response, Error = Infallible>,
        S::Future: Send,
    {
        // The marker only means something when this gate set it.
        req.headers_mut().remove(VERIFIED_HEADER);

        let decision = {
            let proof = req
                .headers()
                .get(PAYMENT_PROOF_HEADER)
                .map(|v| v.to_str().unwrap_or_default());
            self.policy.evaluate(req.uri().path(), proof)
        };

        match decision {
            GateDecision::Pass => Self::call_inner(inner, req).await,
            GateDecision::Verified(record) => {
                #[cfg(feature = "telemetry")]
                tracing::debug!(tx_signature = %record.tx_signature, "payment proof accepted");

                req.headers_mut().remove(PAYMENT_PROOF_HEADER);
                req.headers_mut()
                    .insert(VERIFIED_HEADER, HeaderValue::from_static("true"));
                req.extensions_mut().insert(VerifiedPayment(record));
                Self::call_inner(inner, req).await
            }
            GateDecision::Challenge => Ok(self.payment_required(&req)),
            GateDecision::Denied(rejection) => {
                #[cfg(feature = "telemetry")]
                tracing::debug!(reason = rejection.reason(), "payment proof rejected: {rejection}");
                #[cfg(not(feature = "telemetry"))]
                let _ = rejection;
                Ok(self.payment_required(&req))
            }
        }
    }

    /// Builds the 402 answer for `req`: a fresh challenge in headers and body.
    #[must_use]
    pub fn payment_required(&self, req: &Request) -> Response {
        let path = req.uri().path();
        let request = self.policy.challenge(path);
        let callback = self.callback_url(req);
        let url = payment_url(&request, callback.as_deref());

        let mut response = match challenge_body(&request, &url) {
            Ok(body) => {
                let mut response = Response::new(Body::from(body));
                response
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                response
            }
            Err(err) => {
                #[cfg(feature = "telemetry")]
                tracing::error!(error = %err, "failed to serialize payment challenge");
                #[cfg(not(feature = "telemetry"))]
                let _ = err;
                Response::new(Body::empty())
            }
        };
        *response.status_mut() = StatusCode::PAYMENT_REQUIRED;

        match encode_payment_request(&request, Some(&url)) {
            Ok(headers) => response.headers_mut().extend(headers),
            Err(err) => {
                #[cfg(feature = "telemetry")]
                tracing::warn!(
                    error = %err,
                    "challenge not representable as headers; sending body only"
                );
                #[cfg(not(feature = "telemetry"))]
                let _ = err;
            }
        }
        response
    }

    /// Computes `<resource url>?paid=true` for the wallet callback.
    fn callback_url(&self, req: &Request) -> Option<String> {
        let mut url = match &self.base_url {
            Some(base) => (**base).clone(),
            None => {
                let origin = origin_from_request(req)?;
                #[cfg(feature = "telemetry")]
                tracing::trace!(%origin, "base_url not configured; using request origin");
                origin
            }
        };
        let prefix = url.path().trim_end_matches('/').to_owned();
        url.set_path(&format!("{prefix}{}", req.uri().path()));
        url.set_query(req.uri().query());
        url.query_pairs_mut().append_pair("paid", "true");
        Some(url.to_string())
    }
}

/// Origin taken from an absolute request URI or from the `Host` header.
fn origin_from_request(req: &Request) -> Option<Url> {
    let scheme = req.uri().scheme_str().unwrap_or("http");
    let host = match req.uri().authority() {
        Some(authority) => authority.as_str(),
        None => host_header(req.headers())?,
    };
    Url::parse(&format!("{scheme}://{host}")).ok()
}

fn host_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(HOST).and_then(|h| h.to_str().ok())
}

fn challenge_body(request: &PaymentRequest, url: &str) -> Result<Vec<u8>, HttpError> {
    let body = ChallengeBody {
        error: "Payment required",
        message: format!(
            "Payment of {} {} is required to access this resource",
            request.amount(),
            request.currency()
        ),
        payment_url: url,
        payment_request: request,
    };
    Ok(serde_json::to_vec(&body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::decode_challenge;
    use crate::server::X402Middleware;
    use nawa402::proof::{PaymentTerms, issue};
    use tower::{Layer, ServiceExt, service_fn};

    fn policy() -> AccessPolicy {
        AccessPolicy::new("0.001".parse().unwrap(), "SOL", "Recipient111")
            .with_protected_paths(["/api/premium/*"])
            .unwrap()
            .with_bypass_paths(["/api/premium/preview"])
            .unwrap()
    }

    /// Echoes what the gate forwarded.
    async fn echo(req: Request) -> Result<Response, Infallible> {
        let body = serde_json::json!({
            "verified": req.headers().get(VERIFIED_HEADER).and_then(|v| v.to_str().ok()),
            "proof": req.headers().get(PAYMENT_PROOF_HEADER).is_some(),
            "tx": req.extensions().get::<VerifiedPayment>().map(|p| p.0.tx_signature.clone()),
        });
        Ok(Response::new(Body::from(body.to_string())))
    }

    fn request(path: &str) -> http::request::Builder {
        http::Request::builder()
            .uri(path)
            .header(HOST, "api.example.com")
    }

    async fn json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_unprotected_path_passes_through() {
        let svc = X402Middleware::new(policy()).layer(service_fn(echo));
        let res = svc
            .oneshot(request("/api/free").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(json(res).await["verified"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_bypassed_path_passes_through() {
        let svc = X402Middleware::new(policy()).layer(service_fn(echo));
        let res = svc
            .oneshot(request("/api/premium/preview").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_proof_gets_challenge() {
        let svc = X402Middleware::new(policy()).layer(service_fn(echo));
        let res = svc
            .oneshot(request("/api/premium/data").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::PAYMENT_REQUIRED);
        let challenge = decode_challenge(res.headers()).unwrap();
        assert!(challenge.is_complete());
        assert_eq!(challenge.request().recipient(), "Recipient111");
        assert_eq!(challenge.request().amount().to_string(), "0.001");
        assert_eq!(
            challenge.request().description(),
            Some("Access to /api/premium/data")
        );
        let header_url = challenge.payment_url().unwrap().to_owned();

        let body = json(res).await;
        assert_eq!(body["error"], "Payment required");
        assert_eq!(
            body["message"],
            "Payment of 0.001 SOL is required to access this resource"
        );
        assert_eq!(body["paymentUrl"], header_url.as_str());
        assert_eq!(body["paymentRequest"]["recipient"], "Recipient111");

        let url = Url::parse(&header_url).unwrap();
        let callback = url
            .query_pairs()
            .find(|(k, _)| k == "callback")
            .map(|(_, v)| v.into_owned());
        assert_eq!(
            callback.as_deref(),
            Some("http://api.example.com/api/premium/data?paid=true")
        );
    }

    #[tokio::test]
    async fn test_base_url_overrides_host() {
        let middleware = X402Middleware::new(policy())
            .with_base_url(Url::parse("https://paid.example.com").unwrap());
        let svc = middleware.layer(service_fn(echo));
        let res = svc
            .oneshot(request("/api/premium/data?x=1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json(res).await;
        let url = Url::parse(body["paymentUrl"].as_str().unwrap()).unwrap();
        let callback = url
            .query_pairs()
            .find(|(k, _)| k == "callback")
            .map(|(_, v)| v.into_owned());
        assert_eq!(
            callback.as_deref(),
            Some("https://paid.example.com/api/premium/data?x=1&paid=true")
        );
    }

    #[tokio::test]
    async fn test_base_url_path_prefix_is_kept() {
        let middleware = X402Middleware::new(policy())
            .with_base_url(Url::parse("https://paid.example.com/v1/").unwrap());
        let svc = middleware.layer(service_fn(echo));
        let res = svc
            .oneshot(request("/api/premium/data").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json(res).await;
        let url = Url::parse(body["paymentUrl"].as_str().unwrap()).unwrap();
        let callback = url
            .query_pairs()
            .find(|(k, _)| k == "callback")
            .map(|(_, v)| v.into_owned());
        assert_eq!(
            callback.as_deref(),
            Some("https://paid.example.com/v1/api/premium/data?paid=true")
        );
    }

    #[tokio::test]
    async fn test_exact_protected_path_without_proof() {
        let policy = AccessPolicy::new("0.001".parse().unwrap(), "SOL", "Recipient111")
            .with_protected_paths(["/premium"])
            .unwrap();
        let svc = X402Middleware::new(policy).layer(service_fn(echo));
        let res = svc
            .oneshot(request("/premium").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(res.headers()["x-402-amount"], "0.001");
        assert_eq!(res.headers()["x-402-currency"], "SOL");
        assert_eq!(res.headers()["x-402-recipient"], "Recipient111");
        let body = json(res).await;
        assert_eq!(body["paymentRequest"]["amount"], "0.001");
    }

    #[tokio::test]
    async fn test_unprotected_path_never_carries_protocol_headers() {
        let policy = policy();
        let valid = issue(&ProofRecord::new("sig", &policy.terms())).unwrap();
        let svc = X402Middleware::new(policy).layer(service_fn(echo));

        for proof in [None, Some("garbage"), Some(valid.as_str())] {
            let mut builder = request("/api/free");
            if let Some(proof) = proof {
                builder = builder.header(PAYMENT_PROOF_HEADER, proof);
            }
            let res = svc
                .clone()
                .oneshot(builder.body(Body::empty()).unwrap())
                .await
                .unwrap();

            assert_eq!(res.status(), StatusCode::OK);
            assert!(
                res.headers()
                    .keys()
                    .all(|name| !name.as_str().starts_with("x-402-")),
                "protocol header leaked for proof {proof:?}"
            );
            assert_eq!(json(res).await["verified"], serde_json::Value::Null);
        }
    }

    #[tokio::test]
    async fn test_valid_proof_is_forwarded_with_marker() {
        let policy = policy();
        let token = issue(&ProofRecord::new("sig-1", &policy.terms())).unwrap();
        let svc = X402Middleware::new(policy).layer(service_fn(echo));
        let res = svc
            .oneshot(
                request("/api/premium/data")
                    .header(PAYMENT_PROOF_HEADER, token.as_str())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        let body = json(res).await;
        assert_eq!(body["verified"], "true");
        assert_eq!(body["proof"], false);
        assert_eq!(body["tx"], "sig-1");
    }

    #[tokio::test]
    async fn test_invalid_proof_gets_same_challenge() {
        let underpaid = PaymentTerms::new("Recipient111", "0.0001".parse().unwrap(), "SOL");
        let token = issue(&ProofRecord::new("sig", &underpaid)).unwrap();
        let svc = X402Middleware::new(policy()).layer(service_fn(echo));
        let res = svc
            .oneshot(
                request("/api/premium/data")
                    .header(PAYMENT_PROOF_HEADER, token.as_str())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::PAYMENT_REQUIRED);
        assert!(decode_challenge(res.headers()).is_some());
        assert_eq!(json(res).await["error"], "Payment required");
    }

    #[tokio::test]
    async fn test_spoofed_marker_is_stripped() {
        let svc = X402Middleware::new(policy()).layer(service_fn(echo));
        let res = svc
            .oneshot(
                request("/api/free")
                    .header(VERIFIED_HEADER, "true")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(json(res).await["verified"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_unrepresentable_description_still_answers_402() {
        let policy = policy().with_description("bad\r\nvalue");
        let svc = X402Middleware::new(policy).layer(service_fn(echo));
        let res = svc
            .oneshot(request("/api/premium/data").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::PAYMENT_REQUIRED);
        assert!(decode_challenge(res.headers()).is_none());
        assert_eq!(json(res).await["paymentRequest"]["description"], "bad\r\nvalue");
    }
}
