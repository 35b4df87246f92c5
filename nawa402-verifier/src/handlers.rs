//! Axum route handlers for the verification service.
//!
//! - `POST /api/x402` trades a settled transaction for a proof token
//! - `GET /api/x402` echoes a challenge carried in the request headers, or
//!   issues a fresh one from query parameters
//! - `GET /health` reports liveness
//! - `GET /api/premium/{*path}` is a demo resource, mounted only when an
//!   access policy is configured

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, Request, State};
use axum::http::{HeaderMap, Method};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use nawa402::payment_url::payment_url;
use nawa402::proof::{self, PaymentTerms, ProofRecord};
use nawa402::request::DEFAULT_CURRENCY;
use nawa402::{
    Amount, PaymentConfig, PaymentRequest, SettlementChecker, VerificationRequest,
    VerificationResponse,
};
use nawa402_http::constants::VERIFY_PATH;
use nawa402_http::headers::payment_headers;
use nawa402_http::server::{VerifiedPayment, X402Middleware};
use nawa402_http::{decode_payment_request, encode_payment_request};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::cors;
use tower_http::trace::TraceLayer;

use crate::config::VerifierConfig;
use crate::error::ServiceError;

/// Amount of a challenge issued without an `amount` query parameter.
pub const DEFAULT_CHALLENGE_AMOUNT: &str = "0.01";
/// Description of a challenge issued without a `description` query parameter.
pub const DEFAULT_CHALLENGE_DESCRIPTION: &str = "API Access";
/// Lifetime of challenges issued by `GET /api/x402`.
pub const CHALLENGE_EXPIRY_MINUTES: u32 = 30;

/// State shared by the handlers.
#[allow(missing_debug_implementations)] // dyn SettlementChecker does not implement Debug
pub struct VerifierState {
    checker: Arc<dyn SettlementChecker>,
    recipient: Option<String>,
}

impl VerifierState {
    /// Creates state confirming settlements through `checker`.
    pub fn new<C: SettlementChecker + 'static>(checker: C) -> Self {
        Self {
            checker: Arc::new(checker),
            recipient: None,
        }
    }

    /// Sets the fallback recipient for issued challenges.
    #[must_use]
    pub fn with_recipient(mut self, recipient: Option<String>) -> Self {
        self.recipient = recipient;
        self
    }
}

/// Shared application state for the verification service.
pub type SharedState = Arc<VerifierState>;

/// Body of `POST /api/x402`. Every field is optional so that a missing one
/// is reported as such rather than as a JSON error.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyBody {
    /// Ledger transaction signature.
    pub tx_signature: Option<String>,
    /// Address that was paid.
    pub recipient: Option<String>,
    /// Amount paid, as a decimal string or a JSON number.
    pub amount: Option<Value>,
    /// Asset paid (default `SOL`).
    pub currency: Option<String>,
}

/// Query of `GET /api/x402`.
#[derive(Debug, Default, Deserialize)]
pub struct ChallengeQuery {
    /// Recipient address; falls back to the configured one.
    pub recipient: Option<String>,
    /// Price (default `0.01`).
    pub amount: Option<String>,
    /// Asset (default `SOL`).
    pub currency: Option<String>,
    /// Description (default `API Access`).
    pub description: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn positive_amount(value: &Value) -> Option<Amount> {
    let amount: Amount = match value {
        Value::String(s) => s.parse().ok()?,
        Value::Number(n) => n.to_string().parse().ok()?,
        _ => return None,
    };
    (!amount.is_zero()).then_some(amount)
}

/// `POST /api/x402` - Confirms a settlement and issues a proof token.
///
/// # Errors
///
/// Returns 400 on a malformed body, missing fields or an unconfirmed
/// settlement, and 500 if the settlement checker cannot be reached.
pub async fn post_verify(
    State(state): State<SharedState>,
    body: Result<Json<VerifyBody>, JsonRejection>,
) -> Result<Json<VerificationResponse>, ServiceError> {
    let Json(body) = body?;
    let tx_signature = non_empty(body.tx_signature).ok_or(ServiceError::MissingFields)?;
    let recipient = non_empty(body.recipient).ok_or(ServiceError::MissingFields)?;
    let amount = body
        .amount
        .as_ref()
        .and_then(positive_amount)
        .ok_or(ServiceError::MissingFields)?;
    let currency = non_empty(body.currency).unwrap_or_else(|| DEFAULT_CURRENCY.to_owned());

    let terms = PaymentTerms::new(recipient, amount, currency);
    let request = VerificationRequest::new(tx_signature, &terms);

    if !state.checker.confirm(&request).await? {
        tracing::info!(tx_signature = %request.tx_signature, "Settlement not confirmed");
        return Err(ServiceError::NotVerified);
    }

    let record = ProofRecord::new(request.tx_signature, &terms);
    let token = proof::issue(&record)?;
    tracing::info!(
        tx_signature = %record.tx_signature,
        amount = %record.amount,
        currency = %record.currency,
        "Issued payment proof"
    );
    Ok(Json(VerificationResponse::issued(token)))
}

/// `GET /api/x402` - Inspects or issues a challenge.
///
/// If the request carries `X-402-*` headers, the decoded challenge is echoed
/// with its expiry state. Otherwise a new challenge is built from the query
/// and returned both in the body and as response headers.
///
/// # Errors
///
/// Returns 400 if no recipient is known, the amount does not parse, or a
/// field cannot be carried in a header.
pub async fn get_challenge(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(query): Query<ChallengeQuery>,
) -> Result<Response, ServiceError> {
    if let Some(request) = decode_payment_request(&headers) {
        let expired = request.is_expired();
        return Ok(Json(json!({
            "hasPayment": true,
            "paymentRequest": request,
            "expired": expired,
        }))
        .into_response());
    }

    let recipient = non_empty(query.recipient)
        .or_else(|| state.recipient.clone())
        .ok_or(ServiceError::RecipientRequired)?;
    let raw_amount =
        non_empty(query.amount).unwrap_or_else(|| DEFAULT_CHALLENGE_AMOUNT.to_owned());
    let amount: Amount = raw_amount
        .parse()
        .map_err(|_| ServiceError::InvalidAmount(raw_amount.clone()))?;
    let currency = non_empty(query.currency).unwrap_or_else(|| DEFAULT_CURRENCY.to_owned());
    let description = non_empty(query.description)
        .unwrap_or_else(|| DEFAULT_CHALLENGE_DESCRIPTION.to_owned());

    let config = PaymentConfig::new(currency, recipient, amount)
        .with_description(description)
        .with_expiry_minutes(CHALLENGE_EXPIRY_MINUTES);
    let request = PaymentRequest::new(&config);
    let url = payment_url(&request, None);

    let response_headers = encode_payment_request(&request, Some(&url))?;
    let mirrored: serde_json::Map<String, Value> = payment_headers(&request, Some(&url))
        .into_iter()
        .map(|(name, value)| (name.to_owned(), Value::String(value)))
        .collect();

    Ok((
        response_headers,
        Json(json!({
            "paymentRequest": request,
            "paymentUrl": url,
            "headers": mirrored,
        })),
    )
        .into_response())
}

/// `GET /health` - Liveness check.
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `GET /api/premium/{*path}` - Demo resource behind the access gate.
pub async fn get_premium(request: Request) -> Json<Value> {
    let paid_by = request
        .extensions()
        .get::<VerifiedPayment>()
        .map(|paid| paid.0.tx_signature.clone());
    Json(json!({
        "resource": request.uri().path(),
        "paidBy": paid_by,
    }))
}

/// Creates an Axum [`Router`] with the verification endpoints.
///
/// Endpoints:
/// - `GET /api/x402` - inspect or issue a challenge
/// - `POST /api/x402` - confirm a settlement and issue a proof
/// - `GET /health` - liveness
pub fn verifier_router(state: SharedState) -> Router {
    Router::new()
        .route(VERIFY_PATH, get(get_challenge).post(post_verify))
        .route("/health", get(health))
        .with_state(state)
}

/// Builds the full application: endpoints, optional access gate, CORS and
/// request tracing.
pub fn app(config: &VerifierConfig, state: SharedState) -> Router {
    let mut router = verifier_router(state);

    if let Some(policy) = &config.policy {
        let mut gate = X402Middleware::new(policy.clone());
        if let Some(base_url) = &config.base_url {
            gate = gate.with_base_url(base_url.clone());
        }
        router = router
            .route("/api/premium/{*path}", get(get_premium))
            .layer(gate);
    }

    router
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(cors::Any)
                .expose_headers(cors::Any),
        )
        .layer(TraceLayer::new_for_http())
}
