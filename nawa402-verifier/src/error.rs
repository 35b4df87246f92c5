//! Error types for the verification service.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use nawa402::TransportError;
use nawa402_http::HttpError;

/// Errors raised while loading the service configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file exists but could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// The file that was read.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The configuration is not valid TOML or does not match the schema.
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Errors answered by the service's route handlers.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The request body is not valid JSON.
    #[error("invalid request body: {0}")]
    InvalidBody(#[from] JsonRejection),

    /// `txSignature`, `recipient` or a positive `amount` is missing.
    #[error("Missing required fields")]
    MissingFields,

    /// The settlement checker did not confirm the transaction.
    #[error("Payment verification failed")]
    NotVerified,

    /// No recipient in the query and none configured.
    #[error("Recipient address required")]
    RecipientRequired,

    /// The `amount` query parameter is not a non-negative decimal.
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// A challenge field cannot be carried in a header.
    #[error("{0}")]
    Header(#[from] HttpError),

    /// The settlement checker could not be reached.
    #[error("settlement check failed: {0}")]
    Settlement(#[from] TransportError),

    /// The proof record could not be serialized.
    #[error("proof issuance failed: {0}")]
    ProofIssuance(#[from] serde_json::Error),
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::InvalidBody(_)
            | Self::MissingFields
            | Self::NotVerified
            | Self::RecipientRequired
            | Self::InvalidAmount(_)
            | Self::Header(_) => StatusCode::BAD_REQUEST,
            Self::Settlement(_) | Self::ProofIssuance(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "Verification failed");
            "Verification failed".to_owned()
        } else {
            self.to_string()
        };
        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}
