//! Error types for the HTTP transport layer.

/// Errors that can occur while encoding protocol data for HTTP.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A field holds bytes that are not allowed in a header value.
    #[error("invalid value for header {name}: {source}")]
    InvalidHeaderValue {
        /// Header that could not be written.
        name: &'static str,
        /// Underlying error.
        #[source]
        source: http::header::InvalidHeaderValue,
    },
}
