//! Error type for the HTTP surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::providers::ProviderError;

/// Everything a handler can fail with.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized, missing or invalid credentials.
    #[error("Unauthorized")]
    Unauthorized,

    /// Bad request, invalid or missing input.
    #[error("{0}")]
    BadRequest(String),

    /// The requested tool does not exist in the catalog.
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// The named resource does not exist or is not visible to the caller.
    #[error("{0}")]
    NotFound(String),

    /// Resource already exists or invalid state transition.
    #[error("{0}")]
    Conflict(String),

    /// Balance below the amount the dispatch needs.
    #[error("Insufficient credits")]
    InsufficientCredits {
        /// Balance at the time of the check.
        balance: i64,
        /// Credits the dispatch would debit.
        required: i64,
    },

    /// Upstream provider call failed.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Unexpected failure. The message is logged, the client gets a
    /// generic body.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Wire shape of an error.
///
/// The `error` field is always a plain string so clients can render it
/// directly; `code` is a stable machine-readable tag.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    code: String,
    #[serde(flatten)]
    details: Option<serde_json::Map<String, serde_json::Value>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, error, details) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                self.to_string(),
                None,
            ),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "invalid_request", msg.clone(), None),
            Self::UnknownTool(_) => (StatusCode::BAD_REQUEST, "unknown_tool", self.to_string(), None),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone(), None),
            Self::InsufficientCredits { balance, required } => {
                let mut details = serde_json::Map::new();
                details.insert("balance".into(), (*balance).into());
                details.insert("required".into(), (*required).into());
                (
                    StatusCode::PAYMENT_REQUIRED,
                    "insufficient_credits",
                    self.to_string(),
                    Some(details),
                )
            }
            Self::Provider(err) => {
                tracing::error!(error = %err, "Provider call failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "provider_error",
                    sanitize(&err.to_string()),
                    None,
                )
            }
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    sanitize(msg),
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error,
            code: code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Strip upstream detail from a message before it reaches the client.
///
/// Validation-style messages stay verbatim so the user can fix their input;
/// everything else collapses to a static string. The full message is logged
/// before sanitization.
fn sanitize(message: &str) -> String {
    if message.contains("required") {
        message.to_string()
    } else {
        "Processing failed".to_string()
    }
}

impl From<timeless_store::StoreError> for ApiError {
    fn from(err: timeless_store::StoreError) -> Self {
        match err {
            timeless_store::StoreError::NotFound => Self::NotFound("Not found".into()),
            timeless_store::StoreError::AlreadyExists => Self::Conflict("Already exists".into()),
            timeless_store::StoreError::InsufficientCredits { balance, required } => {
                Self::InsufficientCredits { balance, required }
            }
            timeless_store::StoreError::Database(msg)
            | timeless_store::StoreError::Serialization(msg) => Self::Internal(msg),
        }
    }
}
