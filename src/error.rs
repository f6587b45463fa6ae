//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::crypto::CryptoError;

/// Application-wide error type.
///
/// # Error Categories
///
/// - **Database Errors**: Any sqlx::Error from database operations
/// - **Authentication Errors**: Bad signature, skewed timestamp, replayed nonce
/// - **Role Errors**: Endpoint called on the wrong site mode
/// - **Resource Errors**: Requested resources not found
/// - **Validation Errors**: Invalid request data
/// - **Crypto Errors**: At-rest encryption or decryption failed
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (e.g., connection error, query error).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Request signature, timestamp, or nonce failed verification.
    ///
    /// All signed-request failure modes collapse to this variant so the
    /// response leaks nothing about which check failed.
    /// Returns HTTP 401 Unauthorized.
    #[error("Unauthorized")]
    Unauthorized,

    /// A Primary-only endpoint was called on a Secondary installation.
    ///
    /// Returns HTTP 400 Bad Request.
    #[error("This endpoint is only served by the primary site")]
    NotPrimary,

    /// A Secondary-only endpoint was called on the Primary installation.
    ///
    /// Returns HTTP 400 Bad Request.
    #[error("This endpoint is only served by a secondary site")]
    NotSecondary,

    /// The calling site_id is not registered (or not active) on the Primary.
    ///
    /// Returns HTTP 403 Forbidden.
    #[error("Unknown site")]
    UnknownSite,

    /// Requested key does not exist or is no longer editable.
    ///
    /// Returns HTTP 404 Not Found.
    #[error("Key not found")]
    KeyNotFound,

    /// Referenced order does not exist.
    ///
    /// Returns HTTP 404 Not Found.
    #[error("Order not found")]
    OrderNotFound,

    /// Request body or parameters are invalid.
    ///
    /// Returns HTTP 400 Bad Request.
    /// The String contains details about what was invalid.
    #[error("Invalid request")]
    InvalidRequest(String),

    /// At-rest encryption or decryption failed.
    ///
    /// Returns HTTP 500; details stay in the logs.
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

/// Convert AppError into an HTTP response.
///
/// This implementation allows Axum handlers to return `Result<T, AppError>`
/// and have errors automatically converted to proper HTTP responses.
///
/// # Response Format
///
/// All errors return JSON in this format:
/// ```json
/// {
///   "error": {
///     "code": "error_type",
///     "message": "Human-readable error message"
///   }
/// }
/// ```
///
/// Internal errors (database, crypto) hide their details from the client.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Map each error variant to (HTTP status, error code, message)
        let (status, code, message) = match self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", self.to_string()),
            AppError::NotPrimary => (StatusCode::BAD_REQUEST, "not_primary", self.to_string()),
            AppError::NotSecondary => (StatusCode::BAD_REQUEST, "not_secondary", self.to_string()),
            AppError::UnknownSite => (StatusCode::FORBIDDEN, "unknown_site", self.to_string()),
            AppError::KeyNotFound => (StatusCode::NOT_FOUND, "key_not_found", self.to_string()),
            AppError::OrderNotFound => {
                (StatusCode::NOT_FOUND, "order_not_found", self.to_string())
            }
            AppError::InvalidRequest(ref msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", msg.clone())
            }
            AppError::Database(_) | AppError::Crypto(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "An internal error occurred".to_string(),
            ),
        };

        // Build JSON response body
        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        // Return the response with status code and JSON body
        (status, body).into_response()
    }
}
