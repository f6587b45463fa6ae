//! Signed-request verification middleware.
//!
//! Intercepts every protected request to:
//! 1. Read the timestamp, nonce, and signature headers
//! 2. Recompute the HMAC over the canonical request string (route path
//!    only, never the query string) with constant-time comparison
//! 3. Reject timestamps outside the clock-skew window
//! 4. Reject nonces seen within the replay TTL, using the shared
//!    `protocol_nonces` table so every process sees the same cache
//!
//! Any failure collapses to HTTP 401 before business logic runs; no
//! partial state change is possible from an unauthenticated request.

use axum::{
    body::{Body, to_bytes},
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use crate::db::DbPool;
use crate::error::AppError;
use crate::services::event_log;
use crate::signing;
use crate::state::AppState;

/// Bodies larger than this are rejected before verification.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Verify the request signature and replay guards, then pass the request
/// on with its body restored.
pub async fn verify_signature(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (parts, body) = request.into_parts();

    // Buffer the body; it is part of the signed canonical string
    let body_bytes = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| AppError::Unauthorized)?;

    let header = |name: &str| -> Option<&str> {
        parts.headers.get(name).and_then(|v| v.to_str().ok())
    };

    let (Some(timestamp), Some(nonce), Some(signature)) = (
        header(signing::HEADER_TIMESTAMP),
        header(signing::HEADER_NONCE),
        header(signing::HEADER_SIGNATURE),
    ) else {
        return Err(reject(&state, parts.uri.path(), "missing signature headers").await);
    };

    // Route path only; the query string is not part of the signature
    let path = parts.uri.path();
    let method = parts.method.as_str();
    let now = Utc::now().timestamp();

    if !signing::verify(
        signature,
        method,
        path,
        timestamp,
        nonce,
        &body_bytes,
        &state.config.shared_secret,
        now,
    ) {
        return Err(reject(&state, path, "signature or timestamp rejected").await);
    }

    if !record_nonce(&state.pool, nonce).await? {
        return Err(reject(&state, path, "nonce replay rejected").await);
    }

    // Rebuild the request with the buffered body and continue
    let request = Request::from_parts(parts, Body::from(body_bytes));
    Ok(next.run(request).await)
}

/// Remember a nonce; returns false if it was already seen inside the TTL.
///
/// The insert is the atomic check: a conflicting row means replay. Expired
/// rows are pruned on the way in so the table stays small.
pub async fn record_nonce(pool: &DbPool, nonce: &str) -> Result<bool, AppError> {
    sqlx::query("DELETE FROM protocol_nonces WHERE seen_at < NOW() - make_interval(secs => $1)")
        .bind(signing::NONCE_TTL_SECS as f64)
        .execute(pool)
        .await?;

    let inserted = sqlx::query(
        "INSERT INTO protocol_nonces (nonce_hash) VALUES ($1) ON CONFLICT DO NOTHING",
    )
    .bind(signing::nonce_hash(nonce))
    .execute(pool)
    .await?
    .rows_affected();

    Ok(inserted > 0)
}

async fn reject(state: &AppState, path: &str, reason: &str) -> AppError {
    tracing::warn!(path, reason, "rejected signed request");
    event_log::record(
        &state.pool,
        "error",
        "signed request rejected",
        serde_json::json!({ "path": path, "reason": reason }),
    )
    .await;
    AppError::Unauthorized
}
