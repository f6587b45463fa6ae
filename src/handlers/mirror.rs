//! Cross-site order mirroring endpoint.

use axum::{Json, extract::State};

use crate::config::SiteMode;
use crate::error::AppError;
use crate::models::protocol::{MirrorOrderRequest, MirrorOrderResponse};
use crate::services::{mirror, sites};
use crate::state::AppState;

/// `POST /api/v1/mirror-order` - re-create a Secondary's paid order here,
/// allocate its keys inline, and return the mapping.
///
/// Served by the Primary only. Duplicate requests for the same origin
/// order return the stored result instead of creating a second order.
pub async fn mirror_order(
    State(state): State<AppState>,
    Json(request): Json<MirrorOrderRequest>,
) -> Result<Json<MirrorOrderResponse>, AppError> {
    if state.config.mode != SiteMode::Primary {
        return Err(AppError::NotPrimary);
    }
    sites::ensure_active(&state.pool, &request.site_id).await?;

    let response =
        mirror::create_mirrored_order(&state.pool, &state.config, &state.cipher, request).await?;

    Ok(Json(response))
}
