//! Cross-site key allocation endpoint.

use axum::{Json, extract::State};

use crate::config::SiteMode;
use crate::error::AppError;
use crate::models::protocol::{AllocateKeysRequest, AllocateKeysResponse};
use crate::services::{allocation, sites};
use crate::state::AppState;

/// `POST /api/v1/allocate-keys` - allocate keys for a Secondary's order.
///
/// Served by the Primary only. The caller must be a registered site.
/// Shortage comes back as data (`pending` per line); it is never an error.
pub async fn allocate_keys(
    State(state): State<AppState>,
    Json(request): Json<AllocateKeysRequest>,
) -> Result<Json<AllocateKeysResponse>, AppError> {
    if state.config.mode != SiteMode::Primary {
        return Err(AppError::NotPrimary);
    }
    sites::ensure_active(&state.pool, &request.site_id).await?;

    let allocations = allocation::allocate(
        &state.pool,
        &state.cipher,
        &request.site_id,
        &request.order_id,
        &request.items,
    )
    .await?;

    Ok(Json(AllocateKeysResponse { allocations }))
}
