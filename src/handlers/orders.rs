//! Paid-order event intake.

use axum::{Json, extract::State};

use crate::error::AppError;
use crate::models::order::{PaidOrderRequest, PaidOrderResponse};
use crate::services::orders;
use crate::state::AppState;

/// `POST /api/v1/orders/paid` - the host storefront reports an order as
/// paid. Served in both modes; the site's role decides whether keys are
/// allocated locally, mirrored to the Primary, or requested over the
/// wire.
///
/// Always answers 200 for a well-formed order: degraded outcomes
/// (`mirror_queued`, `allocation_unavailable`) are reported in `status`
/// so checkout on the storefront never hard-fails.
pub async fn order_paid(
    State(state): State<AppState>,
    Json(request): Json<PaidOrderRequest>,
) -> Result<Json<PaidOrderResponse>, AppError> {
    let response = orders::process_paid_order(&state, request).await?;
    Ok(Json(response))
}
