//! Payment gateway allow-list endpoints.

use axum::{
    Json,
    extract::{Query, State},
};

use crate::config::SiteMode;
use crate::error::AppError;
use crate::models::protocol::{
    AllowedGatewaysQuery, AllowedGatewaysResponse, PaymentsConfigQuery, PaymentsConfigResponse,
    UpdatePaymentsConfigRequest,
};
use crate::services::{outbound, payments};
use crate::state::AppState;

/// `GET /api/v1/payments-config?site_id&segment` - allowed gateways for a
/// (site, segment) pair. Served by the Primary only.
pub async fn get_payments_config(
    State(state): State<AppState>,
    Query(query): Query<PaymentsConfigQuery>,
) -> Result<Json<PaymentsConfigResponse>, AppError> {
    if state.config.mode != SiteMode::Primary {
        return Err(AppError::NotPrimary);
    }

    let allowed = payments::allowed_for(&state.pool, &query.site_id, query.segment).await?;
    Ok(Json(PaymentsConfigResponse { allowed }))
}

/// `PUT /api/v1/payments-config` - replace the allow-list for a
/// (site, segment) pair. Served by the Primary only.
pub async fn update_payments_config(
    State(state): State<AppState>,
    Json(request): Json<UpdatePaymentsConfigRequest>,
) -> Result<Json<PaymentsConfigResponse>, AppError> {
    if state.config.mode != SiteMode::Primary {
        return Err(AppError::NotPrimary);
    }

    payments::replace_mapping(&state.pool, &request.site_id, request.segment, &request.allowed)
        .await?;
    Ok(Json(PaymentsConfigResponse {
        allowed: request.allowed,
    }))
}

/// `GET /api/v1/allowed-gateways?segment` - the checkout-facing lookup on
/// a Secondary. Proxies the Primary with a short cache and fails open:
/// `allowed: null` tells the storefront to skip enforcement rather than
/// block checkout.
pub async fn get_allowed_gateways(
    State(state): State<AppState>,
    Query(query): Query<AllowedGatewaysQuery>,
) -> Result<Json<AllowedGatewaysResponse>, AppError> {
    if state.config.mode != SiteMode::Secondary {
        return Err(AppError::NotSecondary);
    }

    let allowed = outbound::fetch_allowed_gateways(&state, query.segment).await;
    Ok(Json(AllowedGatewaysResponse { allowed }))
}
