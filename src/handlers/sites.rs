//! Secondary-site registry endpoints (Primary side).

use axum::{Json, extract::State};

use crate::config::SiteMode;
use crate::error::AppError;
use crate::models::site::{RegisterSiteRequest, SiteResponse};
use crate::services::sites;
use crate::state::AppState;

/// `POST /api/v1/sites` - register (or refresh) a Secondary storefront.
///
/// The generated api_key appears only in this response.
pub async fn register_site(
    State(state): State<AppState>,
    Json(request): Json<RegisterSiteRequest>,
) -> Result<Json<SiteResponse>, AppError> {
    if state.config.mode != SiteMode::Primary {
        return Err(AppError::NotPrimary);
    }

    let site = sites::register(&state.pool, &request.site_id, &request.site_url).await?;
    Ok(Json(site))
}

/// `GET /api/v1/sites` - list registered Secondaries (no api keys).
pub async fn list_sites(
    State(state): State<AppState>,
) -> Result<Json<Vec<SiteResponse>>, AppError> {
    if state.config.mode != SiteMode::Primary {
        return Err(AppError::NotPrimary);
    }

    let sites = sites::list(&state.pool).await?;
    Ok(Json(sites))
}
