//! Cross-site catalog endpoint.

use axum::{
    Json,
    extract::{Query, State},
};

use crate::config::SiteMode;
use crate::error::AppError;
use crate::models::protocol::{CatalogQuery, CatalogResponse};
use crate::services::catalog;
use crate::state::AppState;

/// `GET /api/v1/catalog?page=N` - one page of the shared catalog.
///
/// Served by the Primary only; Secondaries sync their copy from here.
pub async fn get_catalog(
    State(state): State<AppState>,
    Query(query): Query<CatalogQuery>,
) -> Result<Json<CatalogResponse>, AppError> {
    if state.config.mode != SiteMode::Primary {
        return Err(AppError::NotPrimary);
    }

    let page = query.page.unwrap_or(1).max(1);
    let (items, max_pages) =
        catalog::page(&state.pool, page, state.config.catalog_page_size).await?;

    Ok(Json(CatalogResponse {
        items,
        page,
        max_pages,
    }))
}
