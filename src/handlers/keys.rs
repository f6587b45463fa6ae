//! Admin key inventory endpoints.
//!
//! All of these operate on the shared inventory and are therefore served
//! by the Primary only.

use axum::{
    Json,
    extract::{Path, Query, State},
};

use crate::config::SiteMode;
use crate::error::AppError;
use crate::models::key::{
    ImportKeysRequest, ImportKeysResponse, KeyListEntry, ListKeysQuery, UpdateKeyRequest,
};
use crate::services::{event_log, fulfillment, ledger};
use crate::state::AppState;

/// `POST /api/v1/keys/import` - bulk import plaintext keys.
///
/// Blank lines and exact-string duplicates are dropped before insertion.
/// A successful import immediately re-runs the fulfillment reconciler for
/// the product, so waiting backorders get the new stock right away.
pub async fn import_keys(
    State(state): State<AppState>,
    Json(request): Json<ImportKeysRequest>,
) -> Result<Json<ImportKeysResponse>, AppError> {
    if state.config.mode != SiteMode::Primary {
        return Err(AppError::NotPrimary);
    }

    // Exact-string dedup, preserving first-seen order
    let mut seen = std::collections::HashSet::new();
    let mut keys = Vec::with_capacity(request.keys.len());
    for raw in &request.keys {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(trimmed.to_string()) {
            keys.push(trimmed.to_string());
        }
    }
    let skipped = request.keys.len() - keys.len();

    let inserted = ledger::insert_many(
        &state.pool,
        &state.cipher,
        request.product_id,
        request.variation_id,
        &keys,
    )
    .await?;

    event_log::record(
        &state.pool,
        "info",
        "keys imported",
        serde_json::json!({
            "product_id": request.product_id,
            "inserted": inserted,
            "skipped": skipped,
        }),
    )
    .await;

    // New stock may satisfy waiting backorders
    if inserted > 0 {
        fulfillment::fulfill_backorders_for_product(
            &state.pool,
            &state.config,
            &state.cipher,
            request.product_id,
        )
        .await?;
    }

    Ok(Json(ImportKeysResponse { inserted, skipped }))
}

/// `GET /api/v1/keys?product_id&page` - admin listing.
///
/// Decrypts what it can; rows whose blobs fail to decrypt are logged and
/// skipped rather than failing the whole page.
pub async fn list_keys(
    State(state): State<AppState>,
    Query(query): Query<ListKeysQuery>,
) -> Result<Json<Vec<KeyListEntry>>, AppError> {
    if state.config.mode != SiteMode::Primary {
        return Err(AppError::NotPrimary);
    }

    let rows = ledger::list_page(&state.pool, query.product_id, query.page.unwrap_or(1)).await?;

    let mut entries = Vec::with_capacity(rows.len());
    for row in rows {
        match state.cipher.decrypt(&row.key_enc) {
            Ok(key) => entries.push(KeyListEntry {
                id: row.id,
                product_id: row.product_id,
                variation_id: row.variation_id,
                status: row.status,
                key,
                assigned_order_ref: row.assigned_order_ref,
                assigned_site_id: row.assigned_site_id,
            }),
            Err(e) => {
                tracing::warn!(key_id = row.id, error = %e, "skipping undecryptable key row");
            }
        }
    }

    Ok(Json(entries))
}

/// `PATCH /api/v1/keys/{id}` - replace the text of a still-available key.
///
/// 404 once the key is assigned; a key a customer already received is
/// never edited.
pub async fn update_key(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateKeyRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if state.config.mode != SiteMode::Primary {
        return Err(AppError::NotPrimary);
    }
    if request.key.trim().is_empty() {
        return Err(AppError::InvalidRequest("key must not be empty".into()));
    }

    let updated =
        ledger::update_available(&state.pool, &state.cipher, id, request.key.trim()).await?;
    if !updated {
        return Err(AppError::KeyNotFound);
    }

    Ok(Json(serde_json::json!({ "updated": true })))
}

/// `DELETE /api/v1/keys/{id}` - remove a still-available key.
pub async fn delete_key(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    if state.config.mode != SiteMode::Primary {
        return Err(AppError::NotPrimary);
    }

    let deleted = ledger::delete_available(&state.pool, id).await?;
    if !deleted {
        return Err(AppError::KeyNotFound);
    }

    Ok(Json(serde_json::json!({ "deleted": true })))
}
