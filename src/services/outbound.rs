//! Outbound cross-site client (Secondary side).
//!
//! Every call to the Primary is signed: timestamp, fresh nonce, and an
//! HMAC over the canonical request string. Only the route path is signed;
//! query parameters travel unsigned alongside.
//!
//! Failures here are always recoverable for the caller: mirror payloads
//! go to the retry queue, catalog sync just waits for the next run, and
//! payments lookups fail open.

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::AppError;
use crate::models::order::{Order, OrderItem};
use crate::models::product::KIND_BUNDLE;
use crate::models::protocol::{
    AllocateKeysRequest, AllocateKeysResponse, AllocationRequestItem, CatalogResponse,
    ItemAllocation, MirrorOrderItem, MirrorOrderRequest, MirrorOrderResponse,
    PaymentsConfigResponse,
};
use crate::models::segment::Segment;
use crate::services::{catalog, event_log, orders};
use crate::signing;
use crate::state::AppState;

/// How long a fetched payments allow-list stays cached.
const PAYMENTS_CACHE_TTL: Duration = Duration::from_secs(60);

/// Failure modes of a cross-site call.
#[derive(Debug, thiserror::Error)]
pub enum OutboundError {
    /// PRIMARY_URL is not configured; nothing to call.
    #[error("primary URL is not configured")]
    NotConfigured,

    /// Transport-level failure (DNS, connect, timeout).
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The Primary answered with a non-success status.
    #[error("primary answered HTTP {0}")]
    Status(u16),

    /// The response body did not parse as the expected shape.
    #[error("invalid response body")]
    InvalidResponse,
}

/// Signed POST with a JSON body.
async fn post_signed<B: Serialize, T: DeserializeOwned>(
    state: &AppState,
    path: &str,
    body: &B,
) -> Result<T, OutboundError> {
    let base = state
        .config
        .primary_base()
        .ok_or(OutboundError::NotConfigured)?;

    let body_bytes = serde_json::to_vec(body).map_err(|_| OutboundError::InvalidResponse)?;
    let timestamp = Utc::now().timestamp().to_string();
    let nonce = Uuid::new_v4().to_string();
    let signature = signing::sign(
        "POST",
        path,
        &timestamp,
        &nonce,
        &body_bytes,
        &state.config.shared_secret,
    );

    let response = state
        .http
        .post(format!("{base}{path}"))
        .header("content-type", "application/json")
        .header(signing::HEADER_TIMESTAMP, &timestamp)
        .header(signing::HEADER_NONCE, &nonce)
        .header(signing::HEADER_SIGNATURE, &signature)
        .body(body_bytes)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(OutboundError::Status(response.status().as_u16()));
    }
    response
        .json::<T>()
        .await
        .map_err(|_| OutboundError::InvalidResponse)
}

/// Signed GET. The query string is sent but not signed.
async fn get_signed<T: DeserializeOwned>(
    state: &AppState,
    path: &str,
    query: &[(&str, String)],
) -> Result<T, OutboundError> {
    let base = state
        .config
        .primary_base()
        .ok_or(OutboundError::NotConfigured)?;

    let timestamp = Utc::now().timestamp().to_string();
    let nonce = Uuid::new_v4().to_string();
    let signature = signing::sign(
        "GET",
        path,
        &timestamp,
        &nonce,
        b"",
        &state.config.shared_secret,
    );

    let response = state
        .http
        .get(format!("{base}{path}"))
        .query(query)
        .header(signing::HEADER_TIMESTAMP, &timestamp)
        .header(signing::HEADER_NONCE, &nonce)
        .header(signing::HEADER_SIGNATURE, &signature)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(OutboundError::Status(response.status().as_u16()));
    }
    response
        .json::<T>()
        .await
        .map_err(|_| OutboundError::InvalidResponse)
}

/// Request key allocation from the Primary for one order.
pub async fn request_allocation(
    state: &AppState,
    order_ref: &str,
    segment: Segment,
    items: Vec<AllocationRequestItem>,
) -> Result<Vec<ItemAllocation>, OutboundError> {
    let request = AllocateKeysRequest {
        site_id: state.config.site_id.clone(),
        order_id: order_ref.to_string(),
        customer_segment: segment,
        items,
    };
    let response: AllocateKeysResponse =
        post_signed(state, "/api/v1/allocate-keys", &request).await?;
    Ok(response.allocations)
}

/// Build the mirror payload for a local order.
///
/// Line items go over as (SKU, quantity) because product ids are not
/// shared across sites. Bundle containers are excluded; only leaf items
/// ship keys. Items without a SKU cannot be matched remotely and are
/// skipped with a warning.
pub async fn build_mirror_payload(
    state: &AppState,
    order: &Order,
    items: &[OrderItem],
) -> Result<MirrorOrderRequest, AppError> {
    let mut mirror_items = Vec::with_capacity(items.len());
    for item in items {
        let Some(sku) = item.sku.as_deref().filter(|s| !s.is_empty()) else {
            tracing::warn!(
                order_id = order.id,
                product_id = item.product_id,
                "order line has no SKU, excluded from mirror payload"
            );
            continue;
        };

        if let Some(product) = catalog::find_by_id(&state.pool, item.product_id).await? {
            if product.kind == KIND_BUNDLE {
                continue;
            }
        }

        mirror_items.push(MirrorOrderItem {
            sku: sku.to_string(),
            quantity: item.quantity,
        });
    }

    Ok(MirrorOrderRequest {
        site_id: state.config.site_id.clone(),
        order_id: order.remote_order_id.clone(),
        remote_order_number: order.remote_order_number.clone(),
        customer_segment: order.segment(),
        customer_email: order.customer_email.clone(),
        billing: order.billing_address.clone(),
        shipping: order.shipping_address.clone(),
        items: mirror_items,
    })
}

/// Send one mirror payload to the Primary.
pub async fn mirror_order(
    state: &AppState,
    payload: &MirrorOrderRequest,
) -> Result<MirrorOrderResponse, OutboundError> {
    post_signed(state, "/api/v1/mirror-order", payload).await
}

/// Park a failed mirror payload for the hourly retry drain.
pub async fn enqueue_mirror(pool: &DbPool, payload: &MirrorOrderRequest) -> Result<(), AppError> {
    let value = serde_json::to_value(payload)
        .map_err(|e| AppError::InvalidRequest(format!("unserializable mirror payload: {e}")))?;

    sqlx::query("INSERT INTO mirror_queue (payload) VALUES ($1)")
        .bind(&value)
        .execute(pool)
        .await?;

    Ok(())
}

/// Drain the mirror retry queue.
///
/// Fixed cadence, no backoff: a failed payload just bumps its retry
/// counter and waits for the next run. A successful send attaches the
/// result to the original local order and drops the queue row.
pub async fn drain_mirror_queue(state: &AppState) -> Result<(), AppError> {
    #[derive(sqlx::FromRow)]
    struct QueueRow {
        id: i64,
        payload: serde_json::Value,
    }

    let rows = sqlx::query_as::<_, QueueRow>(
        "SELECT id, payload FROM mirror_queue ORDER BY id ASC",
    )
    .fetch_all(&state.pool)
    .await?;

    if rows.is_empty() {
        return Ok(());
    }

    let total = rows.len();
    let mut remaining = 0usize;

    for row in rows {
        let payload: MirrorOrderRequest = match serde_json::from_value(row.payload) {
            Ok(p) => p,
            Err(e) => {
                // Unparseable payloads would retry forever; drop them loudly
                tracing::error!(queue_id = row.id, error = %e, "dropping malformed mirror payload");
                sqlx::query("DELETE FROM mirror_queue WHERE id = $1")
                    .bind(row.id)
                    .execute(&state.pool)
                    .await?;
                continue;
            }
        };

        match mirror_order(state, &payload).await {
            Ok(response) => {
                if let Some(order) =
                    orders::find_by_origin(&state.pool, &state.config.site_id, &payload.order_id)
                        .await?
                {
                    orders::apply_mirror_result(state, order.id, response).await?;
                } else {
                    tracing::warn!(
                        order_ref = %payload.order_id,
                        "queued mirror succeeded but local order is gone"
                    );
                }
                sqlx::query("DELETE FROM mirror_queue WHERE id = $1")
                    .bind(row.id)
                    .execute(&state.pool)
                    .await?;
            }
            Err(e) => {
                tracing::warn!(queue_id = row.id, error = %e, "mirror retry failed, keeping");
                sqlx::query("UPDATE mirror_queue SET retries = retries + 1 WHERE id = $1")
                    .bind(row.id)
                    .execute(&state.pool)
                    .await?;
                remaining += 1;
            }
        }
    }

    event_log::record(
        &state.pool,
        "info",
        "mirror queue processed",
        serde_json::json!({
            "site_id": state.config.site_id,
            "processed": total,
            "remaining": remaining,
        }),
    )
    .await;

    Ok(())
}

/// Pull the full catalog from the Primary and upsert it locally by SKU.
pub async fn sync_catalog(state: &AppState) -> Result<(), AppError> {
    let mut page = 1i64;
    let mut created = 0usize;
    let mut updated = 0usize;
    let mut skipped = 0usize;

    loop {
        let response: CatalogResponse =
            match get_signed(state, "/api/v1/catalog", &[("page", page.to_string())]).await {
                Ok(r) => r,
                Err(e) => {
                    tracing::error!(page, error = %e, "catalog sync aborted");
                    event_log::record(
                        &state.pool,
                        "error",
                        "catalog sync failed",
                        serde_json::json!({
                            "site_id": state.config.site_id,
                            "page": page,
                            "error": e.to_string(),
                        }),
                    )
                    .await;
                    return Ok(());
                }
            };

        for item in &response.items {
            match catalog::upsert_item(&state.pool, item).await? {
                catalog::UpsertOutcome::Created => created += 1,
                catalog::UpsertOutcome::Updated => updated += 1,
                catalog::UpsertOutcome::Skipped => skipped += 1,
            }
        }

        if page >= response.max_pages {
            break;
        }
        page += 1;
    }

    event_log::record(
        &state.pool,
        "info",
        "catalog sync complete",
        serde_json::json!({
            "site_id": state.config.site_id,
            "created": created,
            "updated": updated,
            "skipped": skipped,
        }),
    )
    .await;

    Ok(())
}

/// Allowed payment gateways for a segment, fetched from the Primary with
/// a short-lived cache.
///
/// Returns None when the Primary cannot be reached or answers garbage:
/// the caller fails open and skips enforcement rather than blocking
/// checkout.
pub async fn fetch_allowed_gateways(state: &AppState, segment: Segment) -> Option<Vec<String>> {
    let cache_key = segment.as_str().to_string();

    if let Ok(cache) = state.payments_cache.read() {
        if let Some((fetched_at, allowed)) = cache.get(&cache_key) {
            if fetched_at.elapsed() < PAYMENTS_CACHE_TTL {
                return Some(allowed.clone());
            }
        }
    }

    let query = [
        ("site_id", state.config.site_id.clone()),
        ("segment", segment.as_str().to_string()),
    ];
    match get_signed::<PaymentsConfigResponse>(state, "/api/v1/payments-config", &query).await {
        Ok(response) => {
            if let Ok(mut cache) = state.payments_cache.write() {
                cache.insert(cache_key, (Instant::now(), response.allowed.clone()));
            }
            Some(response.allowed)
        }
        Err(e) => {
            tracing::warn!(segment = %segment, error = %e, "payments-config unavailable, not enforcing");
            None
        }
    }
}
