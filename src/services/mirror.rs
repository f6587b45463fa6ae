//! Primary-side order mirroring.
//!
//! A Secondary's paid order becomes a real order row here, with keys
//! allocated inline and the mapping (our order id and display number)
//! returned in the same round trip.
//!
//! A retried mirror request (say, after a timeout whose response was
//! actually a success) must not create a duplicate order: the unique
//! (origin site, origin order id) pair is checked first and an existing
//! order's result is returned as-is.

use std::collections::HashMap;

use crate::config::Config;
use crate::crypto::KeyCipher;
use crate::db::DbPool;
use crate::error::AppError;
use crate::models::order::Order;
use crate::models::product::Product;
use crate::models::protocol::{
    AllocationRequestItem, ItemAllocation, MirrorOrderRequest, MirrorOrderResponse,
};
use crate::models::segment::Segment;
use crate::services::{allocation, catalog, emails, event_log, orders};

/// Create (or return the already-created) mirrored order for a request.
pub async fn create_mirrored_order(
    pool: &DbPool,
    config: &Config,
    cipher: &KeyCipher,
    req: MirrorOrderRequest,
) -> Result<MirrorOrderResponse, AppError> {
    if req.order_id.trim().is_empty() {
        return Err(AppError::InvalidRequest("order_id must not be empty".into()));
    }

    // Idempotency: a duplicate request gets the stored result back.
    if let Some(existing) = orders::find_by_origin(pool, &req.site_id, req.order_id.trim()).await? {
        tracing::info!(
            site_id = %req.site_id,
            remote_order_id = %req.order_id,
            order_id = existing.id,
            "duplicate mirror request, returning existing order"
        );
        return rebuild_response(pool, &existing).await;
    }

    // Resolve SKUs to local products. Unresolved SKUs are logged and
    // skipped; the rest of the order still goes through.
    let mut resolved: Vec<(Product, i32)> = Vec::with_capacity(req.items.len());
    for item in &req.items {
        match catalog::find_by_sku(pool, &item.sku).await? {
            Some(product) => resolved.push((product, item.quantity.max(0))),
            None => {
                tracing::warn!(sku = %item.sku, site_id = %req.site_id, "mirror SKU not found");
                event_log::record(
                    pool,
                    "warning",
                    "mirror SKU unresolved, pending reconciliation",
                    serde_json::json!({
                        "site_id": req.site_id,
                        "order_ref": req.order_id,
                        "sku": item.sku,
                    }),
                )
                .await;
            }
        }
    }

    // Business-segment orders get the business price where one exists.
    let line_price = |product: &Product| -> i64 {
        if req.customer_segment == Segment::Business {
            product.business_price_cents.unwrap_or(product.price_cents)
        } else {
            product.price_cents
        }
    };
    let total_cents: i64 = resolved
        .iter()
        .map(|(p, qty)| line_price(p) * i64::from(*qty))
        .sum();

    let mut tx = pool.begin().await?;
    let inserted = sqlx::query(
        r#"
        INSERT INTO orders (
            site_id, remote_order_id, remote_order_number, customer_segment,
            customer_email, billing_address, shipping_address, status,
            mirrored, total_cents, currency
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, 'processing', TRUE, $8, $9)
        ON CONFLICT (site_id, remote_order_id) DO NOTHING
        "#,
    )
    .bind(&req.site_id)
    .bind(req.order_id.trim())
    .bind(&req.remote_order_number)
    .bind(req.customer_segment.as_str())
    .bind(&req.customer_email)
    .bind(&req.billing)
    .bind(&req.shipping)
    .bind(total_cents)
    .bind(&config.currency)
    .execute(&mut *tx)
    .await?
    .rows_affected()
        > 0;

    let order = orders::find_by_origin(&mut *tx, &req.site_id, req.order_id.trim())
        .await?
        .ok_or(AppError::OrderNotFound)?;

    if !inserted {
        // Lost a race with a concurrent duplicate; hand back its result.
        tx.rollback().await?;
        return rebuild_response(pool, &order).await;
    }

    for (product, quantity) in &resolved {
        sqlx::query(
            r#"
            INSERT INTO order_items (order_id, product_id, sku, quantity, unit_price_cents)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(order.id)
        .bind(product.id)
        .bind(&product.sku)
        .bind(quantity)
        .bind(line_price(product))
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    // Allocate inline for exactly the resolved lines
    let demands: Vec<AllocationRequestItem> = resolved
        .iter()
        .map(|(product, quantity)| AllocationRequestItem {
            product_id: product.id,
            variation_id: None,
            quantity: *quantity,
        })
        .collect();

    let allocations = allocation::allocate(
        pool,
        cipher,
        &req.site_id,
        req.order_id.trim(),
        &demands,
    )
    .await?;

    orders::attach_allocations(pool, &config.shortage_message, order.id, &allocations).await?;
    orders::mark_allocated(pool, order.id, None).await?;

    // Email only once every non-bundle line already carries its keys;
    // short orders are mailed by the reconciler when stock lands.
    let kinds: HashMap<i64, bool> = resolved
        .iter()
        .map(|(p, _)| (p.id, p.is_bundle()))
        .collect();
    let items = orders::items_for(pool, order.id).await?;
    let complete = !items.is_empty()
        && items.iter().all(|item| {
            kinds.get(&item.product_id).copied().unwrap_or(false)
                || item.delivered_count() >= item.quantity.max(0) as usize
        });
    if complete {
        if let Err(e) = emails::send_order_keys_email(pool, config, order.id).await {
            tracing::error!(order_id = order.id, error = %e, "failed to queue keys email");
        }
    }

    event_log::record(
        pool,
        "info",
        "order mirrored from secondary",
        serde_json::json!({
            "site_id": req.site_id,
            "order_ref": req.order_id,
            "order_id": order.id,
            "lines": resolved.len(),
            "skipped_skus": req.items.len() - resolved.len(),
        }),
    )
    .await;

    Ok(MirrorOrderResponse {
        allocations,
        order_id: order.id,
        order_number: order.id.to_string(),
    })
}

/// Reconstruct a mirror response from stored order state, for duplicate
/// requests.
async fn rebuild_response(pool: &DbPool, order: &Order) -> Result<MirrorOrderResponse, AppError> {
    let items = orders::items_for(pool, order.id).await?;

    let allocations = items
        .iter()
        .map(|item| {
            let keys: Vec<String> = item
                .delivered_keys
                .as_deref()
                .unwrap_or("")
                .lines()
                .filter(|l| !l.is_empty())
                .map(str::to_owned)
                .collect();
            let pending = (item.quantity.max(0) as usize).saturating_sub(keys.len()) as i32;
            ItemAllocation {
                product_id: item.product_id,
                variation_id: item.variation_id,
                keys,
                pending,
            }
        })
        .collect();

    Ok(MirrorOrderResponse {
        allocations,
        order_id: order.id,
        order_number: order.id.to_string(),
    })
}
